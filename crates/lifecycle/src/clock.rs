//! Trial clock evaluator
//!
//! Pure classification logic: given an evaluation instant and an
//! organisation's trial window, decide which reminder bucket (if any) is
//! pending and whether the organisation is a candidate for the
//! expired-trial notification. No I/O happens here; the dispatcher owns
//! sending and flag persistence.

use fieldhq_shared::Organisation;
use time::{Duration, OffsetDateTime};

const SECONDS_PER_DAY: i64 = 86_400;

/// Pre-expiry reminder classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderBucket {
    SevenDay,
    ThreeDay,
    OneDay,
}

impl ReminderBucket {
    /// Days-remaining threshold this bucket fires at
    pub fn days(&self) -> i64 {
        match self {
            Self::SevenDay => 7,
            Self::ThreeDay => 3,
            Self::OneDay => 1,
        }
    }

    /// Whether the corresponding de-dup flag is already set on the org
    pub fn already_sent(&self, org: &Organisation) -> bool {
        match self {
            Self::SevenDay => org.trial_reminder_7_sent,
            Self::ThreeDay => org.trial_reminder_3_sent,
            Self::OneDay => org.trial_reminder_1_sent,
        }
    }
}

impl std::fmt::Display for ReminderBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-day", self.days())
    }
}

/// Whole days remaining until `trial_end`, using ceiling division.
/// A trial ending in 6.5 days rounds up to 7.
pub fn days_remaining(trial_end: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let secs = (trial_end - now).whole_seconds();
    // Ceiling division that is correct for negative remainders too
    secs.div_euclid(SECONDS_PER_DAY) + i64::from(secs.rem_euclid(SECONDS_PER_DAY) > 0)
}

/// Classify an organisation into zero or one pending reminder bucket.
///
/// The windows `(6,7]`, `(2,3]`, `(0,1]` are disjoint, so at most one
/// bucket can match. A converted organisation (non-null Stripe
/// subscription) is excluded regardless of flag state.
pub fn assign_bucket(org: &Organisation, now: OffsetDateTime) -> Option<ReminderBucket> {
    if org.has_converted() {
        return None;
    }
    let trial_end = org.trial_end?;
    if trial_end <= now {
        return None;
    }

    let bucket = match days_remaining(trial_end, now) {
        7 => ReminderBucket::SevenDay,
        3 => ReminderBucket::ThreeDay,
        1 => ReminderBucket::OneDay,
        _ => return None,
    };

    if bucket.already_sent(org) {
        None
    } else {
        Some(bucket)
    }
}

/// Whether the organisation's trial expired within the last 24 hours
/// without converting. The audit-log de-dup check is the dispatcher's job.
pub fn is_expiry_candidate(org: &Organisation, now: OffsetDateTime) -> bool {
    if org.has_converted() {
        return false;
    }
    match org.trial_end {
        Some(end) => end < now && end > now - Duration::hours(24),
        None => false,
    }
}
