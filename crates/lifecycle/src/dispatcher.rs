//! Idempotent trial notification dispatcher
//!
//! Walks the organisation table once per cron invocation, sends pending
//! trial reminders and expired-trial notices, and persists de-dup state.
//! A failure for one organisation never aborts the pass; only a failure
//! to list candidates does.

use std::sync::Arc;

use serde_json::json;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use fieldhq_shared::Organisation;

use crate::audit::action;
use crate::clock::{assign_bucket, days_remaining, is_expiry_candidate, ReminderBucket};
use crate::email::{Branding, Notification};
use crate::error::LifecycleResult;
use crate::mailer::Mailer;
use crate::store::LifecycleStore;

/// Per-bucket counts from one reminder pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderCounts {
    pub sent_7_day: u32,
    pub sent_3_day: u32,
    pub sent_1_day: u32,
}

impl ReminderCounts {
    pub fn total(&self) -> u32 {
        self.sent_7_day + self.sent_3_day + self.sent_1_day
    }

    fn record(&mut self, bucket: ReminderBucket) {
        match bucket {
            ReminderBucket::SevenDay => self.sent_7_day += 1,
            ReminderBucket::ThreeDay => self.sent_3_day += 1,
            ReminderBucket::OneDay => self.sent_1_day += 1,
        }
    }
}

/// Result of one expired-trial pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryCounts {
    pub sent: u32,
}

/// Dispatches trial reminders and expiry notices for all organisations
pub struct TrialReminderService {
    store: Arc<dyn LifecycleStore>,
    mailer: Arc<dyn Mailer>,
    branding: Branding,
}

impl TrialReminderService {
    pub fn new(store: Arc<dyn LifecycleStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            mailer,
            branding: Branding::default(),
        }
    }

    pub fn with_branding(mut self, branding: Branding) -> Self {
        self.branding = branding;
        self
    }

    /// One reminder pass: classify every in-trial organisation against the
    /// 7/3/1-day buckets and send whichever reminder is pending.
    ///
    /// Emails go out before the flag is written, so a crash between the two
    /// can cause one duplicate on the next run; the flag is never written
    /// for an email that was not sent.
    pub async fn run_reminder_pass(
        &self,
        now: OffsetDateTime,
    ) -> LifecycleResult<ReminderCounts> {
        let candidates = self.store.list_trial_candidates(now).await?;
        info!(candidates = candidates.len(), "Starting trial reminder pass");

        let mut counts = ReminderCounts::default();
        for org in &candidates {
            let Some(bucket) = assign_bucket(org, now) else {
                continue;
            };
            if self.send_reminder(org, bucket, now).await {
                counts.record(bucket);
            }
        }

        info!(
            sent_7_day = counts.sent_7_day,
            sent_3_day = counts.sent_3_day,
            sent_1_day = counts.sent_1_day,
            "Trial reminder pass complete"
        );
        Ok(counts)
    }

    /// Returns true if the reminder email was sent. Flag persistence
    /// failures are logged but still count as sent.
    async fn send_reminder(
        &self,
        org: &Organisation,
        bucket: ReminderBucket,
        now: OffsetDateTime,
    ) -> bool {
        let admin = match self.store.admin_user(org.id.into()).await {
            Ok(Some(admin)) => admin,
            Ok(None) => {
                warn!(org_id = %org.id, "Skipping trial reminder: no admin user");
                return false;
            }
            Err(e) => {
                warn!(org_id = %org.id, error = %e, "Skipping trial reminder: admin lookup failed");
                return false;
            }
        };

        // trial_end is present whenever a bucket was assigned
        let Some(trial_end) = org.trial_end else {
            return false;
        };

        let content = Notification::TrialReminder {
            name: admin.full_name.clone(),
            days_remaining: days_remaining(trial_end, now),
            trial_end,
        }
        .render(&self.branding);

        if let Err(e) = self.mailer.send(&admin.email, &content).await {
            error!(org_id = %org.id, bucket = %bucket, error = %e, "Failed to send trial reminder");
            return false;
        }

        if let Err(e) = self.store.mark_reminder_sent(org.id.into(), bucket).await {
            // The email already went out; the next pass may send a duplicate
            error!(org_id = %org.id, bucket = %bucket, error = %e, "Failed to persist reminder flag after send");
        }

        info!(org_id = %org.id, bucket = %bucket, "Sent trial reminder");
        true
    }

    /// One expired-trial pass: notify organisations whose trial ended within
    /// the last 24 hours without converting. De-dup is by audit-row
    /// existence rather than a column flag.
    pub async fn run_expiry_pass(&self, now: OffsetDateTime) -> LifecycleResult<ExpiryCounts> {
        let expired = self.store.list_recently_expired(now).await?;
        info!(candidates = expired.len(), "Starting expired-trial pass");

        let mut counts = ExpiryCounts::default();
        for org in &expired {
            if !is_expiry_candidate(org, now) {
                continue;
            }
            if self.send_expiry_notice(org).await {
                counts.sent += 1;
            }
        }

        info!(sent = counts.sent, "Expired-trial pass complete");
        Ok(counts)
    }

    async fn send_expiry_notice(&self, org: &Organisation) -> bool {
        let admin = match self.store.admin_user(org.id.into()).await {
            Ok(Some(admin)) => admin,
            Ok(None) => {
                warn!(org_id = %org.id, "Skipping expiry notice: no admin user");
                return false;
            }
            Err(e) => {
                warn!(org_id = %org.id, error = %e, "Skipping expiry notice: admin lookup failed");
                return false;
            }
        };

        match self
            .store
            .has_audit_action(admin.id.into(), action::TRIAL_EXPIRED_EMAIL_SENT)
            .await
        {
            Ok(true) => return false,
            Ok(false) => {}
            Err(e) => {
                warn!(org_id = %org.id, error = %e, "Skipping expiry notice: audit lookup failed");
                return false;
            }
        }

        let content = Notification::TrialExpired {
            name: admin.full_name.clone(),
        }
        .render(&self.branding);

        if let Err(e) = self.mailer.send(&admin.email, &content).await {
            error!(org_id = %org.id, error = %e, "Failed to send expiry notice");
            return false;
        }

        let details = json!({ "org_id": org.id, "org_name": org.name });
        if let Err(e) = self
            .store
            .insert_audit(
                Some(admin.id.into()),
                action::TRIAL_EXPIRED_EMAIL_SENT,
                details,
            )
            .await
        {
            // Same duplicate risk as the reminder flags
            error!(org_id = %org.id, error = %e, "Failed to record expiry notice in audit log");
        }

        info!(org_id = %org.id, "Sent expired-trial notice");
        true
    }
}
