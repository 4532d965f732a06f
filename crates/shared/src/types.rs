//! Common types used across FieldHQ

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Length of the free trial granted at signup
pub const TRIAL_LENGTH_DAYS: i64 = 14;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Organisation ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(pub Uuid);

impl OrgId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrgId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OrgId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OrgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Subscription plan for billing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Starter,
    Pro,
    Enterprise,
}

impl Default for Plan {
    fn default() -> Self {
        Self::Starter
    }
}

impl Plan {
    /// Human-facing plan name used in emails and the dashboard
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Starter => "Starter",
            Self::Pro => "Pro",
            Self::Enterprise => "Enterprise",
        }
    }

    /// Base monthly price in pence
    pub fn monthly_price_pence(&self) -> i64 {
        match self {
            Self::Starter => 2_900,
            Self::Pro => 7_900,
            Self::Enterprise => 19_900,
        }
    }

    /// Seats included in the base price
    pub fn included_seats(&self) -> u32 {
        match self {
            Self::Starter => 3,
            Self::Pro => 10,
            Self::Enterprise => 50,
        }
    }

    /// Price per additional seat in pence
    pub fn seat_price_pence(&self) -> i64 {
        match self {
            Self::Starter => 900,
            Self::Pro => 700,
            Self::Enterprise => 500,
        }
    }

    /// Ordering used to classify a plan change as upgrade or downgrade
    pub fn rank(&self) -> u8 {
        match self {
            Self::Starter => 0,
            Self::Pro => 1,
            Self::Enterprise => 2,
        }
    }

    /// Total monthly cost for a given number of additional seats, in pence
    pub fn monthly_cost_pence(&self, additional_seats: u32) -> i64 {
        self.monthly_price_pence() + self.seat_price_pence() * additional_seats as i64
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starter => write!(f, "starter"),
            Self::Pro => write!(f, "pro"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = crate::error::FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(crate::error::FieldError::Validation(format!(
                "Invalid plan: {}",
                s
            ))),
        }
    }
}

/// User lifecycle status — mutually exclusive states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
    SoftDeleted,
    HardDeleted,
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl UserStatus {
    /// Whether this user counts towards seat capacity
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::SoftDeleted => write!(f, "soft_deleted"),
            Self::HardDeleted => write!(f, "hard_deleted"),
        }
    }
}

/// Billing lifecycle state of an organisation, derived from its row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Trialing,
    Active,
    PaymentFailed,
    Cancelled,
    Deleted,
}

impl SubscriptionState {
    /// Valid transitions in the subscription state machine.
    /// `Cancelled` is terminal for billing; `Deleted` is terminal outright.
    pub fn can_transition_to(&self, next: SubscriptionState) -> bool {
        use SubscriptionState::*;
        match (self, next) {
            (Trialing, Active) => true,
            (Active, Active) => true, // plan/seat changes stay in Active
            (Active, PaymentFailed) => true,
            (PaymentFailed, Active) => true, // retry succeeded
            (Trialing | Active | PaymentFailed, Cancelled) => true,
            (_, Deleted) => !matches!(self, Deleted),
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Deleted)
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trialing => write!(f, "trialing"),
            Self::Active => write!(f, "active"),
            Self::PaymentFailed => write!(f, "payment_failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Organisation (tenant) model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organisation {
    pub id: Uuid,
    pub name: String,
    pub plan: String,
    pub trial_start: Option<OffsetDateTime>,
    pub trial_end: Option<OffsetDateTime>,
    /// Presence means the trial converted to paid; disables trial reminders
    pub stripe_subscription_id: Option<String>,
    pub trial_reminder_7_sent: bool,
    pub trial_reminder_3_sent: bool,
    pub trial_reminder_1_sent: bool,
    pub additional_seats: i32,
    /// Scheduled downgrade target, applied at the next billing boundary
    pub pending_plan: Option<String>,
    pub pending_plan_effective_at: Option<OffsetDateTime>,
    pub payment_failed_at: Option<OffsetDateTime>,
    pub cancelled_at: Option<OffsetDateTime>,
    pub cancellation_reason: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Organisation {
    /// Current plan parsed from the stored string, defaulting to Starter
    pub fn current_plan(&self) -> Plan {
        self.plan.parse().unwrap_or_default()
    }

    /// Total seat capacity: plan-included seats plus purchased additional seats
    pub fn seat_capacity(&self) -> u32 {
        self.current_plan().included_seats() + self.additional_seats.max(0) as u32
    }

    /// Whether the org has converted (acquired a Stripe subscription)
    pub fn has_converted(&self) -> bool {
        self.stripe_subscription_id.is_some()
    }

    /// Derive the billing lifecycle state from the row
    pub fn subscription_state(&self) -> SubscriptionState {
        if self.cancelled_at.is_some() {
            SubscriptionState::Cancelled
        } else if self.payment_failed_at.is_some() {
            SubscriptionState::PaymentFailed
        } else if self.has_converted() {
            SubscriptionState::Active
        } else {
            SubscriptionState::Trialing
        }
    }

    /// Default trial window starting at `now`
    pub fn trial_window_from(now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
        (now, now + Duration::days(TRIAL_LENGTH_DAYS))
    }
}

/// User model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub full_name: String,
    /// Admins receive trial and billing emails
    pub is_admin: bool,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn user_status(&self) -> UserStatus {
        match self.status.as_str() {
            "suspended" => UserStatus::Suspended,
            "soft_deleted" => UserStatus::SoftDeleted,
            "hard_deleted" => UserStatus::HardDeleted,
            _ => UserStatus::Active,
        }
    }
}

/// Append-only audit log entry. Rows are never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// Nullable for system-triggered actions
    pub user_id: Option<Uuid>,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_plan_default() {
        assert_eq!(Plan::default(), Plan::Starter);
    }

    #[test]
    fn test_plan_pricing() {
        assert_eq!(Plan::Starter.monthly_price_pence(), 2_900);
        assert_eq!(Plan::Pro.monthly_price_pence(), 7_900);
        assert_eq!(Plan::Enterprise.monthly_price_pence(), 19_900);

        // Base plus two extra seats
        assert_eq!(Plan::Pro.monthly_cost_pence(2), 7_900 + 2 * 700);
        assert_eq!(Plan::Starter.monthly_cost_pence(0), 2_900);
    }

    #[test]
    fn test_plan_rank_ordering() {
        assert!(Plan::Pro.rank() > Plan::Starter.rank());
        assert!(Plan::Enterprise.rank() > Plan::Pro.rank());
    }

    #[test]
    fn test_plan_display_and_parse() {
        assert_eq!(format!("{}", Plan::Pro), "pro");
        assert_eq!("PRO".parse::<Plan>().unwrap(), Plan::Pro);
        assert_eq!("enterprise".parse::<Plan>().unwrap(), Plan::Enterprise);
        assert!("gold".parse::<Plan>().is_err());
    }

    #[test]
    fn test_user_status_seat_counting() {
        assert!(UserStatus::Active.is_active());
        assert!(!UserStatus::Suspended.is_active());
        assert!(!UserStatus::SoftDeleted.is_active());
    }

    #[test]
    fn test_state_machine_transitions() {
        use SubscriptionState::*;
        assert!(Trialing.can_transition_to(Active));
        assert!(Active.can_transition_to(PaymentFailed));
        assert!(PaymentFailed.can_transition_to(Active));
        assert!(Active.can_transition_to(Cancelled));
        assert!(Cancelled.can_transition_to(Deleted));

        // Terminal states
        assert!(!Cancelled.can_transition_to(Active));
        assert!(!Deleted.can_transition_to(Active));
        assert!(!Deleted.can_transition_to(Deleted));

        // No going back to trial
        assert!(!Active.can_transition_to(Trialing));
    }

    fn org_fixture() -> Organisation {
        let now = datetime!(2025-01-10 09:00 UTC);
        Organisation {
            id: Uuid::new_v4(),
            name: "Acme Plumbing".to_string(),
            plan: "pro".to_string(),
            trial_start: Some(now),
            trial_end: Some(now + Duration::days(TRIAL_LENGTH_DAYS)),
            stripe_subscription_id: None,
            trial_reminder_7_sent: false,
            trial_reminder_3_sent: false,
            trial_reminder_1_sent: false,
            additional_seats: 2,
            pending_plan: None,
            pending_plan_effective_at: None,
            payment_failed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_org_seat_capacity() {
        let org = org_fixture();
        assert_eq!(org.seat_capacity(), 12); // Pro includes 10, plus 2 extra
    }

    #[test]
    fn test_org_derived_state() {
        let mut org = org_fixture();
        assert_eq!(org.subscription_state(), SubscriptionState::Trialing);

        org.stripe_subscription_id = Some("sub_123".to_string());
        assert_eq!(org.subscription_state(), SubscriptionState::Active);

        org.payment_failed_at = Some(datetime!(2025-02-01 00:00 UTC));
        assert_eq!(org.subscription_state(), SubscriptionState::PaymentFailed);

        org.cancelled_at = Some(datetime!(2025-03-01 00:00 UTC));
        assert_eq!(org.subscription_state(), SubscriptionState::Cancelled);
    }

    #[test]
    fn test_trial_window() {
        let now = datetime!(2025-01-10 09:00 UTC);
        let (start, end) = Organisation::trial_window_from(now);
        assert_eq!(start, now);
        assert_eq!(end - start, Duration::days(14));
    }
}
