//! Audit logging constants for lifecycle events
//!
//! Prevents magic strings and ensures consistency across the codebase.
//! Every subscription transition and the expired-trial email write exactly
//! one row to `audit_logs` using one of these action strings.

/// Action strings for audit log entries
pub mod action {
    /// Trial window initialised at signup
    pub const TRIAL_STARTED: &str = "TRIAL_STARTED";

    /// Expired-trial email dispatched. Existence of a row with this action
    /// for an organisation's admin is the de-duplication marker for the
    /// expiry notification (there is no boolean column for this milestone).
    pub const TRIAL_EXPIRED_EMAIL_SENT: &str = "TRIAL_EXPIRED_EMAIL_SENT";

    /// Trial converted to a paid subscription
    pub const SUBSCRIPTION_ACTIVATED: &str = "SUBSCRIPTION_ACTIVATED";

    /// Immediate plan upgrade applied
    pub const PLAN_UPGRADED: &str = "PLAN_UPGRADED";

    /// Downgrade scheduled for the next billing boundary
    pub const PLAN_DOWNGRADE_SCHEDULED: &str = "PLAN_DOWNGRADE_SCHEDULED";

    /// Additional seats purchased
    pub const SEATS_ADDED: &str = "SEATS_ADDED";

    /// Additional seats released
    pub const SEATS_REMOVED: &str = "SEATS_REMOVED";

    /// Charge failed; retried automatically by the payment processor
    pub const PAYMENT_FAILED: &str = "PAYMENT_FAILED";

    /// Subscription cancelled (data retained)
    pub const SUBSCRIPTION_CANCELLED: &str = "SUBSCRIPTION_CANCELLED";

    /// Organisation hard-deleted (data purged, irreversible)
    pub const ACCOUNT_DELETED: &str = "ACCOUNT_DELETED";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_duplicate_actions() {
        let actions = vec![
            action::TRIAL_STARTED,
            action::TRIAL_EXPIRED_EMAIL_SENT,
            action::SUBSCRIPTION_ACTIVATED,
            action::PLAN_UPGRADED,
            action::PLAN_DOWNGRADE_SCHEDULED,
            action::SEATS_ADDED,
            action::SEATS_REMOVED,
            action::PAYMENT_FAILED,
            action::SUBSCRIPTION_CANCELLED,
            action::ACCOUNT_DELETED,
        ];
        let unique = actions.iter().collect::<std::collections::HashSet<_>>();
        assert_eq!(actions.len(), unique.len(), "Audit actions must be unique");
    }
}
