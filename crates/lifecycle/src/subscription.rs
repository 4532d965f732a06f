//! Subscription mutation engine
//!
//! Every operation follows the same shape: load the org, check the state
//! machine and any preconditions, apply the mutation, write one audit row,
//! then send one notification. Preconditions reject before anything is
//! written; email failures after a successful mutation are logged, not
//! surfaced, because the state change has already happened.

use std::sync::Arc;

use serde_json::json;
use time::{Duration, OffsetDateTime};
use tracing::{error, info};

use fieldhq_shared::{OrgId, Organisation, Plan, SubscriptionState, User};

use crate::audit::action;
use crate::email::{Branding, Notification};
use crate::error::{LifecycleError, LifecycleResult};
use crate::mailer::Mailer;
use crate::store::LifecycleStore;

/// Days until a scheduled downgrade takes effect, standing in for the
/// Stripe billing-period boundary
const BILLING_PERIOD_DAYS: i64 = 30;

/// Days Stripe waits before retrying a failed charge
const PAYMENT_RETRY_DAYS: i64 = 3;

pub struct SubscriptionEngine {
    store: Arc<dyn LifecycleStore>,
    mailer: Arc<dyn Mailer>,
    branding: Branding,
}

impl SubscriptionEngine {
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

    pub async fn get_org(&self, org_id: OrgId) -> LifecycleResult<Organisation> {
        self.store
            .get_org(org_id)
            .await?
            .ok_or_else(|| LifecycleError::OrgNotFound(org_id.to_string()))
    }

    async fn require_admin(&self, org_id: OrgId) -> LifecycleResult<User> {
        self.store
            .admin_user(org_id)
            .await?
            .ok_or_else(|| LifecycleError::NoAdminUser(org_id.to_string()))
    }

    /// Plan and seat mutations only make sense on a live paid subscription
    fn require_active(org: &Organisation, action_name: &str) -> LifecycleResult<()> {
        let current = org.subscription_state();
        if current == SubscriptionState::Active {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                action: action_name.to_string(),
                state: current.to_string(),
            })
        }
    }

    fn check_transition(
        org: &Organisation,
        next: SubscriptionState,
        action_name: &str,
    ) -> LifecycleResult<()> {
        let current = org.subscription_state();
        if current.can_transition_to(next) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                action: action_name.to_string(),
                state: current.to_string(),
            })
        }
    }

    /// Audit then notify, after the mutation has committed
    async fn record_and_notify(
        &self,
        admin: &User,
        audit_action: &str,
        details: serde_json::Value,
        notification: Notification,
    ) -> LifecycleResult<()> {
        self.store
            .insert_audit(Some(admin.id.into()), audit_action, details)
            .await?;

        let content = notification.render(&self.branding);
        if let Err(e) = self.mailer.send(&admin.email, &content).await {
            error!(user_id = %admin.id, action = audit_action, error = %e, "Notification email failed");
        }
        Ok(())
    }

    /// Initialise the 14-day trial window at signup
    pub async fn start_trial(
        &self,
        org_id: OrgId,
        now: OffsetDateTime,
    ) -> LifecycleResult<Organisation> {
        let org = self.get_org(org_id).await?;
        if org.has_converted() || org.trial_end.is_some() {
            return Err(LifecycleError::InvalidTransition {
                action: "start trial".to_string(),
                state: org.subscription_state().to_string(),
            });
        }
        let admin = self.require_admin(org_id).await?;

        let (start, end) = Organisation::trial_window_from(now);
        self.store.set_trial_window(org_id, start, end).await?;
        info!(org_id = %org_id, trial_end = %end, "Trial started");

        self.record_and_notify(
            &admin,
            action::TRIAL_STARTED,
            json!({ "org_id": org_id, "trial_end": end }),
            Notification::TrialStarted {
                name: admin.full_name.clone(),
                trial_end: end,
            },
        )
        .await?;
        self.get_org(org_id).await
    }

    /// Trial conversion, or recovery after a failed payment. Clears
    /// `payment_failed_at`.
    pub async fn activate(
        &self,
        org_id: OrgId,
        stripe_subscription_id: &str,
        now: OffsetDateTime,
    ) -> LifecycleResult<Organisation> {
        let org = self.get_org(org_id).await?;
        Self::check_transition(&org, SubscriptionState::Active, "activate")?;
        let admin = self.require_admin(org_id).await?;

        self.store
            .set_activated(org_id, stripe_subscription_id)
            .await?;
        info!(org_id = %org_id, "Subscription activated");

        let plan = org.current_plan();
        let monthly_cost_pence = plan.monthly_cost_pence(org.additional_seats.max(0) as u32);
        self.record_and_notify(
            &admin,
            action::SUBSCRIPTION_ACTIVATED,
            json!({ "org_id": org_id, "plan": plan, "stripe_subscription_id": stripe_subscription_id }),
            Notification::SubscriptionActivated {
                name: admin.full_name.clone(),
                plan,
                monthly_cost_pence,
                next_billing_date: now + Duration::days(BILLING_PERIOD_DAYS),
            },
        )
        .await?;
        self.get_org(org_id).await
    }

    /// Upgrades apply immediately; downgrades are scheduled for the next
    /// billing boundary and rejected while another downgrade is pending.
    pub async fn change_plan(
        &self,
        org_id: OrgId,
        new_plan: Plan,
        now: OffsetDateTime,
    ) -> LifecycleResult<Organisation> {
        let org = self.get_org(org_id).await?;
        Self::require_active(&org, "change plan")?;
        let admin = self.require_admin(org_id).await?;

        let old_plan = org.current_plan();
        if new_plan == old_plan {
            return Err(LifecycleError::InvalidInput(format!(
                "Organisation is already on the {} plan",
                new_plan.display_name()
            )));
        }

        if new_plan.rank() > old_plan.rank() {
            self.store.set_plan(org_id, new_plan).await?;
            info!(org_id = %org_id, from = %old_plan, to = %new_plan, "Plan upgraded");

            let monthly_cost_pence =
                new_plan.monthly_cost_pence(org.additional_seats.max(0) as u32);
            self.record_and_notify(
                &admin,
                action::PLAN_UPGRADED,
                json!({ "org_id": org_id, "from": old_plan, "to": new_plan }),
                Notification::PlanUpgraded {
                    name: admin.full_name.clone(),
                    old_plan,
                    new_plan,
                    monthly_cost_pence,
                },
            )
            .await?;
        } else {
            if let (Some(pending), Some(effective_at)) =
                (&org.pending_plan, org.pending_plan_effective_at)
            {
                return Err(LifecycleError::PendingDowngradeConflict {
                    pending: pending.clone(),
                    effective_at: effective_at.to_string(),
                });
            }

            // The smaller plan must still fit the current team
            let active_users = self.store.active_user_count(org_id).await?;
            let new_capacity =
                new_plan.included_seats() + org.additional_seats.max(0) as u32;
            if active_users > i64::from(new_capacity) {
                return Err(LifecycleError::SeatCapacityBelowUsage {
                    requested: 0,
                    new_capacity,
                    active_users,
                });
            }

            let effective_at = now + Duration::days(BILLING_PERIOD_DAYS);
            self.store
                .schedule_downgrade(org_id, new_plan, effective_at)
                .await?;
            info!(org_id = %org_id, from = %old_plan, to = %new_plan, effective_at = %effective_at, "Downgrade scheduled");

            self.record_and_notify(
                &admin,
                action::PLAN_DOWNGRADE_SCHEDULED,
                json!({ "org_id": org_id, "from": old_plan, "to": new_plan, "effective_at": effective_at }),
                Notification::PlanDowngraded {
                    name: admin.full_name.clone(),
                    old_plan,
                    new_plan,
                    effective_date: effective_at,
                },
            )
            .await?;
        }
        self.get_org(org_id).await
    }

    pub async fn add_seats(&self, org_id: OrgId, count: u32) -> LifecycleResult<Organisation> {
        if count == 0 {
            return Err(LifecycleError::InvalidInput(
                "Seat count must be at least 1".to_string(),
            ));
        }
        let org = self.get_org(org_id).await?;
        Self::require_active(&org, "add seats")?;
        let admin = self.require_admin(org_id).await?;

        let new_seats = org.additional_seats.max(0) as u32 + count;
        self.store
            .set_additional_seats(org_id, new_seats as i32)
            .await?;
        info!(org_id = %org_id, added = count, total_additional = new_seats, "Seats added");

        let plan = org.current_plan();
        self.record_and_notify(
            &admin,
            action::SEATS_ADDED,
            json!({ "org_id": org_id, "added": count, "additional_seats": new_seats }),
            Notification::SeatsAdded {
                name: admin.full_name.clone(),
                seats_added: count,
                total_seats: plan.included_seats() + new_seats,
                monthly_cost_pence: plan.monthly_cost_pence(new_seats),
            },
        )
        .await?;
        self.get_org(org_id).await
    }

    /// Removal cannot take total capacity below the active-user count
    pub async fn remove_seats(&self, org_id: OrgId, count: u32) -> LifecycleResult<Organisation> {
        if count == 0 {
            return Err(LifecycleError::InvalidInput(
                "Seat count must be at least 1".to_string(),
            ));
        }
        let org = self.get_org(org_id).await?;
        Self::require_active(&org, "remove seats")?;
        let admin = self.require_admin(org_id).await?;

        let current = org.additional_seats.max(0) as u32;
        if count > current {
            return Err(LifecycleError::InvalidInput(format!(
                "Cannot remove {} seat(s): only {} additional seat(s) exist",
                count, current
            )));
        }

        let new_seats = current - count;
        let plan = org.current_plan();
        let new_capacity = plan.included_seats() + new_seats;
        let active_users = self.store.active_user_count(org_id).await?;
        if active_users > i64::from(new_capacity) {
            return Err(LifecycleError::SeatCapacityBelowUsage {
                requested: count,
                new_capacity,
                active_users,
            });
        }

        self.store
            .set_additional_seats(org_id, new_seats as i32)
            .await?;
        info!(org_id = %org_id, removed = count, total_additional = new_seats, "Seats removed");

        self.record_and_notify(
            &admin,
            action::SEATS_REMOVED,
            json!({ "org_id": org_id, "removed": count, "additional_seats": new_seats }),
            Notification::SeatsRemoved {
                name: admin.full_name.clone(),
                seats_removed: count,
                total_seats: new_capacity,
                monthly_cost_pence: plan.monthly_cost_pence(new_seats),
            },
        )
        .await?;
        self.get_org(org_id).await
    }

    /// Mark a failed charge reported by the payment provider
    pub async fn record_payment_failure(
        &self,
        org_id: OrgId,
        amount_pence: i64,
        now: OffsetDateTime,
    ) -> LifecycleResult<Organisation> {
        let org = self.get_org(org_id).await?;
        Self::check_transition(&org, SubscriptionState::PaymentFailed, "record payment failure")?;
        let admin = self.require_admin(org_id).await?;

        self.store.set_payment_failed(org_id, now).await?;
        info!(org_id = %org_id, amount_pence, "Payment failure recorded");

        self.record_and_notify(
            &admin,
            action::PAYMENT_FAILED,
            json!({ "org_id": org_id, "amount_pence": amount_pence }),
            Notification::PaymentFailed {
                name: admin.full_name.clone(),
                amount_pence,
                retry_date: now + Duration::days(PAYMENT_RETRY_DAYS),
            },
        )
        .await?;
        self.get_org(org_id).await
    }

    /// Cancel the subscription. Terminal for billing; data is retained and
    /// access runs until the end of the paid period or trial.
    pub async fn cancel(
        &self,
        org_id: OrgId,
        reason: &str,
        now: OffsetDateTime,
    ) -> LifecycleResult<Organisation> {
        let org = self.get_org(org_id).await?;
        Self::check_transition(&org, SubscriptionState::Cancelled, "cancel")?;
        let admin = self.require_admin(org_id).await?;

        let access_until = if org.has_converted() {
            now + Duration::days(BILLING_PERIOD_DAYS)
        } else {
            org.trial_end.unwrap_or(now)
        };

        self.store.set_cancelled(org_id, now, reason).await?;
        info!(org_id = %org_id, reason, "Subscription cancelled");

        self.record_and_notify(
            &admin,
            action::SUBSCRIPTION_CANCELLED,
            json!({ "org_id": org_id, "reason": reason, "access_until": access_until }),
            Notification::CancellationConfirmed {
                name: admin.full_name.clone(),
                access_until,
            },
        )
        .await?;
        self.get_org(org_id).await
    }

    /// Hard delete. The caller must type the organisation name exactly.
    /// The audit row and the farewell email go out before the purge, since
    /// neither the org nor its users exist afterwards.
    pub async fn delete_account(&self, org_id: OrgId, confirmation: &str) -> LifecycleResult<()> {
        let org = self.get_org(org_id).await?;
        Self::check_transition(&org, SubscriptionState::Deleted, "delete account")?;
        if confirmation != org.name {
            return Err(LifecycleError::ConfirmationMismatch);
        }
        let admin = self.require_admin(org_id).await?;

        // user_id is left null so the audit row survives the user purge
        self.store
            .insert_audit(
                None,
                action::ACCOUNT_DELETED,
                json!({ "org_id": org_id, "org_name": org.name }),
            )
            .await?;

        let content = Notification::AccountDeletion {
            name: admin.full_name.clone(),
            org_name: org.name.clone(),
        }
        .render(&self.branding);
        if let Err(e) = self.mailer.send(&admin.email, &content).await {
            error!(org_id = %org_id, error = %e, "Deletion confirmation email failed");
        }

        self.store.delete_org(org_id).await?;
        info!(org_id = %org_id, "Organisation deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::fakes::RecordingMailer;
    use crate::store::memory::MemoryStore;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-03-10 09:00 UTC);

    struct Fixture {
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
        engine: SubscriptionEngine,
        org_id: OrgId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let (org_id, _) = store.seed_trial_org("Acme Plumbing", NOW + Duration::days(7));
        let engine = SubscriptionEngine::new(
            Arc::clone(&store) as Arc<dyn LifecycleStore>,
            Arc::clone(&mailer) as Arc<dyn Mailer>,
        );
        Fixture {
            store,
            mailer,
            engine,
            org_id,
        }
    }

    async fn activate(f: &Fixture) {
        f.engine
            .activate(f.org_id, "sub_123", NOW)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn activate_converts_the_trial() {
        let f = fixture();
        let org = f.engine.activate(f.org_id, "sub_123", NOW).await.unwrap();

        assert_eq!(org.subscription_state(), SubscriptionState::Active);
        assert_eq!(org.stripe_subscription_id.as_deref(), Some("sub_123"));
        assert_eq!(f.mailer.sent_count(), 1);
        let rows = f.store.audit_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, action::SUBSCRIPTION_ACTIVATED);
    }

    #[tokio::test]
    async fn activate_clears_payment_failure() {
        let f = fixture();
        activate(&f).await;
        f.engine
            .record_payment_failure(f.org_id, 2_900, NOW)
            .await
            .unwrap();

        let org = f
            .engine
            .activate(f.org_id, "sub_456", NOW + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(org.subscription_state(), SubscriptionState::Active);
        assert!(org.payment_failed_at.is_none());
    }

    #[tokio::test]
    async fn upgrade_is_immediate() {
        let f = fixture();
        activate(&f).await;

        let org = f
            .engine
            .change_plan(f.org_id, Plan::Pro, NOW)
            .await
            .unwrap();
        assert_eq!(org.current_plan(), Plan::Pro);
        assert!(org.pending_plan.is_none());

        let actions: Vec<_> = f.store.audit_rows().iter().map(|r| r.action.clone()).collect();
        assert!(actions.contains(&action::PLAN_UPGRADED.to_string()));
    }

    #[tokio::test]
    async fn downgrade_is_scheduled_not_applied() {
        let f = fixture();
        activate(&f).await;
        f.engine.change_plan(f.org_id, Plan::Pro, NOW).await.unwrap();

        let org = f
            .engine
            .change_plan(f.org_id, Plan::Starter, NOW)
            .await
            .unwrap();
        // Still on Pro until the boundary
        assert_eq!(org.current_plan(), Plan::Pro);
        assert_eq!(org.pending_plan.as_deref(), Some("starter"));
        assert!(org.pending_plan_effective_at.is_some());
    }

    #[tokio::test]
    async fn second_downgrade_conflicts_with_pending() {
        let f = fixture();
        activate(&f).await;
        f.engine
            .change_plan(f.org_id, Plan::Enterprise, NOW)
            .await
            .unwrap();
        f.engine
            .change_plan(f.org_id, Plan::Pro, NOW)
            .await
            .unwrap();

        let err = f
            .engine
            .change_plan(f.org_id, Plan::Starter, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PendingDowngradeConflict { .. }));
    }

    #[tokio::test]
    async fn change_to_same_plan_is_rejected() {
        let f = fixture();
        activate(&f).await;
        let err = f
            .engine
            .change_plan(f.org_id, Plan::Starter, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn seats_add_and_remove_round_trip() {
        let f = fixture();
        activate(&f).await;

        let org = f.engine.add_seats(f.org_id, 2).await.unwrap();
        assert_eq!(org.additional_seats, 2);
        assert_eq!(org.seat_capacity(), 5); // Starter includes 3

        let org = f.engine.remove_seats(f.org_id, 1).await.unwrap();
        assert_eq!(org.additional_seats, 1);
        assert_eq!(org.seat_capacity(), 4);
    }

    #[tokio::test]
    async fn seat_removal_respects_active_users() {
        let f = fixture();
        activate(&f).await;
        f.engine.add_seats(f.org_id, 2).await.unwrap(); // capacity 5

        // Fill the org to 5 active users (1 seeded admin + 4 more)
        for i in 0..4 {
            f.store.insert_user(fieldhq_shared::User {
                id: uuid::Uuid::new_v4(),
                org_id: f.org_id.0,
                email: format!("tech{}@example.com", i),
                full_name: format!("Tech {}", i),
                is_admin: false,
                status: "active".to_string(),
                created_at: NOW,
                updated_at: NOW,
            });
        }

        let err = f.engine.remove_seats(f.org_id, 1).await.unwrap_err();
        match err {
            LifecycleError::SeatCapacityBelowUsage {
                requested,
                new_capacity,
                active_users,
            } => {
                assert_eq!(requested, 1);
                assert_eq!(new_capacity, 4);
                assert_eq!(active_users, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn remove_more_than_purchased_is_rejected() {
        let f = fixture();
        activate(&f).await;
        let err = f.engine.remove_seats(f.org_id, 1).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn trialing_org_cannot_change_plan() {
        let f = fixture();
        let err = f
            .engine
            .change_plan(f.org_id, Plan::Pro, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn cancel_is_terminal_for_billing() {
        let f = fixture();
        activate(&f).await;
        let org = f
            .engine
            .cancel(f.org_id, "too expensive", NOW)
            .await
            .unwrap();
        assert_eq!(org.subscription_state(), SubscriptionState::Cancelled);
        assert_eq!(org.cancellation_reason.as_deref(), Some("too expensive"));

        // No further billing mutations
        let err = f
            .engine
            .change_plan(f.org_id, Plan::Pro, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
        let err = f.engine.activate(f.org_id, "sub_999", NOW).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn delete_requires_exact_confirmation() {
        let f = fixture();
        let err = f
            .engine
            .delete_account(f.org_id, "acme plumbing")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::ConfirmationMismatch));
        assert!(f.store.org(f.org_id).is_some());
    }

    #[tokio::test]
    async fn delete_purges_and_leaves_audit_trail() {
        let f = fixture();
        f.engine
            .delete_account(f.org_id, "Acme Plumbing")
            .await
            .unwrap();

        assert!(f.store.org(f.org_id).is_none());
        assert_eq!(f.mailer.sent_count(), 1);
        let rows = f.store.audit_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, action::ACCOUNT_DELETED);
        assert!(rows[0].user_id.is_none());
    }

    #[tokio::test]
    async fn payment_failure_requires_active_state() {
        let f = fixture();
        let err = f
            .engine
            .record_payment_failure(f.org_id, 2_900, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn start_trial_sets_the_window() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let (org_id, _) = store.seed_trial_org("Fresh Ltd", NOW + Duration::days(7));
        // Clear the seeded window to model a brand-new signup
        if let Some(mut org) = store.org(org_id) {
            org.trial_start = None;
            org.trial_end = None;
            store.insert_org(org);
        }
        let engine = SubscriptionEngine::new(
            Arc::clone(&store) as Arc<dyn LifecycleStore>,
            Arc::clone(&mailer) as Arc<dyn Mailer>,
        );

        let org = engine.start_trial(org_id, NOW).await.unwrap();
        assert_eq!(org.trial_start, Some(NOW));
        assert_eq!(org.trial_end, Some(NOW + Duration::days(14)));

        // A second call must not reset the clock
        let err = engine.start_trial(org_id, NOW + Duration::days(1)).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }
}
