//! Storage abstraction for the lifecycle engine
//!
//! The dispatcher and the subscription engine run against this trait, so
//! the cron path and the mutation paths are testable without a live
//! database. `PgLifecycleStore` is the production backend; the in-memory
//! backend lives behind the `test-support` feature.

use async_trait::async_trait;
use fieldhq_shared::{OrgId, Organisation, Plan, User, UserId};
use time::OffsetDateTime;

use crate::clock::ReminderBucket;
use crate::error::LifecycleResult;

/// Persistence operations the lifecycle engine needs.
///
/// All flag updates are single-row and last-writer-wins; the scheduler is
/// expected to keep a single cron invocation active at a time.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    // ── Cron passes ──────────────────────────────────────────────────────

    /// Organisations still in their trial window and not converted:
    /// `trial_end IS NOT NULL AND trial_end > now AND stripe_subscription_id IS NULL`
    async fn list_trial_candidates(&self, now: OffsetDateTime)
        -> LifecycleResult<Vec<Organisation>>;

    /// Organisations whose trial expired within the last 24h without converting
    async fn list_recently_expired(&self, now: OffsetDateTime)
        -> LifecycleResult<Vec<Organisation>>;

    /// Set the de-dup flag for a reminder bucket. Flags only ever go
    /// false→true; there is no path that resets one.
    async fn mark_reminder_sent(&self, org_id: OrgId, bucket: ReminderBucket)
        -> LifecycleResult<()>;

    /// The admin user who receives trial and billing emails for an org
    async fn admin_user(&self, org_id: OrgId) -> LifecycleResult<Option<User>>;

    /// Whether an audit row exists for this user and action (expiry de-dup)
    async fn has_audit_action(&self, user_id: UserId, action: &str) -> LifecycleResult<bool>;

    /// Append an audit row. Rows are immutable once written.
    async fn insert_audit(
        &self,
        user_id: Option<UserId>,
        action: &str,
        details: serde_json::Value,
    ) -> LifecycleResult<()>;

    // ── Subscription mutations ───────────────────────────────────────────

    async fn get_org(&self, org_id: OrgId) -> LifecycleResult<Option<Organisation>>;

    /// Users counting towards seat capacity (status = active)
    async fn active_user_count(&self, org_id: OrgId) -> LifecycleResult<i64>;

    async fn set_trial_window(
        &self,
        org_id: OrgId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> LifecycleResult<()>;

    /// Record conversion: sets the Stripe subscription id and clears any
    /// payment-failed marker
    async fn set_activated(&self, org_id: OrgId, stripe_subscription_id: &str)
        -> LifecycleResult<()>;

    /// Apply a plan immediately, clearing any scheduled downgrade
    async fn set_plan(&self, org_id: OrgId, plan: Plan) -> LifecycleResult<()>;

    /// Schedule a downgrade effective at the next billing boundary
    async fn schedule_downgrade(
        &self,
        org_id: OrgId,
        plan: Plan,
        effective_at: OffsetDateTime,
    ) -> LifecycleResult<()>;

    async fn set_additional_seats(&self, org_id: OrgId, seats: i32) -> LifecycleResult<()>;

    async fn set_payment_failed(&self, org_id: OrgId, at: OffsetDateTime) -> LifecycleResult<()>;

    async fn set_cancelled(
        &self,
        org_id: OrgId,
        at: OffsetDateTime,
        reason: &str,
    ) -> LifecycleResult<()>;

    /// Hard delete: purges the organisation row (users cascade)
    async fn delete_org(&self, org_id: OrgId) -> LifecycleResult<()>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod memory {
    //! In-memory store backend for tests

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fieldhq_shared::{OrgId, Organisation, Plan, User, UserId};
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    use crate::clock::ReminderBucket;
    use crate::error::{LifecycleError, LifecycleResult};

    use super::LifecycleStore;

    #[derive(Debug, Clone)]
    pub struct AuditRow {
        pub user_id: Option<Uuid>,
        pub action: String,
        pub details: serde_json::Value,
    }

    #[derive(Default)]
    struct MemoryState {
        orgs: HashMap<Uuid, Organisation>,
        users: Vec<User>,
        audit: Vec<AuditRow>,
        /// Simulates a persistence failure on flag writes for these orgs
        fail_mark_for: Vec<Uuid>,
    }

    /// In-memory `LifecycleStore` used by engine and router tests
    #[derive(Default)]
    pub struct MemoryStore {
        state: Mutex<MemoryState>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> LifecycleResult<std::sync::MutexGuard<'_, MemoryState>> {
            self.state
                .lock()
                .map_err(|_| LifecycleError::Internal("memory store lock poisoned".to_string()))
        }

        pub fn insert_org(&self, org: Organisation) {
            if let Ok(mut state) = self.state.lock() {
                state.orgs.insert(org.id, org);
            }
        }

        pub fn insert_user(&self, user: User) {
            if let Ok(mut state) = self.state.lock() {
                state.users.push(user);
            }
        }

        pub fn org(&self, org_id: OrgId) -> Option<Organisation> {
            self.state.lock().ok()?.orgs.get(&org_id.0).cloned()
        }

        pub fn audit_rows(&self) -> Vec<AuditRow> {
            self.state
                .lock()
                .map(|s| s.audit.clone())
                .unwrap_or_default()
        }

        pub fn fail_flag_writes_for(&self, org_id: OrgId) {
            if let Ok(mut state) = self.state.lock() {
                state.fail_mark_for.push(org_id.0);
            }
        }

        /// Build a trial org with an admin user; returns (org id, admin email)
        pub fn seed_trial_org(
            &self,
            name: &str,
            trial_end: OffsetDateTime,
        ) -> (OrgId, String) {
            let now = trial_end - Duration::days(14);
            let org_id = Uuid::new_v4();
            let email = format!("admin+{}@example.com", &org_id.to_string()[..8]);
            self.insert_org(Organisation {
                id: org_id,
                name: name.to_string(),
                plan: "starter".to_string(),
                trial_start: Some(now),
                trial_end: Some(trial_end),
                stripe_subscription_id: None,
                trial_reminder_7_sent: false,
                trial_reminder_3_sent: false,
                trial_reminder_1_sent: false,
                additional_seats: 0,
                pending_plan: None,
                pending_plan_effective_at: None,
                payment_failed_at: None,
                cancelled_at: None,
                cancellation_reason: None,
                created_at: now,
                updated_at: now,
            });
            self.insert_user(User {
                id: Uuid::new_v4(),
                org_id,
                email: email.clone(),
                full_name: "Admin User".to_string(),
                is_admin: true,
                status: "active".to_string(),
                created_at: now,
                updated_at: now,
            });
            (OrgId(org_id), email)
        }
    }

    #[async_trait]
    impl LifecycleStore for MemoryStore {
        async fn list_trial_candidates(
            &self,
            now: OffsetDateTime,
        ) -> LifecycleResult<Vec<Organisation>> {
            let state = self.lock()?;
            Ok(state
                .orgs
                .values()
                .filter(|o| {
                    o.stripe_subscription_id.is_none()
                        && o.trial_end.map(|end| end > now).unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn list_recently_expired(
            &self,
            now: OffsetDateTime,
        ) -> LifecycleResult<Vec<Organisation>> {
            let state = self.lock()?;
            Ok(state
                .orgs
                .values()
                .filter(|o| {
                    o.stripe_subscription_id.is_none()
                        && o.trial_end
                            .map(|end| end < now && end > now - Duration::hours(24))
                            .unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn mark_reminder_sent(
            &self,
            org_id: OrgId,
            bucket: ReminderBucket,
        ) -> LifecycleResult<()> {
            let mut state = self.lock()?;
            if state.fail_mark_for.contains(&org_id.0) {
                return Err(LifecycleError::Database(
                    "simulated flag write failure".to_string(),
                ));
            }
            let org = state
                .orgs
                .get_mut(&org_id.0)
                .ok_or_else(|| LifecycleError::OrgNotFound(org_id.to_string()))?;
            match bucket {
                ReminderBucket::SevenDay => org.trial_reminder_7_sent = true,
                ReminderBucket::ThreeDay => org.trial_reminder_3_sent = true,
                ReminderBucket::OneDay => org.trial_reminder_1_sent = true,
            }
            Ok(())
        }

        async fn admin_user(&self, org_id: OrgId) -> LifecycleResult<Option<User>> {
            let state = self.lock()?;
            Ok(state
                .users
                .iter()
                .find(|u| u.org_id == org_id.0 && u.is_admin && u.status == "active")
                .cloned())
        }

        async fn has_audit_action(&self, user_id: UserId, action: &str) -> LifecycleResult<bool> {
            let state = self.lock()?;
            Ok(state
                .audit
                .iter()
                .any(|row| row.user_id == Some(user_id.0) && row.action == action))
        }

        async fn insert_audit(
            &self,
            user_id: Option<UserId>,
            action: &str,
            details: serde_json::Value,
        ) -> LifecycleResult<()> {
            let mut state = self.lock()?;
            state.audit.push(AuditRow {
                user_id: user_id.map(|u| u.0),
                action: action.to_string(),
                details,
            });
            Ok(())
        }

        async fn get_org(&self, org_id: OrgId) -> LifecycleResult<Option<Organisation>> {
            let state = self.lock()?;
            Ok(state.orgs.get(&org_id.0).cloned())
        }

        async fn active_user_count(&self, org_id: OrgId) -> LifecycleResult<i64> {
            let state = self.lock()?;
            Ok(state
                .users
                .iter()
                .filter(|u| u.org_id == org_id.0 && u.status == "active")
                .count() as i64)
        }

        async fn set_trial_window(
            &self,
            org_id: OrgId,
            start: OffsetDateTime,
            end: OffsetDateTime,
        ) -> LifecycleResult<()> {
            let mut state = self.lock()?;
            let org = state
                .orgs
                .get_mut(&org_id.0)
                .ok_or_else(|| LifecycleError::OrgNotFound(org_id.to_string()))?;
            org.trial_start = Some(start);
            org.trial_end = Some(end);
            Ok(())
        }

        async fn set_activated(
            &self,
            org_id: OrgId,
            stripe_subscription_id: &str,
        ) -> LifecycleResult<()> {
            let mut state = self.lock()?;
            let org = state
                .orgs
                .get_mut(&org_id.0)
                .ok_or_else(|| LifecycleError::OrgNotFound(org_id.to_string()))?;
            org.stripe_subscription_id = Some(stripe_subscription_id.to_string());
            org.payment_failed_at = None;
            Ok(())
        }

        async fn set_plan(&self, org_id: OrgId, plan: Plan) -> LifecycleResult<()> {
            let mut state = self.lock()?;
            let org = state
                .orgs
                .get_mut(&org_id.0)
                .ok_or_else(|| LifecycleError::OrgNotFound(org_id.to_string()))?;
            org.plan = plan.to_string();
            org.pending_plan = None;
            org.pending_plan_effective_at = None;
            Ok(())
        }

        async fn schedule_downgrade(
            &self,
            org_id: OrgId,
            plan: Plan,
            effective_at: OffsetDateTime,
        ) -> LifecycleResult<()> {
            let mut state = self.lock()?;
            let org = state
                .orgs
                .get_mut(&org_id.0)
                .ok_or_else(|| LifecycleError::OrgNotFound(org_id.to_string()))?;
            org.pending_plan = Some(plan.to_string());
            org.pending_plan_effective_at = Some(effective_at);
            Ok(())
        }

        async fn set_additional_seats(&self, org_id: OrgId, seats: i32) -> LifecycleResult<()> {
            let mut state = self.lock()?;
            let org = state
                .orgs
                .get_mut(&org_id.0)
                .ok_or_else(|| LifecycleError::OrgNotFound(org_id.to_string()))?;
            org.additional_seats = seats;
            Ok(())
        }

        async fn set_payment_failed(
            &self,
            org_id: OrgId,
            at: OffsetDateTime,
        ) -> LifecycleResult<()> {
            let mut state = self.lock()?;
            let org = state
                .orgs
                .get_mut(&org_id.0)
                .ok_or_else(|| LifecycleError::OrgNotFound(org_id.to_string()))?;
            org.payment_failed_at = Some(at);
            Ok(())
        }

        async fn set_cancelled(
            &self,
            org_id: OrgId,
            at: OffsetDateTime,
            reason: &str,
        ) -> LifecycleResult<()> {
            let mut state = self.lock()?;
            let org = state
                .orgs
                .get_mut(&org_id.0)
                .ok_or_else(|| LifecycleError::OrgNotFound(org_id.to_string()))?;
            org.cancelled_at = Some(at);
            org.cancellation_reason = Some(reason.to_string());
            Ok(())
        }

        async fn delete_org(&self, org_id: OrgId) -> LifecycleResult<()> {
            let mut state = self.lock()?;
            state.orgs.remove(&org_id.0);
            state.users.retain(|u| u.org_id != org_id.0);
            Ok(())
        }
    }
}
