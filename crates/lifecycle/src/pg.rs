//! Postgres implementation of `LifecycleStore`

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use fieldhq_shared::{OrgId, Organisation, Plan, User, UserId};

use crate::clock::ReminderBucket;
use crate::error::LifecycleResult;
use crate::store::LifecycleStore;

const ORG_COLUMNS: &str = r#"
    id, name, plan, trial_start, trial_end, stripe_subscription_id,
    trial_reminder_7_sent, trial_reminder_3_sent, trial_reminder_1_sent,
    additional_seats, pending_plan, pending_plan_effective_at,
    payment_failed_at, cancelled_at, cancellation_reason,
    created_at, updated_at
"#;

/// Production store backend over a Postgres pool
#[derive(Clone)]
pub struct PgLifecycleStore {
    pool: PgPool,
}

impl PgLifecycleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LifecycleStore for PgLifecycleStore {
    async fn list_trial_candidates(
        &self,
        now: OffsetDateTime,
    ) -> LifecycleResult<Vec<Organisation>> {
        let orgs = sqlx::query_as::<_, Organisation>(&format!(
            r#"
            SELECT {ORG_COLUMNS}
            FROM organisations
            WHERE stripe_subscription_id IS NULL
              AND trial_end IS NOT NULL
              AND trial_end > $1
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(orgs)
    }

    async fn list_recently_expired(
        &self,
        now: OffsetDateTime,
    ) -> LifecycleResult<Vec<Organisation>> {
        let orgs = sqlx::query_as::<_, Organisation>(&format!(
            r#"
            SELECT {ORG_COLUMNS}
            FROM organisations
            WHERE stripe_subscription_id IS NULL
              AND trial_end < $1
              AND trial_end > $1 - INTERVAL '24 hours'
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(orgs)
    }

    async fn mark_reminder_sent(
        &self,
        org_id: OrgId,
        bucket: ReminderBucket,
    ) -> LifecycleResult<()> {
        // Flags only move false -> true
        let sql = match bucket {
            ReminderBucket::SevenDay => {
                "UPDATE organisations SET trial_reminder_7_sent = TRUE, updated_at = NOW() WHERE id = $1"
            }
            ReminderBucket::ThreeDay => {
                "UPDATE organisations SET trial_reminder_3_sent = TRUE, updated_at = NOW() WHERE id = $1"
            }
            ReminderBucket::OneDay => {
                "UPDATE organisations SET trial_reminder_1_sent = TRUE, updated_at = NOW() WHERE id = $1"
            }
        };
        sqlx::query(sql).bind(org_id.0).execute(&self.pool).await?;
        Ok(())
    }

    async fn admin_user(&self, org_id: OrgId) -> LifecycleResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, org_id, email, full_name, is_admin, status, created_at, updated_at
            FROM users
            WHERE org_id = $1 AND is_admin = TRUE AND status = 'active'
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(org_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn has_audit_action(&self, user_id: UserId, action: &str) -> LifecycleResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM audit_logs WHERE user_id = $1 AND action = $2)",
        )
        .bind(user_id.0)
        .bind(action)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_audit(
        &self,
        user_id: Option<UserId>,
        action: &str,
        details: serde_json::Value,
    ) -> LifecycleResult<()> {
        sqlx::query("INSERT INTO audit_logs (user_id, action, details) VALUES ($1, $2, $3)")
            .bind(user_id.map(|u| u.0))
            .bind(action)
            .bind(details)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_org(&self, org_id: OrgId) -> LifecycleResult<Option<Organisation>> {
        let org = sqlx::query_as::<_, Organisation>(&format!(
            "SELECT {ORG_COLUMNS} FROM organisations WHERE id = $1"
        ))
        .bind(org_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(org)
    }

    async fn active_user_count(&self, org_id: OrgId) -> LifecycleResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE org_id = $1 AND status = 'active'",
        )
        .bind(org_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn set_trial_window(
        &self,
        org_id: OrgId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> LifecycleResult<()> {
        sqlx::query(
            "UPDATE organisations SET trial_start = $2, trial_end = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(org_id.0)
        .bind(start)
        .bind(end)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_activated(
        &self,
        org_id: OrgId,
        stripe_subscription_id: &str,
    ) -> LifecycleResult<()> {
        sqlx::query(
            r#"
            UPDATE organisations
            SET stripe_subscription_id = $2, payment_failed_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(org_id.0)
        .bind(stripe_subscription_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_plan(&self, org_id: OrgId, plan: Plan) -> LifecycleResult<()> {
        sqlx::query(
            r#"
            UPDATE organisations
            SET plan = $2, pending_plan = NULL, pending_plan_effective_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(org_id.0)
        .bind(plan.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn schedule_downgrade(
        &self,
        org_id: OrgId,
        plan: Plan,
        effective_at: OffsetDateTime,
    ) -> LifecycleResult<()> {
        sqlx::query(
            r#"
            UPDATE organisations
            SET pending_plan = $2, pending_plan_effective_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(org_id.0)
        .bind(plan.to_string())
        .bind(effective_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_additional_seats(&self, org_id: OrgId, seats: i32) -> LifecycleResult<()> {
        sqlx::query("UPDATE organisations SET additional_seats = $2, updated_at = NOW() WHERE id = $1")
            .bind(org_id.0)
            .bind(seats)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_payment_failed(&self, org_id: OrgId, at: OffsetDateTime) -> LifecycleResult<()> {
        sqlx::query("UPDATE organisations SET payment_failed_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(org_id.0)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_cancelled(
        &self,
        org_id: OrgId,
        at: OffsetDateTime,
        reason: &str,
    ) -> LifecycleResult<()> {
        sqlx::query(
            r#"
            UPDATE organisations
            SET cancelled_at = $2, cancellation_reason = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(org_id.0)
        .bind(at)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_org(&self, org_id: OrgId) -> LifecycleResult<()> {
        // Users cascade via the FK; audit rows keep a null user_id
        sqlx::query("DELETE FROM organisations WHERE id = $1")
            .bind(org_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
