//! Subscription mutation routes
//!
//! Thin handlers over the subscription engine. The auth middleware is a
//! separate concern and places the caller's organisation id in request
//! extensions before these run.

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use fieldhq_shared::{OrgId, Organisation, Plan, SubscriptionState};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct SubscriptionView {
    pub org_id: OrgId,
    pub name: String,
    pub plan: String,
    pub state: SubscriptionState,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_end: Option<OffsetDateTime>,
    pub included_seats: u32,
    pub additional_seats: i32,
    pub seat_capacity: u32,
    pub monthly_cost_pence: i64,
    pub pending_plan: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub pending_plan_effective_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
}

impl From<&Organisation> for SubscriptionView {
    fn from(org: &Organisation) -> Self {
        let plan = org.current_plan();
        Self {
            org_id: org.id.into(),
            name: org.name.clone(),
            plan: plan.to_string(),
            state: org.subscription_state(),
            trial_end: org.trial_end,
            included_seats: plan.included_seats(),
            additional_seats: org.additional_seats,
            seat_capacity: org.seat_capacity(),
            monthly_cost_pence: plan.monthly_cost_pence(org.additional_seats.max(0) as u32),
            pending_plan: org.pending_plan.clone(),
            pending_plan_effective_at: org.pending_plan_effective_at,
            cancelled_at: org.cancelled_at,
        }
    }
}

#[derive(Deserialize)]
pub struct ChangePlanRequest {
    pub plan: String,
}

#[derive(Deserialize)]
pub struct SeatsRequest {
    pub seats: u32,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteOrganisationRequest {
    /// Must match the organisation name exactly
    pub confirmation: String,
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(org_id): Extension<OrgId>,
) -> ApiResult<Json<SubscriptionView>> {
    let org = state.subscriptions.get_org(org_id).await?;
    Ok(Json(SubscriptionView::from(&org)))
}

pub async fn change_plan(
    State(state): State<AppState>,
    Extension(org_id): Extension<OrgId>,
    Json(body): Json<ChangePlanRequest>,
) -> ApiResult<Json<SubscriptionView>> {
    let plan: Plan = body
        .plan
        .parse()
        .map_err(|e: fieldhq_shared::FieldError| ApiError::BadRequest(e.to_string()))?;
    let org = state
        .subscriptions
        .change_plan(org_id, plan, OffsetDateTime::now_utc())
        .await?;
    Ok(Json(SubscriptionView::from(&org)))
}

pub async fn add_seats(
    State(state): State<AppState>,
    Extension(org_id): Extension<OrgId>,
    Json(body): Json<SeatsRequest>,
) -> ApiResult<Json<SubscriptionView>> {
    let org = state.subscriptions.add_seats(org_id, body.seats).await?;
    Ok(Json(SubscriptionView::from(&org)))
}

pub async fn remove_seats(
    State(state): State<AppState>,
    Extension(org_id): Extension<OrgId>,
    Json(body): Json<SeatsRequest>,
) -> ApiResult<Json<SubscriptionView>> {
    let org = state.subscriptions.remove_seats(org_id, body.seats).await?;
    Ok(Json(SubscriptionView::from(&org)))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(org_id): Extension<OrgId>,
    Json(body): Json<CancelRequest>,
) -> ApiResult<Json<SubscriptionView>> {
    let reason = body.reason.unwrap_or_default();
    let org = state
        .subscriptions
        .cancel(org_id, &reason, OffsetDateTime::now_utc())
        .await?;
    Ok(Json(SubscriptionView::from(&org)))
}

pub async fn delete_organisation(
    State(state): State<AppState>,
    Extension(org_id): Extension<OrgId>,
    Json(body): Json<DeleteOrganisationRequest>,
) -> ApiResult<StatusCode> {
    state
        .subscriptions
        .delete_account(org_id, &body.confirmation)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::routes::create_router;
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use fieldhq_lifecycle::mailer::fakes::RecordingMailer;
    use fieldhq_lifecycle::store::memory::MemoryStore;
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use time::Duration;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            bind_address: "127.0.0.1:0".to_string(),
            database_url: "postgres://localhost/fieldhq_test".to_string(),
            database_max_connections: 1,
            cron_secret: "test-cron-secret".to_string(),
            resend_api_key: String::new(),
            email_from: "FieldHQ <noreply@fieldhq.app>".to_string(),
            dashboard_url: "https://app.fieldhq.app".to_string(),
            support_email: "support@fieldhq.app".to_string(),
        }
    }

    struct Harness {
        app: axum::Router,
        store: Arc<MemoryStore>,
        org_id: OrgId,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let now = OffsetDateTime::now_utc();
        let (org_id, _) = store.seed_trial_org("Acme Plumbing", now + Duration::days(7));
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/fieldhq_test")
            .unwrap();
        let mailer = Arc::new(RecordingMailer::new());
        let state = AppState::with_backends(
            pool,
            test_config(),
            Arc::clone(&store) as Arc<dyn fieldhq_lifecycle::store::LifecycleStore>,
            mailer,
        );
        Harness {
            app: create_router(state),
            store,
            org_id,
        }
    }

    fn json_request(
        method: &str,
        uri: &str,
        org_id: OrgId,
        body: serde_json::Value,
    ) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .extension(org_id)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn activate(store: &MemoryStore, org_id: OrgId) {
        if let Some(mut org) = store.org(org_id) {
            org.stripe_subscription_id = Some("sub_123".to_string());
            store.insert_org(org);
        }
    }

    #[tokio::test]
    async fn get_subscription_reports_trial_state() {
        let h = harness();
        let request = Request::builder()
            .uri("/subscription")
            .extension(h.org_id)
            .body(Body::empty())
            .unwrap();
        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["state"], "trialing");
        assert_eq!(body["plan"], "starter");
        assert_eq!(body["seat_capacity"], 3);
        assert!(body["trial_end"].as_str().is_some());
    }

    #[tokio::test]
    async fn plan_upgrade_round_trips() {
        let h = harness();
        activate(&h.store, h.org_id);

        let response = h
            .app
            .oneshot(json_request(
                "POST",
                "/subscription/plan",
                h.org_id,
                json!({ "plan": "pro" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["plan"], "pro");
        assert_eq!(body["monthly_cost_pence"], 7_900);
    }

    #[tokio::test]
    async fn unknown_plan_is_a_bad_request() {
        let h = harness();
        activate(&h.store, h.org_id);

        let response = h
            .app
            .oneshot(json_request(
                "POST",
                "/subscription/plan",
                h.org_id,
                json!({ "plan": "gold" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn plan_change_during_trial_conflicts() {
        let h = harness();
        let response = h
            .app
            .oneshot(json_request(
                "POST",
                "/subscription/plan",
                h.org_id,
                json!({ "plan": "pro" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn seat_routes_enforce_preconditions() {
        let h = harness();
        activate(&h.store, h.org_id);

        let response = h
            .app
            .clone()
            .oneshot(json_request(
                "POST",
                "/subscription/seats/add",
                h.org_id,
                json!({ "seats": 2 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["seat_capacity"], 5);

        // Removing more than were purchased
        let response = h
            .app
            .oneshot(json_request(
                "POST",
                "/subscription/seats/remove",
                h.org_id,
                json!({ "seats": 3 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_requires_matching_confirmation() {
        let h = harness();
        let response = h
            .app
            .clone()
            .oneshot(json_request(
                "DELETE",
                "/organisation",
                h.org_id,
                json!({ "confirmation": "wrong name" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(h.store.org(h.org_id).is_some());

        let response = h
            .app
            .oneshot(json_request(
                "DELETE",
                "/organisation",
                h.org_id,
                json!({ "confirmation": "Acme Plumbing" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(h.store.org(h.org_id).is_none());
    }

    #[tokio::test]
    async fn cancel_records_the_reason() {
        let h = harness();
        activate(&h.store, h.org_id);

        let response = h
            .app
            .oneshot(json_request(
                "POST",
                "/subscription/cancel",
                h.org_id,
                json!({ "reason": "seasonal business" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["state"], "cancelled");
        let org = h.store.org(h.org_id).unwrap();
        assert_eq!(org.cancellation_reason.as_deref(), Some("seasonal business"));
    }
}
