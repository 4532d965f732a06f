//! HTTP route definitions

pub mod cron;
pub mod health;
pub mod subscriptions;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        // Cron entry points, hit by the external scheduler
        .route("/cron/trial-reminders", post(cron::trial_reminders))
        .route("/cron/health", get(cron::cron_health))
        .route("/cron/test", get(cron::cron_test))
        // Subscription mutations; auth middleware puts the org id in
        // request extensions before these run
        .route("/subscription", get(subscriptions::get_subscription))
        .route("/subscription/plan", post(subscriptions::change_plan))
        .route("/subscription/seats/add", post(subscriptions::add_seats))
        .route("/subscription/seats/remove", post(subscriptions::remove_seats))
        .route("/subscription/cancel", post(subscriptions::cancel))
        .route("/organisation", delete(subscriptions::delete_organisation))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
