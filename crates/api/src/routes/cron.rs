//! Cron entry points
//!
//! Hit by an external scheduler (e.g. a platform cron hitting the service
//! over HTTP). Authentication is a shared secret supplied either as the
//! `x-cron-secret` header or a `?secret=` query parameter, compared in
//! constant time.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use subtle::ConstantTimeEq;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, warn};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CronQuery {
    pub secret: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReminderResults {
    sent7_day: u32,
    sent3_day: u32,
    sent1_day: u32,
    total: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpiredResults {
    sent_count: u32,
}

#[derive(Serialize)]
struct CronResults {
    reminders: ReminderResults,
    expired: ExpiredResults,
}

#[derive(Serialize)]
struct CronResponse {
    success: bool,
    message: String,
    results: CronResults,
    timestamp: String,
}

fn rfc3339_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Constant-time comparison; mismatched lengths compare unequal without
/// early exit on content
fn secret_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn authorize(
    headers: &HeaderMap,
    query: &CronQuery,
    state: &AppState,
) -> Result<(), ApiError> {
    let provided = headers
        .get("x-cron-secret")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| query.secret.clone());

    match provided {
        Some(secret) if secret_matches(&secret, &state.config.cron_secret) => Ok(()),
        _ => {
            warn!("Rejected cron request with missing or invalid secret");
            Err(ApiError::Unauthorized)
        }
    }
}

/// Run the trial reminder pass followed by the expired-trial pass
pub async fn trial_reminders(
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = authorize(&headers, &query, &state) {
        return e.into_response();
    }

    let now = OffsetDateTime::now_utc();
    let reminders = match state.reminders.run_reminder_pass(now).await {
        Ok(counts) => counts,
        Err(e) => return cron_failure(e),
    };
    let expired = match state.reminders.run_expiry_pass(now).await {
        Ok(counts) => counts,
        Err(e) => return cron_failure(e),
    };

    let body = CronResponse {
        success: true,
        message: format!(
            "Sent {} trial reminder(s) and {} expiry notice(s)",
            reminders.total(),
            expired.sent
        ),
        results: CronResults {
            reminders: ReminderResults {
                sent7_day: reminders.sent_7_day,
                sent3_day: reminders.sent_3_day,
                sent1_day: reminders.sent_1_day,
                total: reminders.total(),
            },
            expired: ExpiredResults {
                sent_count: expired.sent,
            },
        },
        timestamp: rfc3339_now(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn cron_failure(e: fieldhq_lifecycle::LifecycleError) -> Response {
    error!(error = %e, "Cron pass failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "success": false,
            "error": "CRON_PASS_FAILED",
            "message": "Trial lifecycle pass failed",
            "timestamp": rfc3339_now(),
        })),
    )
        .into_response()
}

/// Unauthenticated liveness endpoint for the scheduler
pub async fn cron_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "fieldhq-cron",
        "timestamp": rfc3339_now(),
    }))
}

/// Authenticated no-op, for verifying scheduler configuration
pub async fn cron_test(
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = authorize(&headers, &query, &state) {
        return e.into_response();
    }
    Json(json!({
        "success": true,
        "message": "Cron authentication OK",
        "timestamp": rfc3339_now(),
    }))
    .into_response()
}
