use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;

use super::error::ApiResult;
use super::extract::ValidatedJson;
use crate::rpc::Status;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProviderWebhook {
    #[serde(default)]
    pub event: String,
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    pub status: String,
}

/// POST /webhook/yookassa
///
/// Terminal payment state arrives here; anything else the provider sends
/// is acknowledged and ignored.
pub async fn provider_webhook(
    State(state): State<AppState>,
    Json(webhook): Json<ProviderWebhook>,
) -> ApiResult<StatusCode> {
    tracing::info!(
        event = %webhook.event,
        payment_id = %webhook.object.id,
        status = %webhook.object.status,
        "received provider webhook"
    );

    if webhook.event == "payment.succeeded" || webhook.event == "payment.canceled" {
        state
            .payments
            .process_webhook(&webhook.object.id, &webhook.object.status)
            .await
            .map_err(Status::from)?;
    }

    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct ManualStatusRequest {
    pub payment_id: String,
    /// `succeeded` or `canceled`.
    pub status: String,
}

/// POST /api/manual-status-update
///
/// Drives the same reconciliation path as the provider webhook, for
/// environments where the provider cannot reach this host.
pub async fn manual_status_update(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ManualStatusRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    tracing::info!(payment_id = %req.payment_id, status = %req.status, "manual status update");

    state
        .payments
        .process_webhook(&req.payment_id, &req.status)
        .await
        .map_err(Status::from)?;

    Ok(Json(json!({ "message": "status updated successfully" })))
}
