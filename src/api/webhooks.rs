use axum::{
    body::Bytes,
    extract::{rejection::PathRejection, Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::middleware::error::{
    get_request_id_from_headers, success_response_with_message, tag_request_id,
};

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// POST /webhook
///
/// The body is taken as raw bytes so the signature is checked against exactly
/// what the gateway signed.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .webhooks
        .process_webhook(&body, signature)
        .await
        .map_err(AppError::from)
        .map_err(tag_request_id(request_id))?;

    info!(
        log_id = %outcome.log_id,
        event_type = %outcome.event_type,
        duplicate = outcome.duplicate,
        "Webhook acknowledged"
    );
    Ok(success_response_with_message(outcome, "Webhook processed"))
}

/// POST /webhooks/{log_id}/retry (admin)
pub async fn retry_webhook(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let result: AppResult<_> = async {
        user.require_admin()?;
        let Path(log_id) = path?;
        let retried = state
            .webhooks
            .retry_event(log_id, state.max_webhook_retries)
            .await?;
        Ok((log_id, retried))
    }
    .await;

    let (log_id, retried) = result.map_err(tag_request_id(request_id))?;
    let message = if retried {
        "Webhook event reprocessed"
    } else {
        "Webhook event was already processed"
    };
    Ok(success_response_with_message(
        json!({ "log_id": log_id, "retried": retried }),
        message,
    ))
}
