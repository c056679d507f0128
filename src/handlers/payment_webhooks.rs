use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode};
use tracing::warn;

use crate::errors::ServiceError;
use crate::payments::SIGNATURE_HEADER;
use crate::AppState;

/// Inbound payment provider webhook.
///
/// The signature is verified over the raw request bytes before anything is
/// parsed; a mismatch is a 400 and the payload is never processed (the
/// provider retries on its own schedule). Duplicate and out-of-order
/// deliveries land as no-ops and still return 200 so retries stop.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event processed (possibly a no-op)"),
        (status = 400, description = "Invalid signature or malformed payload", body = crate::errors::ErrorResponse),
        (status = 500, description = "Store failure; safe to retry", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let event = match state.gateway.verify_webhook_event(&body, signature) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "rejecting payment webhook");
            return Err(err);
        }
    };

    state.services.reconciliation.handle_webhook_event(&event).await?;
    Ok(StatusCode::OK)
}
