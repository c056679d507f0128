use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;

use crate::auth::MaybeAuthUser;
use crate::errors::ServiceError;
use crate::services::checkout::{
    CheckoutRequest, CheckoutResponse, CompleteRedirectResponse, UpdateAmountsRequest,
    UpdateAmountsResponse,
};
use crate::{ApiResponse, AppState};

pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(start_checkout))
        .route("/payment-intent", put(update_amounts))
        .route("/complete", get(complete_redirect))
}

/// Query parameters the provider appends to the return URL. Only
/// `payment_intent` identifies anything; `redirect_status` is untrusted
/// browser input and decides navigation alone.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CompleteRedirectParams {
    pub payment_intent: String,
    #[allow(dead_code)]
    pub payment_intent_client_secret: Option<String>,
    pub redirect_status: Option<String>,
}

/// Start a checkout: creates the pending order and its payment intent.
/// Works for guests and signed-in customers alike.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Pending order and client secret", body = crate::ApiResponse<CheckoutResponse>),
        (status = 400, description = "Empty cart or invalid quantities", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn start_checkout(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    let response = state
        .services
        .checkout
        .start_checkout(request, caller.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Pre-settlement amount update (e.g. a different shipping option). Fails
/// with 409 once the intent has settled.
#[utoipa::path(
    put,
    path = "/api/v1/checkout/payment-intent",
    request_body = UpdateAmountsRequest,
    responses(
        (status = 200, description = "Updated amounts and client secret", body = crate::ApiResponse<UpdateAmountsResponse>),
        (status = 404, description = "Order absent or not owned by the caller", body = crate::errors::ErrorResponse),
        (status = 409, description = "Intent already settled", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn update_amounts(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Json(request): Json<UpdateAmountsRequest>,
) -> Result<Json<ApiResponse<UpdateAmountsResponse>>, ServiceError> {
    let response = state
        .services
        .checkout
        .update_amounts(request, caller.as_ref())
        .await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Return target after the hosted payment step. Navigation only: order
/// state converges via the webhook and a server-side provider re-query,
/// never from the browser-reported status.
#[utoipa::path(
    get,
    path = "/api/v1/checkout/complete",
    params(
        ("payment_intent" = String, Query, description = "Payment intent id from the return URL"),
        ("redirect_status" = Option<String>, Query, description = "Browser-reported outcome; picks a navigation target only")
    ),
    responses(
        (status = 200, description = "Navigation decision", body = crate::ApiResponse<CompleteRedirectResponse>)
    ),
    tag = "Checkout"
)]
pub async fn complete_redirect(
    State(state): State<AppState>,
    Query(params): Query<CompleteRedirectParams>,
) -> Result<Json<ApiResponse<CompleteRedirectResponse>>, ServiceError> {
    let response = state
        .services
        .checkout
        .complete_redirect(&params.payment_intent, params.redirect_status.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(response)))
}
