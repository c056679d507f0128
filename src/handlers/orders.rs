use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AuthRouterExt, AuthUser};
use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::services::orders::{OrderListResponse, OrderResponse};
use crate::{ApiResponse, AppState, ListQuery};

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/mine", get(list_my_orders))
        .route("/by-payment-intent/:intent_id", get(get_order_by_payment_intent))
        .route("/by-number/:order_number", get(get_order_by_number))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_order_status))
        .route("/:id/cancel", post(cancel_order))
        .with_auth()
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateStatusRequest {
    /// One of the enumerated order statuses.
    #[schema(example = "shipped")]
    pub status: String,
}

/// Admin listing, paginated.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number, 1-based"),
        ("limit" = Option<u64>, Query, description = "Items per page, max 100")
    ),
    responses(
        (status = 200, description = "Orders page", body = crate::ApiResponse<OrderListResponse>),
        (status = 401, description = "No valid session", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not an admin", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    state.access.require_admin(&user)?;
    let orders = state.services.order.list_orders(query.page, query.limit).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// The signed-in customer's order history, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/orders/mine",
    responses(
        (status = 200, description = "Order history", body = crate::ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "No valid session", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state.services.order.list_orders_for_user(user.user_id).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Read a single order. Admins see any order; everyone else only their own,
/// and an order owned by someone else reads as 404.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "The order, amounts in major units", body = crate::ApiResponse<OrderResponse>),
        (status = 401, description = "No valid session", body = crate::errors::ErrorResponse),
        (status = 404, description = "Absent or not owned by the caller", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = if state.access.is_admin(&user) {
        state.services.order.get_order(id).await?
    } else {
        state.services.order.get_order_for_owner(id, &user).await?
    };
    Ok(Json(ApiResponse::success(order)))
}

/// Read a single order by its customer-facing number, with the same
/// owner-or-admin scoping as the lookup by id.
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-number/{order_number}",
    params(("order_number" = String, Path, description = "Customer-facing order number")),
    responses(
        (status = 200, description = "The order", body = crate::ApiResponse<OrderResponse>),
        (status = 404, description = "Absent or not owned by the caller", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order_by_number(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.order.get_order_by_number(&order_number).await?;
    if !state.access.is_admin(&user) && order.user_id != Some(user.user_id) {
        return Err(ServiceError::NotFound("order not found".into()));
    }
    Ok(Json(ApiResponse::success(order)))
}

/// Admin lookup by the provider's payment intent id.
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-payment-intent/{intent_id}",
    params(("intent_id" = String, Path, description = "Payment intent id")),
    responses(
        (status = 200, description = "The order", body = crate::ApiResponse<OrderResponse>),
        (status = 403, description = "Not an admin", body = crate::errors::ErrorResponse),
        (status = 404, description = "No order for this intent", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order_by_payment_intent(
    State(state): State<AppState>,
    user: AuthUser,
    Path(intent_id): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    state.access.require_admin(&user)?;
    let order = state
        .services
        .order
        .get_order_by_payment_intent(&intent_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Admin status override, restricted to the enumerated statuses and the
/// same predecessor rules the reconciliation service enforces.
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Order after the transition", body = crate::ApiResponse<OrderResponse>),
        (status = 400, description = "Unknown status value", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not an admin", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed from the current status", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    state.access.require_admin(&user)?;

    let target: OrderStatus = request.status.parse().map_err(|_| {
        ServiceError::ValidationError(format!("unknown order status: {:?}", request.status))
    })?;

    state.services.reconciliation.admin_set_status(id, target).await?;
    let order = state.services.order.get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Owner cancellation, valid only while the order is still pending.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Cancelled order", body = crate::ApiResponse<OrderResponse>),
        (status = 404, description = "Absent or not owned by the caller", body = crate::errors::ErrorResponse),
        (status = 409, description = "No longer pending", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    state
        .services
        .reconciliation
        .cancel_by_owner(id, &user)
        .await?;
    let order = state.services.order.get_order_for_owner(id, &user).await?;
    Ok(Json(ApiResponse::success(order)))
}
