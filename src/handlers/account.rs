use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get},
    Router,
};
use uuid::Uuid;

use crate::auth::{AuthRouterExt, AuthUser};
use crate::entities::{address, wishlist_item};
use crate::errors::ServiceError;
use crate::services::customers::{
    AddWishlistItemRequest, CreateAddressRequest, ProfileResponse, UpdateProfileRequest,
};
use crate::{ApiResponse, AppState};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/addresses", get(list_addresses).post(create_address))
        .route("/addresses/:id", delete(delete_address))
        .route("/wishlist", get(list_wishlist).post(add_wishlist_item))
        .route("/wishlist/:id", delete(remove_wishlist_item))
        .with_auth()
}

#[utoipa::path(
    get,
    path = "/api/v1/account/profile",
    responses(
        (status = 200, description = "The caller's profile", body = crate::ApiResponse<ProfileResponse>),
        (status = 401, description = "No valid session", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<ProfileResponse>>, ServiceError> {
    let profile = state.services.customer.get_profile(&user).await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[utoipa::path(
    put,
    path = "/api/v1/account/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = crate::ApiResponse<ProfileResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<ProfileResponse>>, ServiceError> {
    let profile = state.services.customer.update_profile(&user, request).await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[utoipa::path(
    get,
    path = "/api/v1/account/addresses",
    responses(
        (status = 200, description = "Saved addresses", body = crate::ApiResponse<Vec<address::Model>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<address::Model>>>, ServiceError> {
    let addresses = state.services.customer.list_addresses(&user).await?;
    Ok(Json(ApiResponse::success(addresses)))
}

#[utoipa::path(
    post,
    path = "/api/v1/account/addresses",
    request_body = CreateAddressRequest,
    responses(
        (status = 201, description = "Created address", body = crate::ApiResponse<address::Model>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn create_address(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateAddressRequest>,
) -> Result<(StatusCode, Json<ApiResponse<address::Model>>), ServiceError> {
    let created = state.services.customer.create_address(&user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/account/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Absent or not owned by the caller", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn delete_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.customer.delete_address(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/account/wishlist",
    responses(
        (status = 200, description = "Wishlist entries", body = crate::ApiResponse<Vec<wishlist_item::Model>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn list_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<wishlist_item::Model>>>, ServiceError> {
    let items = state.services.customer.list_wishlist(&user).await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    post,
    path = "/api/v1/account/wishlist",
    request_body = AddWishlistItemRequest,
    responses(
        (status = 201, description = "Saved entry (idempotent per product)", body = crate::ApiResponse<wishlist_item::Model>)
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn add_wishlist_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<AddWishlistItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<wishlist_item::Model>>), ServiceError> {
    let item = state.services.customer.add_wishlist_item(&user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(item))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/account/wishlist/{id}",
    params(("id" = Uuid, Path, description = "Wishlist entry id")),
    responses(
        (status = 204, description = "Removed"),
        (status = 404, description = "Absent or not owned by the caller", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn remove_wishlist_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.customer.remove_wishlist_item(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
