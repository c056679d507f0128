use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Emberline API",
        version = "0.3.0",
        description = r#"
# Emberline Storefront API

Order lifecycle, checkout, and payment reconciliation for the Emberline
candle & fragrance shop.

## Authentication

Customer and admin endpoints use JWT bearer sessions:

```
Authorization: Bearer <access-token>
```

The payment webhook authenticates by signature instead; see the
`Stripe-Signature` header on `POST /payments/webhook`.

## Amounts

All monetary values in responses are major units (e.g. `49.99`) with two
fractional digits. Internally everything is stored in minor units.
        "#,
        contact(
            name = "Emberline Engineering",
            email = "engineering@emberline.shop"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "https://api.emberline.shop/api/v1", description = "Production"),
        (url = "http://localhost:8080/api/v1", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Cart to pending order and payment intent"),
        (name = "Orders", description = "Order lookup and status management"),
        (name = "Payments", description = "Payment provider webhook"),
        (name = "Account", description = "Profile, addresses, and wishlist"),
        (name = "Auth", description = "Registration and sessions")
    ),
    paths(
        crate::handlers::checkout::start_checkout,
        crate::handlers::checkout::update_amounts,
        crate::handlers::checkout::complete_redirect,

        crate::handlers::orders::list_orders,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_number,
        crate::handlers::orders::get_order_by_payment_intent,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::cancel_order,

        crate::handlers::payment_webhooks::payment_webhook,

        crate::handlers::account::get_profile,
        crate::handlers::account::update_profile,
        crate::handlers::account::list_addresses,
        crate::handlers::account::create_address,
        crate::handlers::account::delete_address,
        crate::handlers::account::list_wishlist,
        crate::handlers::account::add_wishlist_item,
        crate::handlers::account::remove_wishlist_item,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::ListQuery,

            crate::entities::order::OrderStatus,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderListResponse,
            crate::handlers::orders::UpdateStatusRequest,

            crate::services::checkout::CheckoutRequest,
            crate::services::checkout::CheckoutItem,
            crate::services::checkout::CheckoutResponse,
            crate::services::checkout::UpdateAmountsRequest,
            crate::services::checkout::UpdateAmountsResponse,
            crate::services::checkout::RedirectDestination,
            crate::services::checkout::CompleteRedirectResponse,

            crate::services::customers::ProfileResponse,
            crate::services::customers::UpdateProfileRequest,
            crate::services::customers::CreateAddressRequest,
            crate::services::customers::AddWishlistItemRequest,
            crate::entities::address::Model,
            crate::entities::wishlist_item::Model,

            crate::auth::RegisterRequest,
            crate::auth::LoginRequest,
            crate::auth::TokenResponse,

            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_generates() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Emberline API"));
        assert!(json.contains("/api/v1/payments/webhook"));
        assert!(json.contains("bearer_auth"));
    }
}
