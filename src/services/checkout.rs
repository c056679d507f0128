use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::money::Money;
use crate::payments::StripeGateway;
use crate::services::orders::{CreateOrder, NewOrderItem, OrderService};
use crate::services::reconciliation::ReconciliationService;

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CheckoutItem>,
    /// Shipping cost in major units; converted to minor units on entry.
    #[schema(value_type = f64, example = 3.95)]
    pub shipping: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct CheckoutItem {
    #[validate(length(min = 1))]
    pub product_id: String,
    pub variant_id: Option<String>,
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Unit price in major units; converted to minor units on entry.
    #[schema(value_type = f64, example = 12.50)]
    pub unit_price: Decimal,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    /// Handed to the provider's browser SDK for the hosted payment step.
    pub client_secret: String,
    #[schema(value_type = f64, example = 49.99)]
    pub total: Decimal,
    pub currency: String,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct UpdateAmountsRequest {
    pub order_id: Uuid,
    /// Replacement shipping cost in major units.
    #[schema(value_type = f64, example = 5.95)]
    pub shipping: Decimal,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UpdateAmountsResponse {
    pub order_id: Uuid,
    pub client_secret: Option<String>,
    #[schema(value_type = f64)]
    pub total: Decimal,
    #[schema(value_type = f64)]
    pub shipping: Decimal,
}

/// Where the storefront should send the customer after the hosted payment
/// step. This is the only thing the client-reported redirect status decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RedirectDestination {
    Success,
    Retry,
    Home,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CompleteRedirectResponse {
    pub destination: RedirectDestination,
    pub order_number: Option<String>,
    pub status: Option<OrderStatus>,
}

#[derive(Clone)]
pub struct CheckoutService {
    orders: OrderService,
    reconciliation: ReconciliationService,
    gateway: StripeGateway,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        orders: OrderService,
        reconciliation: ReconciliationService,
        gateway: StripeGateway,
        currency: String,
    ) -> Self {
        Self {
            orders,
            reconciliation,
            gateway,
            currency,
        }
    }

    /// Create the pending order and its payment intent. Amounts enter the
    /// system here: decimals convert to minor units once and stay that way.
    #[instrument(skip(self, request), fields(item_count = request.items.len()))]
    pub async fn start_checkout(
        &self,
        request: CheckoutRequest,
        caller: Option<&AuthUser>,
    ) -> Result<CheckoutResponse, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let items = request
            .items
            .into_iter()
            .map(|item| {
                Ok(NewOrderItem {
                    unit_price: Money::from_major(item.unit_price)?,
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    title: item.title,
                    quantity: item.quantity,
                    image_url: item.image_url,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;
        let shipping = Money::from_major(request.shipping)?;

        let order = self
            .orders
            .create_order(CreateOrder {
                items,
                shipping,
                currency: self.currency.clone(),
                user_id: caller.map(|c| c.user_id),
            })
            .await?;

        let total = Money::from_major(order.total)?;
        let intent = self
            .gateway
            .create_payment_intent(total, &self.currency)
            .await?;
        self.orders.attach_payment_intent(order.id, &intent.id).await?;

        let client_secret = intent.client_secret.ok_or_else(|| {
            ServiceError::UpstreamError("provider returned no client secret".into())
        })?;

        Ok(CheckoutResponse {
            order_id: order.id,
            order_number: order.order_number,
            client_secret,
            total: total.to_major(),
            currency: self.currency.clone(),
        })
    }

    /// Pre-settlement amount change (e.g. a different shipping option). The
    /// provider is updated first so a settled intent rejects the whole
    /// operation before the order record moves.
    #[instrument(skip(self, request, caller), fields(order_id = %request.order_id))]
    pub async fn update_amounts(
        &self,
        request: UpdateAmountsRequest,
        caller: Option<&AuthUser>,
    ) -> Result<UpdateAmountsResponse, ServiceError> {
        request.validate()?;
        let new_shipping = Money::from_major(request.shipping)?;
        if new_shipping.is_negative() {
            return Err(ServiceError::ValidationError(
                "shipping cost must not be negative".into(),
            ));
        }

        let order = self.orders.find_order(request.order_id).await?;
        if let Some(owner) = order.user_id {
            // Owned orders may only be touched by their owner; the mismatch
            // reads as NotFound. Guest orders carry no owner to check.
            match caller {
                Some(caller) if caller.user_id == owner => {}
                _ => return Err(ServiceError::NotFound("order not found".into())),
            }
        }

        let goods = Money::from_minor(order.total_minor - order.shipping_minor);
        let new_total = goods
            .checked_add(new_shipping)
            .ok_or_else(|| ServiceError::ValidationError("amount overflow".into()))?;

        let intent_id = order.payment_intent_id.as_deref().ok_or_else(|| {
            ServiceError::InvalidState("order has no payment intent yet".into())
        })?;

        let intent = self
            .gateway
            .update_payment_intent_amount(intent_id, new_total)
            .await?;
        self.orders
            .update_amounts(order.id, new_total, new_shipping)
            .await?;

        Ok(UpdateAmountsResponse {
            order_id: order.id,
            client_secret: intent.client_secret,
            total: new_total.to_major(),
            shipping: new_shipping.to_major(),
        })
    }

    /// Redirect callback: the browser-reported status picks a navigation
    /// target and nothing else. Convergence happens through a server-side
    /// provider re-query; if that fails the customer still gets navigated
    /// and the webhook channel converges the order later.
    #[instrument(skip(self))]
    pub async fn complete_redirect(
        &self,
        payment_intent_id: &str,
        redirect_status: Option<&str>,
    ) -> Result<CompleteRedirectResponse, ServiceError> {
        let destination = match redirect_status {
            Some("succeeded") => RedirectDestination::Success,
            Some("failed") | Some("requires_payment_method") => RedirectDestination::Retry,
            _ => RedirectDestination::Home,
        };

        if let Err(e) = self.reconciliation.refresh_from_gateway(payment_intent_id).await {
            warn!(error = %e, intent_id = %payment_intent_id, "redirect-triggered refresh failed");
        }

        let order = self.orders.find_by_payment_intent(payment_intent_id).await?;
        let (order_number, status) = match order {
            Some(order) => {
                let status = order.order_status()?;
                (Some(order.order_number), Some(status))
            }
            None => (None, None),
        };

        Ok(CompleteRedirectResponse {
            destination,
            order_number,
            status,
        })
    }
}
