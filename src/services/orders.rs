use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::DbPool;
use crate::entities::order::{
    self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel, OrderStatus,
};
use crate::entities::order_item::{
    self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity, Model as OrderItemModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money::{sum_money, Money};

/// A line item at checkout time, prices already in minor units.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Money,
    pub image_url: Option<String>,
}

/// Input to [`OrderService::create_order`]. The total is derived here, in
/// minor units, never accepted from the caller.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub items: Vec<NewOrderItem>,
    pub shipping: Money,
    pub currency: String,
    pub user_id: Option<Uuid>,
}

/// Order as returned to callers: amounts converted to major units at this
/// boundary and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    #[schema(value_type = f64, example = 49.99)]
    pub total: Decimal,
    #[schema(value_type = f64, example = 3.95)]
    pub shipping: Decimal,
    pub currency: String,
    pub payment_intent_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub title: String,
    pub quantity: i32,
    #[schema(value_type = f64, example = 12.50)]
    pub unit_price: Decimal,
    #[schema(value_type = f64, example = 25.00)]
    pub line_total: Decimal,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Create an order and its line items in one transaction, status
    /// `pending`.
    #[instrument(skip(self, request), fields(item_count = request.items.len()))]
    pub async fn create_order(&self, request: CreateOrder) -> Result<OrderResponse, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one item".into(),
            ));
        }
        for item in &request.items {
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity must be positive for {:?}",
                    item.product_id
                )));
            }
            if item.unit_price.is_negative() {
                return Err(ServiceError::ValidationError(format!(
                    "unit price must not be negative for {:?}",
                    item.product_id
                )));
            }
        }
        if request.shipping.is_negative() {
            return Err(ServiceError::ValidationError(
                "shipping cost must not be negative".into(),
            ));
        }

        let line_totals = request
            .items
            .iter()
            .map(|item| {
                item.unit_price
                    .checked_mul_quantity(item.quantity)
                    .ok_or_else(|| ServiceError::ValidationError("amount overflow".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let total = sum_money(line_totals)?
            .checked_add(request.shipping)
            .ok_or_else(|| ServiceError::ValidationError("amount overflow".into()))?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();

        let txn = self.db.begin().await?;

        let order_model = OrderActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            user_id: Set(request.user_id),
            status: Set(OrderStatus::Pending.to_string()),
            payment_intent_id: Set(None),
            total_minor: Set(total.minor()),
            shipping_minor: Set(request.shipping.minor()),
            currency: Set(request.currency),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let item_models: Vec<OrderItemActiveModel> = request
            .items
            .into_iter()
            .map(|item| OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                variant_id: Set(item.variant_id),
                title: Set(item.title),
                quantity: Set(item.quantity),
                unit_price_minor: Set(item.unit_price.minor()),
                image_url: Set(item.image_url),
                created_at: Set(now),
            })
            .collect();
        OrderItemEntity::insert_many(item_models).exec(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, total_minor = total.minor(), "order created");
        self.emit(Event::OrderCreated(order_id)).await;

        let items = self.load_items(order_id).await?;
        Ok(model_to_response(order_model, items))
    }

    /// Admin read by internal id.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(order_id).await?;
        let items = self.load_items(order.id).await?;
        Ok(model_to_response(order, items))
    }

    /// Read scoped to a non-admin caller. An order that exists but belongs
    /// to someone else is indistinguishable from one that does not exist.
    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    pub async fn get_order_for_owner(
        &self,
        order_id: Uuid,
        caller: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(order_id).await?;
        ensure_owned(&order, caller)?;
        let items = self.load_items(order.id).await?;
        Ok(model_to_response(order, items))
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("order not found".into()))?;
        let items = self.load_items(order.id).await?;
        Ok(model_to_response(order, items))
    }

    pub async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::PaymentIntentId.eq(payment_intent_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn get_order_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self
            .find_by_payment_intent(payment_intent_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("order not found".into()))?;
        let items = self.load_items(order.id).await?;
        Ok(model_to_response(order, items))
    }

    /// Order history for a customer, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut responses = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.load_items(order.id).await?;
            responses.push(model_to_response(order, items));
        }
        Ok(responses)
    }

    /// Admin listing with pagination.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let mut responses = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.load_items(order.id).await?;
            responses.push(model_to_response(order, items));
        }

        Ok(OrderListResponse {
            orders: responses,
            total,
            page,
            limit,
        })
    }

    /// Attach the payment intent id created for this order. Set-once: the
    /// guarded update refuses to overwrite an existing value.
    #[instrument(skip(self))]
    pub async fn attach_payment_intent(
        &self,
        order_id: Uuid,
        payment_intent_id: &str,
    ) -> Result<(), ServiceError> {
        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::PaymentIntentId,
                Expr::value(payment_intent_id),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentIntentId.is_null())
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            let existing = self.find_order(order_id).await?;
            if existing.payment_intent_id.as_deref() == Some(payment_intent_id) {
                return Ok(());
            }
            return Err(ServiceError::InvalidState(
                "order already has a payment intent".into(),
            ));
        }
        Ok(())
    }

    /// Pre-payment amount mutation: only valid while the order is still
    /// `pending`, enforced by the WHERE guard rather than a separate read.
    #[instrument(skip(self), fields(total_minor = total.minor()))]
    pub async fn update_amounts(
        &self,
        order_id: Uuid,
        total: Money,
        shipping: Money,
    ) -> Result<(), ServiceError> {
        let result = OrderEntity::update_many()
            .col_expr(order::Column::TotalMinor, Expr::value(total.minor()))
            .col_expr(order::Column::ShippingMinor, Expr::value(shipping.minor()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending.as_ref()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // Distinguish a missing order from one past mutation.
            let order = self.find_order(order_id).await?;
            warn!(order_id = %order_id, status = %order.status, "amount update refused");
            return Err(ServiceError::InvalidState(
                "amounts can only change while the order is pending".into(),
            ));
        }
        Ok(())
    }

    pub(crate) async fn find_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("order not found".into()))
    }

    pub(crate) async fn load_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderItemModel>, ServiceError> {
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to send domain event");
            }
        }
    }
}

/// Owner check with the no-leak policy: a mismatch reads as `NotFound`, so a
/// caller cannot probe for other customers' order ids.
pub(crate) fn ensure_owned(order: &OrderModel, caller: &AuthUser) -> Result<(), ServiceError> {
    if order.user_id == Some(caller.user_id) {
        Ok(())
    } else {
        Err(ServiceError::NotFound("order not found".into()))
    }
}

fn generate_order_number() -> String {
    // Unambiguous uppercase alphabet (no 0/O, 1/I).
    const ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("EMB-{suffix}")
}

pub(crate) fn model_to_response(model: OrderModel, items: Vec<OrderItemModel>) -> OrderResponse {
    let status = model.order_status().unwrap_or(OrderStatus::Pending);

    let items = items
        .into_iter()
        .map(|item| {
            let unit = Money::from_minor(item.unit_price_minor);
            let line = unit
                .checked_mul_quantity(item.quantity)
                .unwrap_or(Money::ZERO);
            OrderItemResponse {
                product_id: item.product_id,
                variant_id: item.variant_id,
                title: item.title,
                quantity: item.quantity,
                unit_price: unit.to_major(),
                line_total: line.to_major(),
                image_url: item.image_url,
            }
        })
        .collect();

    OrderResponse {
        id: model.id,
        order_number: model.order_number,
        status,
        total: Money::from_minor(model.total_minor).to_major(),
        shipping: Money::from_minor(model.shipping_minor).to_major(),
        currency: model.currency,
        payment_intent_id: model.payment_intent_id,
        user_id: model.user_id,
        items,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order_model(total_minor: i64, user_id: Option<Uuid>) -> OrderModel {
        let now = Utc::now();
        OrderModel {
            id: Uuid::new_v4(),
            order_number: "EMB-TESTTEST".into(),
            user_id,
            status: "pending".into(),
            payment_intent_id: None,
            total_minor,
            shipping_minor: 395,
            currency: "gbp".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn caller(user_id: Uuid) -> AuthUser {
        AuthUser {
            user_id,
            name: "Maya".into(),
            email: "maya@example.com".into(),
            role: "user".into(),
            token_id: "jti".into(),
        }
    }

    #[test]
    fn response_amounts_are_major_units() {
        let model = order_model(4999, None);
        let item = OrderItemModel {
            id: Uuid::new_v4(),
            order_id: model.id,
            product_id: "candle-ember".into(),
            variant_id: None,
            title: "Ember No. 4".into(),
            quantity: 2,
            unit_price_minor: 1250,
            image_url: None,
            created_at: model.created_at,
        };

        let response = model_to_response(model, vec![item]);
        assert_eq!(response.total, dec!(49.99));
        assert_eq!(response.shipping, dec!(3.95));
        assert_eq!(response.items[0].unit_price, dec!(12.50));
        assert_eq!(response.items[0].line_total, dec!(25.00));
    }

    #[test]
    fn ownership_mismatch_reads_as_not_found() {
        let owner = Uuid::new_v4();
        let model = order_model(4999, Some(owner));

        assert!(ensure_owned(&model, &caller(owner)).is_ok());
        assert!(matches!(
            ensure_owned(&model, &caller(Uuid::new_v4())),
            Err(ServiceError::NotFound(_))
        ));

        // Guest orders have no owner to match.
        let guest = order_model(4999, None);
        assert!(matches!(
            ensure_owned(&guest, &caller(Uuid::new_v4())),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn order_numbers_are_well_formed() {
        for _ in 0..32 {
            let number = generate_order_number();
            assert!(number.starts_with("EMB-"));
            assert_eq!(number.len(), 12);
            assert!(!number.contains('0') && !number.contains('O'));
        }
    }
}
