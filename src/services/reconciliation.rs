//! Order status reconciliation.
//!
//! Payment completion is reported over two independent, unordered channels:
//! the provider's signed webhook and the customer's browser redirect. Both
//! may arrive more than once, in either order. Every transition here is a
//! single conditional UPDATE guarded on the set of allowed predecessor
//! statuses; zero rows affected is a successful no-op, which is what makes
//! the handlers safe under duplicate and racing delivery. There is no other
//! locking.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::DbPool;
use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::payments::{PaymentIntentStatus, StripeGateway, WebhookEvent, WebhookEventKind};
use crate::services::orders::{ensure_owned, OrderService};

/// Result of a transition attempt. A no-op is a success: the order was
/// already at or past the requested status, or a concurrent writer won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    NoOp,
}

/// Statuses a transition may start from, per target.
///
/// `paid` is enterable from `failed` and `failed` from `paid` so that when a
/// misbehaving provider reports both outcomes for one intent, the last
/// persisted write wins. Once fulfillment starts (`processing` onward) a
/// late payment event can no longer regress the order. Ordering is never
/// re-derived from payload timestamps; webhook delivery order is not
/// guaranteed to match event-generation order.
fn allowed_predecessors(target: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match target {
        Paid => &[Pending, Failed],
        Failed => &[Pending, Paid],
        Processing => &[Paid],
        Shipped => &[Processing],
        Delivered => &[Shipped],
        Cancelled => &[Pending, Paid],
        // Nothing transitions back to pending.
        Pending => &[],
    }
}

#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DbPool>,
    orders: OrderService,
    gateway: StripeGateway,
    event_sender: Option<EventSender>,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DbPool>,
        orders: OrderService,
        gateway: StripeGateway,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            orders,
            gateway,
            event_sender,
        }
    }

    /// Apply one transition as a conditional write. The WHERE guard on the
    /// current status is the entire race policy: a separate read followed by
    /// an unguarded write would lose under concurrent delivery.
    #[instrument(skip(self), fields(order_id = %order_id, target = %target))]
    pub async fn apply_transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<TransitionOutcome, ServiceError> {
        // Read once for the audit event and for NotFound; correctness does
        // not depend on this snapshot.
        let before = self.orders.find_order(order_id).await?;
        let old_status = before.order_status()?;

        let predecessors = allowed_predecessors(target);
        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(target.as_ref()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(
                order::Column::Status.is_in(predecessors.iter().map(|s| s.as_ref())),
            )
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            info!(order_id = %order_id, current = %old_status, target = %target, "transition no-op");
            return Ok(TransitionOutcome::NoOp);
        }

        info!(order_id = %order_id, from = %old_status, to = %target, "order status changed");
        self.emit(Event::OrderStatusChanged {
            order_id,
            old_status: old_status.to_string(),
            new_status: target.to_string(),
        })
        .await;

        Ok(TransitionOutcome::Applied)
    }

    /// Webhook channel: a signature-verified event drives `paid` or
    /// `failed`. An event for an unknown intent is acknowledged as a no-op
    /// so the provider stops retrying it.
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn handle_webhook_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<TransitionOutcome, ServiceError> {
        let target = match &event.kind {
            WebhookEventKind::PaymentIntentSucceeded => OrderStatus::Paid,
            WebhookEventKind::PaymentIntentFailed => OrderStatus::Failed,
            WebhookEventKind::Unhandled(kind) => {
                info!(kind = %kind, "ignoring unhandled webhook event type");
                return Ok(TransitionOutcome::NoOp);
            }
        };

        let Some(intent_id) = event.payment_intent_id.as_deref() else {
            return Err(ServiceError::ValidationError(
                "webhook event carries no payment intent id".into(),
            ));
        };

        let Some(order) = self.orders.find_by_payment_intent(intent_id).await? else {
            warn!(intent_id = %intent_id, "webhook for unknown payment intent");
            return Ok(TransitionOutcome::NoOp);
        };

        let outcome = self.apply_transition(order.id, target).await?;
        if outcome == TransitionOutcome::Applied {
            let payment_event = match target {
                OrderStatus::Paid => Event::PaymentSucceeded {
                    order_id: order.id,
                    payment_intent_id: intent_id.to_string(),
                },
                _ => Event::PaymentFailed {
                    order_id: order.id,
                    payment_intent_id: intent_id.to_string(),
                },
            };
            self.emit(payment_event).await;
        }
        Ok(outcome)
    }

    /// Redirect channel, server side: the browser's reported status is never
    /// trusted; instead the provider is re-queried and its authoritative
    /// intent status feeds the same transitions the webhook uses.
    #[instrument(skip(self))]
    pub async fn refresh_from_gateway(
        &self,
        payment_intent_id: &str,
    ) -> Result<TransitionOutcome, ServiceError> {
        let Some(order) = self.orders.find_by_payment_intent(payment_intent_id).await? else {
            return Ok(TransitionOutcome::NoOp);
        };

        let intent = self.gateway.retrieve_payment_intent(payment_intent_id).await?;
        let target = match intent.status {
            PaymentIntentStatus::Succeeded => OrderStatus::Paid,
            PaymentIntentStatus::Canceled => OrderStatus::Failed,
            // Still in flight at the provider; nothing to converge yet.
            _ => return Ok(TransitionOutcome::NoOp),
        };

        self.apply_transition(order.id, target).await
    }

    /// Admin path: any enumerated status, subject to the same predecessor
    /// rules. Equal state is a no-op success; an impossible transition is a
    /// conflict the admin should see.
    #[instrument(skip(self))]
    pub async fn admin_set_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<TransitionOutcome, ServiceError> {
        let order = self.orders.find_order(order_id).await?;
        let current = order.order_status()?;

        if current == target {
            return Ok(TransitionOutcome::NoOp);
        }
        if !allowed_predecessors(target).contains(&current) {
            return Err(ServiceError::InvalidState(format!(
                "cannot transition order from {current} to {target}"
            )));
        }

        match self.apply_transition(order_id, target).await? {
            TransitionOutcome::Applied => Ok(TransitionOutcome::Applied),
            // The guard lost to a concurrent writer between our read and the
            // conditional update.
            TransitionOutcome::NoOp => Err(ServiceError::InvalidState(format!(
                "order changed concurrently; no longer {current}"
            ))),
        }
    }

    /// Owner path: a customer may cancel their own order while it is still
    /// `pending`.
    #[instrument(skip(self, caller), fields(caller = %caller.user_id))]
    pub async fn cancel_by_owner(
        &self,
        order_id: Uuid,
        caller: &AuthUser,
    ) -> Result<TransitionOutcome, ServiceError> {
        let order = self.orders.find_order(order_id).await?;
        ensure_owned(&order, caller)?;

        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::Status,
                Expr::value(OrderStatus::Cancelled.as_ref()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending.as_ref()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidState(
                "only pending orders can be cancelled".into(),
            ));
        }

        self.emit(Event::OrderStatusChanged {
            order_id,
            old_status: OrderStatus::Pending.to_string(),
            new_status: OrderStatus::Cancelled.to_string(),
        })
        .await;
        Ok(TransitionOutcome::Applied)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to send domain event");
            }
        }
    }
}
