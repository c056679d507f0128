pub mod account;
pub mod checkout;
pub mod orders;
pub mod payment_webhooks;

use std::sync::Arc;

use crate::auth::AuthService;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::payments::StripeGateway;
use crate::services::checkout::CheckoutService;
use crate::services::customers::CustomerService;
use crate::services::orders::OrderService;
use crate::services::reconciliation::ReconciliationService;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub order: OrderService,
    pub reconciliation: ReconciliationService,
    pub checkout: CheckoutService,
    pub customer: CustomerService,
    pub auth: Arc<AuthService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        gateway: StripeGateway,
        currency: String,
        event_sender: EventSender,
        auth: Arc<AuthService>,
    ) -> Self {
        let order = OrderService::new(db.clone(), Some(event_sender.clone()));
        let reconciliation = ReconciliationService::new(
            db.clone(),
            order.clone(),
            gateway.clone(),
            Some(event_sender),
        );
        let checkout = CheckoutService::new(
            order.clone(),
            reconciliation.clone(),
            gateway,
            currency,
        );
        let customer = CustomerService::new(db);

        Self {
            order,
            reconciliation,
            checkout,
            customer,
            auth,
        }
    }
}
