#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    middleware, Router,
};
use emberline_api::{
    auth::{AccessPolicy, AuthConfig, AuthService, AuthUser, RegisterRequest},
    config::AppConfig,
    db,
    events::{self, EventSender},
    handlers::AppServices,
    money::Money,
    payments::StripeGateway,
    services::orders::{CreateOrder, NewOrderItem, OrderResponse},
    AppState,
};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const ADMIN_EMAIL: &str = "ops@emberline.shop";

/// A signed-in identity seeded into the test database.
pub struct TestIdentity {
    pub user: AuthUser,
    pub token: String,
}

/// Helper harness: application state over a fresh in-memory SQLite database
/// with a one-connection pool, driven through `oneshot` requests.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    auth_service: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a test application whose payment gateway talks to the real
    /// provider base URL (fine for tests that never call the provider).
    pub async fn new() -> Self {
        Self::with_gateway_base("http://127.0.0.1:9").await
    }

    /// Construct a test application with the gateway pointed at a mock
    /// provider server.
    pub async fn with_gateway_base(gateway_base: &str) -> Self {
        let cfg = test_config(gateway_base);

        let pool = db::establish_connection(&cfg.database_url)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(
            AuthConfig {
                jwt_secret: cfg.jwt_secret.clone(),
                issuer: cfg.auth_issuer.clone(),
                audience: cfg.auth_audience.clone(),
                token_expiration: Duration::from_secs(cfg.jwt_expiration),
            },
            db_arc.clone(),
        ));

        let gateway = StripeGateway::new(
            cfg.stripe_api_base.clone(),
            cfg.stripe_secret_key.clone(),
            cfg.stripe_webhook_secret.clone(),
            cfg.stripe_webhook_tolerance_secs,
        )
        .expect("gateway construction");

        let access = AccessPolicy::new(cfg.admin_email_list());
        let services = AppServices::new(
            db_arc.clone(),
            gateway.clone(),
            cfg.currency.clone(),
            event_sender.clone(),
            auth_service.clone(),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
            access,
            gateway,
        };

        let auth_for_layer = auth_service.clone();
        let router = Router::new()
            .nest(
                "/api/v1",
                emberline_api::api_v1_routes(auth_service.clone()),
            )
            .layer(middleware::from_fn_with_state(
                auth_for_layer,
                |axum::extract::State(auth): axum::extract::State<Arc<AuthService>>,
                 mut req: Request<Body>,
                 next: middleware::Next| async move {
                    req.extensions_mut().insert(auth);
                    next.run(req).await
                },
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            auth_service,
            _event_task: event_task,
        }
    }

    /// Register an account and return its identity plus a bearer token.
    pub async fn register_user(&self, name: &str, email: &str) -> TestIdentity {
        let account = self
            .auth_service
            .register(RegisterRequest {
                name: name.to_string(),
                email: email.to_string(),
                password: "candlelight-8".to_string(),
            })
            .await
            .expect("register test user");
        let token = self
            .auth_service
            .issue_token(&account)
            .expect("issue test token");

        TestIdentity {
            user: AuthUser {
                user_id: account.id,
                name: account.name,
                email: account.email,
                role: account.role,
                token_id: String::new(),
            },
            token: token.access_token,
        }
    }

    /// The seeded admin: an ordinary account whose email is on the
    /// configured allow-list.
    pub async fn register_admin(&self) -> TestIdentity {
        self.register_user("Ops", ADMIN_EMAIL).await
    }

    /// Seed an order directly through the service layer, bypassing the
    /// payment provider.
    pub async fn seed_order(
        &self,
        user_id: Option<Uuid>,
        unit_price_minor: i64,
        quantity: i32,
        shipping_minor: i64,
        payment_intent_id: Option<&str>,
    ) -> OrderResponse {
        let order = self
            .state
            .services
            .order
            .create_order(CreateOrder {
                items: vec![NewOrderItem {
                    product_id: "candle-ember-no4".to_string(),
                    variant_id: None,
                    title: "Ember No. 4".to_string(),
                    quantity,
                    unit_price: Money::from_minor(unit_price_minor),
                    image_url: None,
                }],
                shipping: Money::from_minor(shipping_minor),
                currency: "gbp".to_string(),
                user_id,
            })
            .await
            .expect("seed order");

        if let Some(intent_id) = payment_intent_id {
            self.state
                .services
                .order
                .attach_payment_intent(order.id, intent_id)
                .await
                .expect("attach intent to seeded order");
        }

        order
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Deliver a webhook body with the given signature header.
    pub async fn deliver_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header("stripe-signature", sig);
        }

        let request = builder.body(Body::from(body.to_vec())).expect("build webhook");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during webhook delivery")
    }

    /// Current persisted status string for an order.
    pub async fn order_status(&self, order_id: Uuid) -> String {
        self.state
            .services
            .order
            .get_order(order_id)
            .await
            .expect("order exists")
            .status
            .to_string()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

fn test_config(gateway_base: &str) -> AppConfig {
    let raw = serde_json::json!({
        "database_url": "sqlite::memory:",
        "jwt_secret": "test-secret-key-0123456789-0123456789-0123456789-0123456789-0123456789",
        "environment": "test",
        "db_max_connections": 1,
        "db_min_connections": 1,
        "currency": "gbp",
        "stripe_api_base": gateway_base,
        "stripe_secret_key": "sk_test_123",
        "stripe_webhook_secret": WEBHOOK_SECRET,
        "admin_emails": ADMIN_EMAIL,
        "auto_migrate": true,
    });
    serde_json::from_value(raw).expect("test config deserializes")
}

/// Compute a `t=..,v1=..` signature header the way the provider does: an
/// HMAC-SHA256 over `"{t}.{raw body}"`.
pub fn sign_webhook(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// A webhook payload for a payment intent outcome, as the provider sends it.
pub fn webhook_body(event_type: &str, intent_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "data": { "object": { "id": intent_id, "object": "payment_intent" } }
    }))
    .expect("serialize webhook body")
}

/// Deliver a correctly signed webhook for an intent outcome.
pub async fn deliver_signed_webhook(
    app: &TestApp,
    event_type: &str,
    intent_id: &str,
) -> axum::response::Response {
    let body = webhook_body(event_type, intent_id);
    let signature = sign_webhook(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &body);
    app.deliver_webhook(&body, Some(signature.as_str())).await
}

/// Read a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

/// Assert a status and return the parsed body.
pub async fn expect_status(
    response: axum::response::Response,
    expected: StatusCode,
) -> Value {
    let status = response.status();
    let body = response_json(response).await;
    assert_eq!(status, expected, "unexpected status; body: {body}");
    body
}
