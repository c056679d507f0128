//! Payment provider adapter.
//!
//! [`StripeGateway`] is the only place the payment provider's REST API and
//! webhook signature scheme are spoken. Everything it returns is normalized
//! into the crate's own types and [`ServiceError`] taxonomy; callers never
//! see raw provider payloads.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{instrument, warn};

use crate::errors::ServiceError;
use crate::money::Money;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature (`t=<unix>,v1=<hex hmac>`).
pub const SIGNATURE_HEADER: &str = "stripe-signature";

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Provider-side lifecycle of a payment intent, independent of the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    Succeeded,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PaymentIntentStatus {
    /// Settled intents can no longer have their amount changed.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Succeeded | Self::Canceled)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentIntentStatus,
    /// Amount in minor units, as the provider reports it.
    pub amount: i64,
    pub client_secret: Option<String>,
}

/// A signature-verified webhook event.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: WebhookEventKind,
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    PaymentIntentSucceeded,
    PaymentIntentFailed,
    /// Delivered but not acted on. Acknowledged with 200 so the provider
    /// stops retrying.
    Unhandled(String),
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: Option<String>,
}

#[derive(Clone)]
pub struct StripeGateway {
    http: Client,
    base_url: String,
    secret_key: String,
    webhook_secret: String,
    webhook_tolerance_secs: i64,
}

impl StripeGateway {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        webhook_tolerance_secs: i64,
    ) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            webhook_tolerance_secs,
        })
    }

    /// Create a payment intent for the given amount.
    #[instrument(skip(self), fields(amount = amount.minor(), currency = %currency))]
    pub async fn create_payment_intent(
        &self,
        amount: Money,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        let params = [
            ("amount", amount.minor().to_string()),
            ("currency", currency.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamError(format!("payment intent create: {e}")))?;

        Self::decode_intent(response).await
    }

    /// Fetch the provider's authoritative view of an intent.
    #[instrument(skip(self))]
    pub async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ServiceError> {
        let response = self
            .http
            .get(format!("{}/v1/payment_intents/{}", self.base_url, id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamError(format!("payment intent retrieve: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!(
                "payment intent {id} not found"
            )));
        }

        Self::decode_intent(response).await
    }

    /// Change the amount of an unsettled intent. Amount mutation is only
    /// valid pre-settlement; a settled intent fails with `InvalidState`.
    #[instrument(skip(self), fields(amount = amount.minor()))]
    pub async fn update_payment_intent_amount(
        &self,
        id: &str,
        amount: Money,
    ) -> Result<PaymentIntent, ServiceError> {
        let current = self.retrieve_payment_intent(id).await?;
        if current.status.is_settled() {
            return Err(ServiceError::InvalidState(format!(
                "payment intent {id} is already settled"
            )));
        }

        let params = [("amount", amount.minor().to_string())];
        let response = self
            .http
            .post(format!("{}/v1/payment_intents/{}", self.base_url, id))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamError(format!("payment intent update: {e}")))?;

        Self::decode_intent(response).await
    }

    async fn decode_intent(response: reqwest::Response) -> Result<PaymentIntent, ServiceError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::UpstreamError(format!("payment provider read: {e}")))?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ProviderErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| format!("http {status}"));
            warn!(%status, %detail, "payment provider rejected request");
            return Err(ServiceError::UpstreamError(detail));
        }

        serde_json::from_slice(&body)
            .map_err(|e| ServiceError::UpstreamError(format!("payment provider response: {e}")))
    }

    /// Verify an inbound webhook and parse its payload.
    ///
    /// The HMAC is computed over `"{t}.{raw body}"` with the shared webhook
    /// secret and compared against `v1=` in constant time. Verification runs
    /// on the raw, unparsed bytes: a re-serialized body would not match.
    pub fn verify_webhook_event(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookEvent, ServiceError> {
        let header = signature_header
            .ok_or_else(|| ServiceError::InvalidSignature("missing signature header".into()))?;

        let (timestamp, signature) = parse_signature_header(header)?;

        let now = chrono::Utc::now().timestamp();
        if (now - timestamp).abs() > self.webhook_tolerance_secs {
            return Err(ServiceError::InvalidSignature(
                "signature timestamp outside tolerance".into(),
            ));
        }

        let expected = compute_signature(self.webhook_secret.as_bytes(), timestamp, raw_body);
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(ServiceError::InvalidSignature(
                "signature mismatch".into(),
            ));
        }

        parse_webhook_payload(raw_body)
    }
}

fn parse_signature_header(header: &str) -> Result<(i64, String), ServiceError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signature = Some(value.to_string()),
            _ => {}
        }
    }

    match (timestamp, signature) {
        (Some(t), Some(v1)) => Ok((t, v1)),
        _ => Err(ServiceError::InvalidSignature(
            "malformed signature header".into(),
        )),
    }
}

fn compute_signature(secret: &[u8], timestamp: i64, raw_body: &[u8]) -> String {
    // Unwrap is fine: HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac key");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

fn parse_webhook_payload(raw_body: &[u8]) -> Result<WebhookEvent, ServiceError> {
    #[derive(Deserialize)]
    struct Payload {
        id: String,
        #[serde(rename = "type")]
        event_type: String,
        data: PayloadData,
    }

    #[derive(Deserialize)]
    struct PayloadData {
        object: PayloadObject,
    }

    #[derive(Deserialize)]
    struct PayloadObject {
        id: Option<String>,
    }

    let payload: Payload = serde_json::from_slice(raw_body)
        .map_err(|e| ServiceError::ValidationError(format!("malformed webhook payload: {e}")))?;

    let kind = match payload.event_type.as_str() {
        "payment_intent.succeeded" => WebhookEventKind::PaymentIntentSucceeded,
        "payment_intent.payment_failed" => WebhookEventKind::PaymentIntentFailed,
        other => WebhookEventKind::Unhandled(other.to_string()),
    };

    Ok(WebhookEvent {
        id: payload.id,
        kind,
        payment_intent_id: payload.data.object.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: &str) -> StripeGateway {
        StripeGateway::new(base_url, "sk_test_123", "whsec_test", 300).unwrap()
    }

    fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
        format!(
            "t={},v1={}",
            timestamp,
            compute_signature(secret.as_bytes(), timestamp, body)
        )
    }

    fn event_body(event_type: &str, intent_id: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": { "id": intent_id, "status": "succeeded", "amount": 4999 } }
        }))
        .unwrap()
    }

    #[test]
    fn valid_signature_yields_parsed_event() {
        let gw = gateway("http://unused");
        let body = event_body("payment_intent.succeeded", "pi_123");
        let header = sign("whsec_test", chrono::Utc::now().timestamp(), &body);

        let event = gw.verify_webhook_event(&body, Some(header.as_str())).unwrap();
        assert_eq!(event.kind, WebhookEventKind::PaymentIntentSucceeded);
        assert_eq!(event.payment_intent_id.as_deref(), Some("pi_123"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let gw = gateway("http://unused");
        let body = event_body("payment_intent.succeeded", "pi_123");
        let header = sign("whsec_other", chrono::Utc::now().timestamp(), &body);

        assert!(matches!(
            gw.verify_webhook_event(&body, Some(header.as_str())),
            Err(ServiceError::InvalidSignature(_))
        ));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let gw = gateway("http://unused");
        let body = event_body("payment_intent.succeeded", "pi_123");
        let header = sign("whsec_test", chrono::Utc::now().timestamp(), &body);

        let tampered = event_body("payment_intent.succeeded", "pi_456");
        assert!(matches!(
            gw.verify_webhook_event(&tampered, Some(header.as_str())),
            Err(ServiceError::InvalidSignature(_))
        ));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let gw = gateway("http://unused");
        let body = event_body("payment_intent.succeeded", "pi_123");
        let stale = chrono::Utc::now().timestamp() - 3600;
        let header = sign("whsec_test", stale, &body);

        assert!(matches!(
            gw.verify_webhook_event(&body, Some(header.as_str())),
            Err(ServiceError::InvalidSignature(_))
        ));
    }

    #[test]
    fn missing_or_malformed_header_is_rejected() {
        let gw = gateway("http://unused");
        let body = event_body("payment_intent.succeeded", "pi_123");

        assert!(gw.verify_webhook_event(&body, None).is_err());
        assert!(gw.verify_webhook_event(&body, Some("v1=deadbeef")).is_err());
        assert!(gw.verify_webhook_event(&body, Some("t=notanumber,v1=x")).is_err());
    }

    #[test]
    fn unrecognized_event_type_is_unhandled_not_error() {
        let gw = gateway("http://unused");
        let body = event_body("charge.refunded", "pi_123");
        let header = sign("whsec_test", chrono::Utc::now().timestamp(), &body);

        let event = gw.verify_webhook_event(&body, Some(header.as_str())).unwrap();
        assert_eq!(
            event.kind,
            WebhookEventKind::Unhandled("charge.refunded".to_string())
        );
    }

    #[tokio::test]
    async fn create_payment_intent_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(body_string_contains("amount=4999"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_new",
                "status": "requires_payment_method",
                "amount": 4999,
                "client_secret": "pi_new_secret_abc"
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri());
        let intent = gw
            .create_payment_intent(Money::from_minor(4999), "gbp")
            .await
            .unwrap();
        assert_eq!(intent.id, "pi_new");
        assert_eq!(intent.status, PaymentIntentStatus::RequiresPaymentMethod);
        assert_eq!(intent.client_secret.as_deref(), Some("pi_new_secret_abc"));
    }

    #[tokio::test]
    async fn update_amount_refuses_settled_intent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_done"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_done",
                "status": "succeeded",
                "amount": 4999,
                "client_secret": null
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri());
        let err = gw
            .update_payment_intent_amount("pi_done", Money::from_minor(5999))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn provider_error_normalizes_to_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_bad"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "message": "provider exploded" }
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri());
        let err = gw.retrieve_payment_intent("pi_bad").await.unwrap_err();
        assert!(matches!(err, ServiceError::UpstreamError(_)));
    }

    #[tokio::test]
    async fn unknown_intent_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "message": "No such payment_intent" }
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri());
        assert!(matches!(
            gw.retrieve_payment_intent("pi_missing").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_provider_status_maps_to_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_odd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_odd",
                "status": "some_future_status",
                "amount": 100,
                "client_secret": null
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri());
        let intent = gw.retrieve_payment_intent("pi_odd").await.unwrap();
        assert_eq!(intent.status, PaymentIntentStatus::Unknown);
        assert!(!intent.status.is_settled());
    }
}
