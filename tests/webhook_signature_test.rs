mod common;

use axum::http::StatusCode;
use common::{sign_webhook, webhook_body, TestApp, WEBHOOK_SECRET};

#[tokio::test]
async fn invalid_signature_is_rejected_and_order_untouched() {
    let app = TestApp::new().await;
    let order = app.seed_order(None, 4999, 1, 0, Some("pi_sig")).await;

    let body = webhook_body("payment_intent.succeeded", "pi_sig");
    let forged = sign_webhook("whsec_wrong_secret", chrono::Utc::now().timestamp(), &body);

    let response = app.deliver_webhook(&body, Some(forged.as_str())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.order_status(order.id).await, "pending");
}

#[tokio::test]
async fn missing_signature_header_is_rejected() {
    let app = TestApp::new().await;
    let order = app.seed_order(None, 4999, 1, 0, Some("pi_nosig")).await;

    let body = webhook_body("payment_intent.succeeded", "pi_nosig");
    let response = app.deliver_webhook(&body, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.order_status(order.id).await, "pending");
}

#[tokio::test]
async fn stale_timestamp_is_rejected() {
    let app = TestApp::new().await;
    let order = app.seed_order(None, 4999, 1, 0, Some("pi_stale")).await;

    let body = webhook_body("payment_intent.succeeded", "pi_stale");
    let stale = sign_webhook(WEBHOOK_SECRET, chrono::Utc::now().timestamp() - 3600, &body);

    let response = app.deliver_webhook(&body, Some(stale.as_str())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.order_status(order.id).await, "pending");
}

#[tokio::test]
async fn signature_must_cover_the_exact_raw_bytes() {
    let app = TestApp::new().await;
    let order = app.seed_order(None, 4999, 1, 0, Some("pi_raw")).await;

    // Sign one body, deliver a semantically identical but re-serialized one.
    let signed_body = webhook_body("payment_intent.succeeded", "pi_raw");
    let signature = sign_webhook(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &signed_body);

    let value: serde_json::Value = serde_json::from_slice(&signed_body).unwrap();
    let reserialized = serde_json::to_vec_pretty(&value).unwrap();
    assert_ne!(signed_body, reserialized);

    let response = app.deliver_webhook(&reserialized, Some(signature.as_str())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.order_status(order.id).await, "pending");
}

#[tokio::test]
async fn well_signed_garbage_payload_is_a_bad_request() {
    let app = TestApp::new().await;

    let body = b"not json at all".to_vec();
    let signature = sign_webhook(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &body);

    let response = app.deliver_webhook(&body, Some(signature.as_str())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
