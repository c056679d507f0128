mod common;

use axum::http::{Method, StatusCode};
use common::{expect_status, TestApp};
use serde_json::json;

#[tokio::test]
async fn register_then_login_round_trip() {
    let app = TestApp::new().await;

    let body = expect_status(
        app.request(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "name": "Maya",
                "email": "Maya@Example.com",
                "password": "candlelight-8"
            })),
            None,
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["access_token"].as_str().unwrap().contains('.'));

    // Login is case-insensitive on email.
    let body = expect_status(
        app.request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": "maya@example.com", "password": "candlelight-8" })),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    let token = body["access_token"].as_str().unwrap().to_string();

    let body = expect_status(
        app.request(Method::GET, "/api/v1/account/profile", None, Some(&token))
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["data"]["email"], "maya@example.com");
    assert_eq!(body["data"]["name"], "Maya");
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_unauthorized() {
    let app = TestApp::new().await;
    app.register_user("Maya", "maya@example.com").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": "maya@example.com", "password": "wrong" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": "nobody@example.com", "password": "candlelight-8" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_is_rejected_case_insensitively() {
    let app = TestApp::new().await;
    app.register_user("Maya", "maya@example.com").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "name": "Imposter",
                "email": "MAYA@example.com",
                "password": "candlelight-8"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_update_changes_the_display_name() {
    let app = TestApp::new().await;
    let maya = app.register_user("Maya", "maya@example.com").await;

    let body = expect_status(
        app.request(
            Method::PUT,
            "/api/v1/account/profile",
            Some(json!({ "name": "Maya R." })),
            Some(&maya.token),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["data"]["name"], "Maya R.");
}

#[tokio::test]
async fn addresses_are_scoped_to_their_owner() {
    let app = TestApp::new().await;
    let maya = app.register_user("Maya", "maya@example.com").await;
    let noor = app.register_user("Noor", "noor@example.com").await;

    let body = expect_status(
        app.request(
            Method::POST,
            "/api/v1/account/addresses",
            Some(json!({
                "recipient": "Maya R.",
                "line1": "12 Wick Lane",
                "city": "Bristol",
                "postal_code": "BS1 4DJ",
                "country_code": "gb",
                "is_default": true
            })),
            Some(&maya.token),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let address_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["country_code"], "GB");

    // Noor sees an empty list and cannot delete Maya's address.
    let body = expect_status(
        app.request(Method::GET, "/api/v1/account/addresses", None, Some(&noor.token))
            .await,
        StatusCode::OK,
    )
    .await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/account/addresses/{address_id}"),
            None,
            Some(&noor.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/account/addresses/{address_id}"),
            None,
            Some(&maya.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn wishlist_add_is_idempotent_per_product() {
    let app = TestApp::new().await;
    let maya = app.register_user("Maya", "maya@example.com").await;

    let entry = json!({
        "product_id": "candle-hearth",
        "title": "Hearth",
        "image_url": "https://cdn.emberline.shop/hearth.jpg"
    });

    let first = expect_status(
        app.request(
            Method::POST,
            "/api/v1/account/wishlist",
            Some(entry.clone()),
            Some(&maya.token),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let second = expect_status(
        app.request(
            Method::POST,
            "/api/v1/account/wishlist",
            Some(entry),
            Some(&maya.token),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(first["data"]["id"], second["data"]["id"]);

    let body = expect_status(
        app.request(Method::GET, "/api/v1/account/wishlist", None, Some(&maya.token))
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let item_id = body["data"][0]["id"].as_str().unwrap().to_string();
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/account/wishlist/{item_id}"),
            None,
            Some(&maya.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn account_routes_require_a_session() {
    let app = TestApp::new().await;
    for uri in [
        "/api/v1/account/profile",
        "/api/v1/account/addresses",
        "/api/v1/account/wishlist",
    ] {
        let response = app.request(Method::GET, uri, None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}
