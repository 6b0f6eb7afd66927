use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::ServiceState;

mod chat;
mod error;
mod login;
mod media;

pub use error::ResponseError;

use chat::chat_page as chat;
use login::{check_session as check, handle_login as login};
use media::serve_media as media;

pub async fn healthcheck() -> &'static str {
    "ok"
}

fn cors_layer(service: &ServiceState) -> CorsLayer {
    let origins: Vec<HeaderValue> = service
        .config()
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(origin) => Some(origin),
            Err(_) => {
                tracing::warn!("ignoring unparsable allowed origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
}

pub fn create_app(service: ServiceState) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&service))
        .layer(DefaultBodyLimit::max(64 * 1024));

    Router::new()
        .route("/api/login", post(login))
        .route("/api/check", get(check))
        .route("/api/chat", get(chat))
        .route("/api/media/:filename", get(media))
        .with_state(service)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use crate::test::{self, TestGateway};

    #[tokio::test]
    async fn test_healthcheck() {
        test::setup();
        let gateway = TestGateway::spawn(vec![], None).await;

        let response = gateway
            .client
            .get(gateway.url("/healthcheck"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_login_and_check() {
        test::setup();
        let gateway = TestGateway::spawn(vec![], None).await;

        // bad credentials
        let response = gateway
            .client
            .post(gateway.url("/api/login"))
            .json(&json!({ "username": test::DRIVE_USERNAME, "password": "wrong" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["success"], json!(false));

        // an anonymous check reports logged out
        let response = gateway
            .client
            .get(gateway.url("/api/check"))
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["loggedIn"], json!(false));

        // a token from a successful login checks out
        let token = gateway.login().await;
        let response = gateway
            .client
            .get(gateway.url("/api/check"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["loggedIn"], json!(true));
    }

    #[tokio::test]
    async fn test_chat_pagination() {
        test::setup();
        let messages: Vec<_> = (1..=120).map(|i| json!({ "id": i })).collect();
        let gateway = TestGateway::spawn(vec![], Some(&json!(messages))).await;

        let token = gateway.login().await;

        // unauthorized without a token
        let response = gateway
            .client
            .get(gateway.url("/api/chat"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // page 1 holds the newest 50 messages
        let response = gateway
            .client
            .get(gateway.url("/api/chat"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["page"], json!(1));
        assert_eq!(body["totalPages"], json!(3));
        let page = body["messages"].as_array().unwrap();
        assert_eq!(page.len(), 50);
        assert_eq!(page[0]["id"], json!(71));
        assert_eq!(page[49]["id"], json!(120));

        // the last page holds the remainder
        let response = gateway
            .client
            .get(gateway.url("/api/chat?page=3&pageSize=50"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = response.json().await.unwrap();
        let page = body["messages"].as_array().unwrap();
        assert_eq!(page.len(), 20);
        assert_eq!(page[0]["id"], json!(1));
    }

    #[tokio::test]
    async fn test_chat_without_log_is_a_server_error() {
        test::setup();
        let gateway = TestGateway::spawn(vec![], None).await;
        let token = gateway.login().await;

        let response = gateway
            .client
            .get(gateway.url("/api/chat"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_media_roundtrip_and_cache() {
        test::setup();
        let gateway =
            TestGateway::spawn(vec![("photo.jpg", b"jpeg bytes".to_vec())], None).await;
        let token = gateway.login().await;

        // unauthorized without a token
        let response = gateway
            .client
            .get(gateway.url("/api/media/photo.jpg"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(gateway.drive.stats().fetches, 0);

        // first authorized request downloads from the drive
        let response = gateway
            .client
            .get(gateway.url("/api/media/photo.jpg"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            "image/jpeg"
        );
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"jpeg bytes");
        assert_eq!(gateway.drive.stats().fetches, 1);

        // the second one is served from the cache
        let response = gateway
            .client
            .get(gateway.url("/api/media/photo.jpg"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"jpeg bytes");
        assert_eq!(gateway.drive.stats().fetches, 1);
    }

    #[tokio::test]
    async fn test_media_missing_object() {
        test::setup();
        let gateway = TestGateway::spawn(vec![], None).await;
        let token = gateway.login().await;

        let response = gateway
            .client
            .get(gateway.url("/api/media/absent.png"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_media_rejects_traversal() {
        test::setup();
        let gateway = TestGateway::spawn(vec![], None).await;
        let token = gateway.login().await;

        // encoded separators survive routing as a single path segment
        let response = gateway
            .client
            .get(gateway.url("/api/media/..%2F..%2Fetc%2Fpasswd"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // the request never reached the backend
        assert_eq!(gateway.drive.stats().logins, 0);
    }
}
