//! HTTP host for the relay.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, OriginalUri, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::relay::{relay, Payload};
use crate::sink::Notifier;

pub const SEND_MESSAGE_PATH: &str = "/api/send-message";
pub const HEALTH_PATH: &str = "/api/test";

#[derive(Clone)]
pub struct AppState {
    pub notifier: Arc<dyn Notifier>,
}

/// Build the router with all routes and layers.
pub fn build_router(notifier: Arc<dyn Notifier>, body_limit: usize) -> Router {
    Router::new()
        .route(
            SEND_MESSAGE_PATH,
            post(send_message)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(HEALTH_PATH, any(health))
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::map_response(cors_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { notifier })
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, axum::extract::rejection::BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "could not read request body");
            let status = rejection.status();
            return (
                status,
                Json(json!({
                    "error": "Failed to process request",
                    "details": rejection.body_text(),
                })),
            )
                .into_response();
        }
    };

    let outcome = relay(state.notifier.as_ref(), payload_from(&headers, &body)).await;
    (outcome.status, Json(outcome.body)).into_response()
}

/// Form bodies arrive pre-structured; everything else goes to the JSON parse
/// stage untouched.
fn payload_from(headers: &HeaderMap, body: &[u8]) -> Payload {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.to_ascii_lowercase()
                .starts_with("application/x-www-form-urlencoded")
        });

    if is_form {
        return Payload::Structured(decode_form(&String::from_utf8_lossy(body)));
    }
    Payload::Raw(body.to_vec())
}

fn decode_form(raw: &str) -> Value {
    let mut fields = Map::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);
        fields.insert(key, Value::String(value));
    }
    Value::Object(fields)
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed(method: Method) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": format!("Method {method} Not Allowed") })),
    )
        .into_response()
}

async fn route_not_found(method: Method, OriginalUri(uri): OriginalUri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("Route {method} {uri} not found") })),
    )
        .into_response()
}

async fn health(method: Method, OriginalUri(uri): OriginalUri) -> Json<Value> {
    Json(json!({
        "status": "API is working!",
        "method": method.as_str(),
        "url": uri.to_string(),
        "time": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }))
}

/// Stamp permissive cross-origin headers on every response.
async fn cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, router: Router) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    let local = listener.local_addr().context("Reading bound address")?;

    info!("API server running at http://{local}");
    info!("Send message endpoint: http://{local}{SEND_MESSAGE_PATH}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error occurred")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down server...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::sink::Delivery;

    const HOOK: &str = "https://hooks.slack.com/services/T000/B000/XXXX";

    #[derive(Default)]
    struct Recorder {
        texts: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn post(&self, _webhook_url: &str, text: &Value) -> anyhow::Result<Delivery> {
            self.texts.lock().unwrap().push(text.clone());
            Ok(Delivery {
                status: 200,
                body: "ok".into(),
            })
        }
    }

    fn app() -> (Router, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (build_router(recorder.clone(), 1024), recorder)
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    fn json_post(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(SEND_MESSAGE_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn post_relays_message() {
        let (router, recorder) = app();
        let body = json!({"message": "hello", "webhook": HOOK}).to_string();

        let (status, headers, text) = call(router, json_post(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"status": "Message sent successfully!"})
        );
        assert_eq!(*recorder.texts.lock().unwrap(), vec![json!("hello")]);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let (router, _) = app();

        let (status, _, text) = call(router, json_post("{not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"error": "Invalid JSON in request body"})
        );
    }

    #[tokio::test]
    async fn form_bodies_are_accepted() {
        let (router, recorder) = app();
        let request = Request::builder()
            .method(Method::POST)
            .uri(SEND_MESSAGE_PATH)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "message=hello+there%21&webhook={}",
                urlencoding::encode(HOOK)
            )))
            .unwrap();

        let (status, _, _) = call(router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(*recorder.texts.lock().unwrap(), vec![json!("hello there!")]);
    }

    #[tokio::test]
    async fn form_content_type_is_case_insensitive() {
        let (router, recorder) = app();
        let request = Request::builder()
            .method(Method::POST)
            .uri(SEND_MESSAGE_PATH)
            .header(
                header::CONTENT_TYPE,
                "Application/X-WWW-Form-URLEncoded; charset=UTF-8",
            )
            .body(Body::from(format!(
                "message=hi&webhook={}",
                urlencoding::encode(HOOK)
            )))
            .unwrap();

        let (status, _, _) = call(router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(*recorder.texts.lock().unwrap(), vec![json!("hi")]);
    }

    #[tokio::test]
    async fn options_returns_empty_200() {
        let (router, recorder) = app();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri(SEND_MESSAGE_PATH)
            .body(Body::from("{\"message\": \"ignored\"}"))
            .unwrap();

        let (status, headers, text) = call(router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(text.is_empty());
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        assert!(recorder.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_is_not_allowed() {
        let (router, _) = app();
        let request = Request::builder()
            .method(Method::GET)
            .uri(SEND_MESSAGE_PATH)
            .body(Body::empty())
            .unwrap();

        let (status, headers, text) = call(router, request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"error": "Method GET Not Allowed"})
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (router, _) = app();
        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/api/nope?x=1")
            .body(Body::empty())
            .unwrap();

        let (status, headers, text) = call(router, request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"error": "Route DELETE /api/nope?x=1 not found"})
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn health_reports_request() {
        let (router, _) = app();
        let request = Request::builder()
            .method(Method::GET)
            .uri(HEALTH_PATH)
            .body(Body::empty())
            .unwrap();

        let (status, _, text) = call(router, request).await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["status"], "API is working!");
        assert_eq!(body["method"], "GET");
        assert_eq!(body["url"], HEALTH_PATH);
        assert!(body["time"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (router, recorder) = app();
        let big = format!(
            "{{\"message\": \"{}\", \"webhook\": \"{HOOK}\"}}",
            "x".repeat(4096)
        );

        let (status, headers, text) = call(router, json_post(&big)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["error"], "Failed to process request");
        assert!(recorder.texts.lock().unwrap().is_empty());
    }

    #[test]
    fn form_decoding_handles_missing_values() {
        assert_eq!(
            decode_form("message=&webhook&x=a%20b"),
            json!({"message": "", "webhook": "", "x": "a b"})
        );
    }
}
