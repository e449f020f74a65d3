//! Log records of a request carry the caller's identity, and only that
//! request's records do.

mod common;

use std::future::Future;
use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Capture {
    fn take(&self) -> Vec<Value> {
        let bytes = std::mem::take(&mut *self.0.lock().unwrap());
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

fn capture_logs() -> (Capture, tracing::subscriber::DefaultGuard) {
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::INFO)
        .with_writer(move || writer.clone())
        .finish();
    (capture, tracing::subscriber::set_default(subscriber))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn admin_token(app: &Router) -> String {
    let form = "grant_type=password&username=admin&password=AdminPassword123%21";
    let request = Request::post("/connect/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn user_fields(record: &Value) -> Option<(&str, &str)> {
    let span = record.get("span")?;
    Some((span["user_id"].as_str()?, span["user_name"].as_str()?))
}

fn message(record: &Value) -> &str {
    record["fields"]["message"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn authenticated_request_logs_carry_the_user() {
    let (app, _store) = common::app("Development").await;
    let token = admin_token(&app).await;
    let (_, me) = send(&app, get("/whoami", Some(&token))).await;
    let admin_id = me["user_id"].as_str().unwrap().to_string();

    let (capture, _guard) = capture_logs();
    let (status, _) = send(&app, get("/api/secure/authenticated", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);

    let records = capture.take();
    let handler = records
        .iter()
        .find(|r| message(r) == "authenticated endpoint called")
        .expect("handler record");
    assert_eq!(user_fields(handler), Some((admin_id.as_str(), "admin")));

    let completed = records
        .iter()
        .find(|r| message(r) == "request completed")
        .expect("completion record");
    assert_eq!(user_fields(completed), Some((admin_id.as_str(), "admin")));
    assert_eq!(completed["fields"]["status"], 200);
}

#[tokio::test]
async fn anonymous_request_logs_say_anonymous() {
    let (app, _store) = common::app("Development").await;

    let (capture, _guard) = capture_logs();
    let (status, _) = send(&app, get("/api/secure/public", None)).await;
    assert_eq!(status, StatusCode::OK);

    let records = capture.take();
    let started = records
        .iter()
        .find(|r| message(r) == "request started")
        .expect("start record");
    assert_eq!(user_fields(started), Some(("Anonymous", "Anonymous")));
}

#[tokio::test]
async fn user_context_does_not_leak_into_later_requests() {
    let (app, _store) = common::app("Development").await;
    let token = admin_token(&app).await;

    let (capture, _guard) = capture_logs();
    send(&app, get("/api/secure/authenticated", Some(&token))).await;
    capture.take();

    send(&app, get("/api/secure/public", None)).await;
    tracing::info!("between requests");

    let records = capture.take();
    assert!(!records.is_empty());
    for record in &records {
        match message(record) {
            "between requests" => assert!(record.get("span").is_none()),
            _ => assert_eq!(user_fields(record), Some(("Anonymous", "Anonymous"))),
        }
    }
}

fn request_records(records: &[Value]) -> Vec<&Value> {
    records
        .iter()
        .filter(|r| matches!(message(r), "request started" | "request completed"))
        .collect()
}

#[tokio::test]
async fn records_carry_the_service_identity_and_trace_id() {
    let (app, _store) = common::app("Development").await;

    let (capture, _guard) = capture_logs();
    let request = Request::get("/api/secure/public?page=2")
        .header("x-correlation-id", "trace-42")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-correlation-id"], "trace-42");

    let records = capture.take();
    let started = records
        .iter()
        .find(|r| message(r) == "request started")
        .expect("start record");
    assert_eq!(started["fields"]["query"], "page=2");

    let service = &started["spans"][0];
    assert_eq!(service["name"], "request");
    assert_eq!(service["trace_id"], "trace-42");
    assert_eq!(service["service_name"], "forge-api");
    assert_eq!(service["application"], "Forge");
    assert_eq!(service["environment"], "Development");
}

#[tokio::test]
async fn only_api_requests_are_logged() {
    let (app, _store) = common::app("Development").await;

    let (capture, _guard) = capture_logs();
    send(&app, get("/health", None)).await;
    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/api/secure/public")
        .body(Body::empty())
        .unwrap();
    send(&app, preflight).await;
    assert!(request_records(&capture.take()).is_empty());

    send(&app, get("/api/secure/public", None)).await;
    assert_eq!(request_records(&capture.take()).len(), 2);
}

#[tokio::test]
async fn request_body_is_logged_for_writes() {
    let (app, _store) = common::app("Development").await;
    let token = admin_token(&app).await;

    let (capture, _guard) = capture_logs();
    let request = Request::post("/api/secure/resx")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, "11")
        .body(Body::from(r#"{"value":1}"#))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let records = capture.take();
    let started = records
        .iter()
        .find(|r| message(r) == "request started")
        .expect("start record");
    assert_eq!(started["fields"]["body"], r#"{"value":1}"#);
}

#[tokio::test]
async fn cancelled_requests_release_the_user_context() {
    let (app, _store) = common::app("Development").await;
    let token = admin_token(&app).await;

    let (capture, _guard) = capture_logs();
    {
        // Poll once, then drop the in-flight request.
        let request = app.clone().oneshot(get("/api/secure/authenticated", Some(&token)));
        let _ = poll_once(request).await;
    }
    tracing::info!("after cancellation");

    let records = capture.take();
    let after = records
        .iter()
        .find(|r| message(r) == "after cancellation")
        .expect("record after cancellation");
    assert!(after.get("span").is_none());
}

async fn poll_once<F: Future>(future: F) -> Option<F::Output> {
    let mut future = std::pin::pin!(future);
    std::future::poll_fn(|cx| match future.as_mut().poll(cx) {
        std::task::Poll::Ready(out) => std::task::Poll::Ready(Some(out)),
        std::task::Poll::Pending => std::task::Poll::Ready(None),
    })
    .await
}
