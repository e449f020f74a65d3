use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{OriginalUri, Request, State},
    http::{HeaderMap, HeaderName, Method, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tower_http::request_id::RequestId;
use tracing::Instrument;

use forge_auth::{CurrentUser, TokenService};
use forge_core::ForgeSettings;

use crate::app::errors::complete_problem;
use crate::context::RequestUser;

/// Header carrying the request's trace id; a client-supplied value is kept.
pub const CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

/// Request bodies up to this size are included in the request log.
const MAX_LOGGED_BODY: u64 = 16 * 1024;

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<dyn TokenService>,
}

/// Establish the caller of a request.
///
/// A missing, malformed or invalid bearer token leaves the request anonymous;
/// rejecting it is up to the policy guard of the route.
pub async fn authenticate(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let user = match extract_bearer(req.headers()) {
        Some(token) => match state.tokens.validate(token, Utc::now()) {
            Ok(principal) => RequestUser::authenticated(principal),
            Err(e) => {
                tracing::debug!(error = %e, "bearer token rejected");
                RequestUser::anonymous()
            }
        },
        None => RequestUser::anonymous(),
    };

    req.extensions_mut().insert(user);
    next.run(req).await
}

/// Path as the client sent it; nested routers only see their suffix.
pub fn request_path(req: &Request) -> String {
    req.extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string())
}

fn trace_id(req: &Request) -> Option<String> {
    req.extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .map(str::to_string)
}

/// Tag every log record of the request with the service identity and the
/// trace id.
pub async fn service_logging(
    State(forge): State<Arc<ForgeSettings>>,
    req: Request,
    next: Next,
) -> Response {
    let span = forge_observability::request_span(&forge, trace_id(&req).as_deref().unwrap_or(""));
    next.run(req).instrument(span).await
}

/// Every error leaves as a problem document with `instance` and `traceId`.
pub async fn problem_details(req: Request, next: Next) -> Response {
    let instance = request_path(&req);
    let trace_id = trace_id(&req);
    let response = next.run(req).await;
    complete_problem(response, &instance, trace_id.as_deref()).await
}

/// Attach the caller's id and name to every log record of the request.
pub async fn user_logging(req: Request, next: Next) -> Response {
    let span = {
        let user = req.extensions().get::<RequestUser>();
        match user.filter(|u| u.is_authenticated()) {
            Some(user) => forge_observability::user_span(user.user_id(), user.user_name()),
            None => forge_observability::anonymous_span(),
        }
    };
    next.run(req).instrument(span).await
}

/// Log `/api` requests before and after handling, with the query string and
/// (for requests that carry one) the body. Preflight requests are skipped.
pub async fn request_logging(req: Request, next: Next) -> Response {
    let path = request_path(&req);
    if !path.starts_with("/api") || req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let query = req.uri().query().unwrap_or_default().to_string();
    let started = Instant::now();
    let (req, body) = buffer_body(req).await;

    tracing::info!(%method, %path, %query, %body, "request started");
    let response = next.run(req).await;
    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}

/// Read a small body for logging and put it back. GET, DELETE and bodies
/// without a known, small length are left untouched.
async fn buffer_body(req: Request) -> (Request, String) {
    let length = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let skip = matches!(*req.method(), Method::GET | Method::DELETE);
    if skip || length == 0 || length > MAX_LOGGED_BODY {
        return (req, String::new());
    }

    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, MAX_LOGGED_BODY as usize).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            (Request::from_parts(parts, Body::from(bytes)), text)
        }
        Err(e) => {
            tracing::debug!(error = %e, "request body could not be buffered");
            (Request::from_parts(parts, Body::empty()), String::new())
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
