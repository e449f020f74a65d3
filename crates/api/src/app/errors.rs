//! Consistent error responses: RFC 7807 problem documents for API errors,
//! OAuth2 error bodies for the token endpoint.

use std::any::Any;

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use forge_auth::{DenyReason, IdentityError, TokenError};

pub const PROBLEM_JSON: &str = "application/problem+json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(rename = "traceId", skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl Problem {
    pub fn new(status: StatusCode) -> Self {
        Self {
            kind: type_uri(status).to_string(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            status: status.as_u16(),
            detail: None,
            instance: None,
            trace_id: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// 500 for an unexpected failure. The error text is only exposed in
    /// development.
    pub fn internal(error: &dyn std::error::Error, development: bool) -> Self {
        tracing::error!(error = %error, "request failed");
        let problem = Self::new(StatusCode::INTERNAL_SERVER_ERROR);
        if development {
            problem.with_detail(error.to_string())
        } else {
            problem
        }
    }

    pub fn denied(reason: DenyReason) -> Self {
        let status = match reason {
            DenyReason::Unauthenticated => StatusCode::UNAUTHORIZED,
            DenyReason::Forbidden => StatusCode::FORBIDDEN,
        };
        Self::new(status).with_detail(reason.to_string())
    }

    fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, axum::Json(&self)).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON));
        if status == StatusCode::UNAUTHORIZED {
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        // Read back by `complete_problem` to add the request context.
        response.extensions_mut().insert(self);
        response
    }
}

/// Largest error body kept as the detail of a converted response.
const MAX_DETAIL_BYTES: usize = 16 * 1024;

/// Finish an outgoing response as a problem document.
///
/// Problems get the request path as `instance` (unless they carry one) and
/// the trace id. Other error responses without a JSON body (extractor
/// rejections, 405, ...) are turned into problems; their text becomes the
/// detail for client errors. Successful and JSON responses pass through.
pub async fn complete_problem(
    response: Response,
    instance: &str,
    trace_id: Option<&str>,
) -> Response {
    if let Some(mut problem) = response.extensions().get::<Problem>().cloned() {
        problem.instance.get_or_insert_with(|| instance.to_string());
        problem.trace_id = trace_id.map(str::to_string);
        return replace_body(response, problem);
    }

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) || is_json(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let mut problem = Problem::new(status).with_instance(instance);
    problem.trace_id = trace_id.map(str::to_string);
    if status.is_client_error() {
        if let Ok(bytes) = axum::body::to_bytes(body, MAX_DETAIL_BYTES).await {
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            if !text.is_empty() {
                problem.detail = Some(text);
            }
        }
    }
    replace_body(Response::from_parts(parts, Body::empty()), problem)
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json") || v.starts_with(PROBLEM_JSON))
}

/// Keep status and headers (`Allow`, CORS, ...) of `response`, swap in the
/// rendered problem.
fn replace_body(response: Response, problem: Problem) -> Response {
    let (mut parts, _) = response.into_parts();
    let (rendered, body) = problem.into_response().into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    for (name, value) in &rendered.headers {
        parts.headers.insert(name.clone(), value.clone());
    }
    Response::from_parts(parts, body)
}

#[derive(Debug, Error)]
#[error("{0}")]
struct HandlerPanic(String);

/// Render a panicked handler as a 500 problem.
pub fn panic_problem(
    development: bool,
) -> impl Fn(Box<dyn Any + Send + 'static>) -> Response + Clone {
    move |payload| {
        let message = payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_else(|| "handler panicked".to_string());
        Problem::internal(&HandlerPanic(message), development).into_response()
    }
}

fn type_uri(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "https://tools.ietf.org/html/rfc9110#section-15.5.1",
        401 => "https://tools.ietf.org/html/rfc9110#section-15.5.2",
        403 => "https://tools.ietf.org/html/rfc9110#section-15.5.4",
        404 => "https://tools.ietf.org/html/rfc9110#section-15.5.5",
        500 => "https://tools.ietf.org/html/rfc9110#section-15.6.1",
        _ => "about:blank",
    }
}

/// OAuth2 token endpoint error (`{"error", "error_description"}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthError {
    pub status: StatusCode,
    pub code: &'static str,
    pub description: String,
}

impl OAuthError {
    pub fn bad_request(code: &'static str, description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            description: description.into(),
        }
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::bad_request("invalid_grant", description)
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        (
            self.status,
            axum::Json(json!({
                "error": self.code,
                "error_description": self.description,
            })),
        )
            .into_response()
    }
}

/// Failure of a token endpoint request.
#[derive(Debug)]
pub enum TokenEndpointError {
    OAuth(OAuthError),
    Internal { message: String, development: bool },
}

impl TokenEndpointError {
    pub fn internal(error: &dyn std::error::Error, development: bool) -> Self {
        Self::Internal {
            message: error.to_string(),
            development,
        }
    }
}

impl From<OAuthError> for TokenEndpointError {
    fn from(e: OAuthError) -> Self {
        Self::OAuth(e)
    }
}

impl IntoResponse for TokenEndpointError {
    fn into_response(self) -> Response {
        match self {
            TokenEndpointError::OAuth(e) => e.into_response(),
            TokenEndpointError::Internal { message, development } => {
                tracing::error!(error = %message, "token request failed");
                let problem = Problem::new(StatusCode::INTERNAL_SERVER_ERROR);
                if development {
                    problem.with_detail(message).into_response()
                } else {
                    problem.into_response()
                }
            }
        }
    }
}

/// Map an identity store failure on the token endpoint.
pub fn identity_error(e: IdentityError, development: bool) -> TokenEndpointError {
    TokenEndpointError::internal(&e, development)
}

/// Map a signing failure on the token endpoint.
pub fn token_error(e: TokenError, development: bool) -> TokenEndpointError {
    TokenEndpointError::internal(&e, development)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_serializes_rfc7807_fields() {
        let problem = Problem::new(StatusCode::NOT_FOUND).with_instance("/nope");
        let value = serde_json::to_value(&problem).unwrap();
        assert_eq!(value["type"], "https://tools.ietf.org/html/rfc9110#section-15.5.5");
        assert_eq!(value["title"], "Not Found");
        assert_eq!(value["status"], 404);
        assert_eq!(value["instance"], "/nope");
        assert!(value.get("detail").is_none());
    }

    #[test]
    fn unauthenticated_problem_challenges_for_bearer() {
        let response = Problem::denied(DenyReason::Unauthenticated).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_JSON);

        let forbidden = Problem::denied(DenyReason::Forbidden).into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert!(forbidden.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn completed_problems_carry_instance_and_trace_id() {
        let response = Problem::new(StatusCode::FORBIDDEN).into_response();
        let response = complete_problem(response, "/api/x", Some("abc")).await;

        assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_JSON);
        let body = body_json(response).await;
        assert_eq!(body["instance"], "/api/x");
        assert_eq!(body["traceId"], "abc");
    }

    #[tokio::test]
    async fn explicit_instance_is_kept() {
        let response = Problem::new(StatusCode::NOT_FOUND).with_instance("/mine").into_response();
        let body = body_json(complete_problem(response, "/other", None).await).await;
        assert_eq!(body["instance"], "/mine");
        assert!(body.get("traceId").is_none());
    }

    #[tokio::test]
    async fn plain_error_responses_become_problems() {
        let rejection =
            (StatusCode::UNPROCESSABLE_ENTITY, "missing field `param`").into_response();
        let response = complete_problem(rejection, "/api/y", Some("t")).await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_JSON);
        let body = body_json(response).await;
        assert_eq!(body["status"], 422);
        assert_eq!(body["detail"], "missing field `param`");
    }

    #[tokio::test]
    async fn success_and_oauth_errors_pass_through() {
        let ok = complete_problem("fine".into_response(), "/", None).await;
        assert_eq!(ok.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");

        let oauth = OAuthError::invalid_grant("nope").into_response();
        let body = body_json(complete_problem(oauth, "/connect/token", None).await).await;
        assert_eq!(body["error"], "invalid_grant");
    }

    #[test]
    fn panics_render_as_internal_problems() {
        let render = panic_problem(true);
        let response = render(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let problem = response.extensions().get::<Problem>().unwrap();
        assert_eq!(problem.detail.as_deref(), Some("boom"));

        let hidden = panic_problem(false)(Box::new(String::from("secret")));
        assert_eq!(hidden.extensions().get::<Problem>().unwrap().detail, None);
    }

    #[test]
    fn internal_detail_only_in_development() {
        let err = std::io::Error::other("disk on fire");
        assert_eq!(
            Problem::internal(&err, true).detail.as_deref(),
            Some("disk on fire")
        );
        assert_eq!(Problem::internal(&err, false).detail, None);
    }
}
