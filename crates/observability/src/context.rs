//! Every log record emitted while a request is handled carries the caller's
//! `user_id` and `user_name` through the enclosing `user` span, inside a
//! `request` span naming the service and the request's trace id. Both spans
//! live as long as the instrumented request future, so the values disappear
//! when the request completes, fails or is cancelled.

use forge_core::ForgeSettings;
use tracing::Span;
use tracing::field::Empty;

/// Name of the span carrying the service identity and trace id.
pub const REQUEST_SPAN: &str = "request";

/// Name of the span carrying the user fields.
pub const USER_SPAN: &str = "user";

/// Value logged for both fields on unauthenticated requests.
pub const ANONYMOUS: &str = "Anonymous";

/// Value logged for an authenticated user lacking an id or a name.
pub const UNKNOWN: &str = "Unknown";

pub fn user_span(user_id: Option<&str>, user_name: Option<&str>) -> Span {
    let user_id = user_id.filter(|v| !v.is_empty()).unwrap_or(UNKNOWN);
    let user_name = user_name.filter(|v| !v.is_empty()).unwrap_or(UNKNOWN);
    tracing::info_span!("user", user_id = %user_id, user_name = %user_name)
}

pub fn anonymous_span() -> Span {
    tracing::info_span!("user", user_id = %ANONYMOUS, user_name = %ANONYMOUS)
}

/// Service identity plus the request's trace id. Team and tenant are only
/// recorded when configured.
pub fn request_span(forge: &ForgeSettings, trace_id: &str) -> Span {
    let span = tracing::info_span!(
        "request",
        trace_id = %trace_id,
        environment = %forge.environment,
        application = %forge.application,
        service_name = %forge.service_name,
        team_name = Empty,
        tenant = Empty,
    );
    if !forge.team_name.trim().is_empty() {
        span.record("team_name", forge.team_name.as_str());
    }
    if !forge.tenant.trim().is_empty() {
        span.record("tenant", forge.tenant.as_str());
    }
    span
}
