//! Logging setup and request-scoped log context (shared setup).

/// Per-request user context attached to log records.
pub mod context;

/// Subscriber configuration (filters, formatters).
pub mod logging;

pub use context::{
    ANONYMOUS, REQUEST_SPAN, UNKNOWN, USER_SPAN, anonymous_span, request_span, user_span,
};
pub use logging::{LogFormat, LoggingSettings, init};
