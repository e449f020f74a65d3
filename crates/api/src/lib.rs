//! HTTP API: server wiring, authentication, route guards and handlers.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
pub mod settings;

pub use app::build_app;
pub use context::RequestUser;
pub use settings::{AppSettings, HostingSettings};
