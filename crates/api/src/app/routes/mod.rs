use axum::{
    Router,
    routing::{get, post},
};

use forge_auth::PolicyRegistry;

use crate::authz::RequirePolicy;
use crate::app::services::StartupError;

pub mod problem;
pub mod secure;
pub mod system;
pub mod token;

/// Routes served without any guard.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/health/live", get(system::live))
        .route("/health/ready", get(system::ready))
        .route("/connect/token", post(token::exchange))
        .route("/api/secure/public", get(secure::public))
        .nest("/api/problem", problem::router())
}

/// Guarded routes. Fails if a route names a policy that does not exist.
pub fn protected_router(policies: &PolicyRegistry) -> Result<Router, StartupError> {
    let policy = |name: &str| RequirePolicy::named(policies, name);
    let authenticated = RequirePolicy::authenticated;

    let router = Router::new()
        .route("/whoami", authenticated().protect(get(system::whoami)))
        .nest(
            "/api/secure",
            Router::new()
                .route("/authenticated", authenticated().protect(get(secure::authenticated)))
                .route("/department", authenticated().protect(get(secure::department)))
                .route("/user-only", policy("user")?.protect(get(secure::user_only)))
                .route("/admin-only", policy("admin")?.protect(get(secure::admin_only)))
                .route("/resx", policy("ReadResX")?.protect(get(secure::read_resx)))
                .route("/resx", policy("WriteResX")?.protect(post(secure::write_resx)))
                .route("/resy", policy("ReadResY")?.protect(get(secure::read_resy)))
                .route("/resy", policy("WriteResY")?.protect(post(secure::write_resy))),
        );
    Ok(router)
}
