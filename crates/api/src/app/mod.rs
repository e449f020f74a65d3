//! HTTP application wiring (axum router + service wiring).
//!
//! - `services.rs`: authorization model, token service, identity store
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: problem documents and OAuth2 errors

use std::sync::Arc;

use axum::{
    Extension, Router,
    http::{HeaderValue, Method, StatusCode, header},
};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use forge_auth::{ConfigError, IdentityStore};

use crate::middleware;
use crate::settings::{AppSettings, HostingSettings};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use errors::Problem;
use services::{AppServices, StartupError};

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(
    settings: &AppSettings,
    identities: Arc<dyn IdentityStore>,
) -> Result<Router, StartupError> {
    let services = Arc::new(AppServices::from_settings(settings, identities)?);
    let forge = Arc::new(settings.forge.clone());
    let development = services.development;
    let auth_state = middleware::AuthState {
        tokens: services.tokens.clone(),
    };

    // Outermost first: trace id, service log context, problem rendering,
    // panic recovery, then the caller's identity.
    let app = routes::public_router()
        .merge(routes::protected_router(&services.policies)?)
        .fallback(not_found)
        .layer(Extension(forge.clone()))
        .layer(Extension(services))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(middleware::CORRELATION_ID, MakeRequestUuid))
                .layer(PropagateRequestIdLayer::new(middleware::CORRELATION_ID))
                .layer(axum::middleware::from_fn_with_state(forge, middleware::service_logging))
                .layer(axum::middleware::from_fn(middleware::problem_details))
                .layer(CatchPanicLayer::custom(errors::panic_problem(development)))
                .layer(axum::middleware::from_fn_with_state(auth_state, middleware::authenticate))
                .layer(axum::middleware::from_fn(middleware::user_logging))
                .layer(axum::middleware::from_fn(middleware::request_logging)),
        );

    Ok(match cors(&settings.hosting)? {
        Some(layer) => app.layer(layer),
        None => app,
    })
}

fn cors(hosting: &HostingSettings) -> Result<Option<CorsLayer>, ConfigError> {
    if hosting.cors_origins.is_empty() {
        return Ok(None);
    }
    let origins = hosting
        .cors_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|e| ConfigError::Invalid {
                field: "hosting.cors_origins",
                message: format!("'{origin}': {e}"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    ))
}

async fn not_found() -> Problem {
    Problem::new(StatusCode::NOT_FOUND)
}
