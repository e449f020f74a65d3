use std::sync::Arc;
use std::time::Instant;

use axum::{Extension, Json, http::StatusCode};

use forge_auth::CurrentUser;
use forge_core::ForgeSettings;

use crate::app::dto::{HealthCheckEntry, HealthResponse, HealthStatus, WhoAmI, non_empty};
use crate::context::RequestUser;

/// Which endpoint runs a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTag {
    Live,
    Ready,
}

struct HealthCheck {
    name: &'static str,
    tags: &'static [HealthTag],
    run: fn() -> Result<(), String>,
}

const CHECKS: &[HealthCheck] = &[HealthCheck {
    name: "self",
    tags: &[HealthTag::Live, HealthTag::Ready],
    run: process_is_up,
}];

fn process_is_up() -> Result<(), String> {
    Ok(())
}

fn run_checks(tag: Option<HealthTag>) -> Vec<HealthCheckEntry> {
    CHECKS
        .iter()
        .filter(|check| tag.is_none_or(|t| check.tags.contains(&t)))
        .map(|check| {
            let started = Instant::now();
            let outcome = (check.run)();
            let duration = format!("{:?}", started.elapsed());
            match outcome {
                Ok(()) => HealthCheckEntry {
                    name: check.name,
                    status: HealthStatus::Healthy,
                    description: None,
                    duration,
                },
                Err(description) => HealthCheckEntry {
                    name: check.name,
                    status: HealthStatus::Unhealthy,
                    description: Some(description),
                    duration,
                },
            }
        })
        .collect()
}

fn report(forge: &ForgeSettings, tag: Option<HealthTag>) -> (StatusCode, Json<HealthResponse>) {
    let checks = run_checks(tag);
    let status = if checks.iter().all(|c| c.status == HealthStatus::Healthy) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let body = HealthResponse {
        status,
        service: non_empty(&forge.service_name),
        application: non_empty(&forge.application),
        environment: non_empty(&forge.environment),
        tenant: non_empty(&forge.tenant),
        team: non_empty(&forge.team_name),
        version: env!("CARGO_PKG_VERSION"),
        checks,
    };
    (code, Json(body))
}

/// Every check.
pub async fn health(
    Extension(forge): Extension<Arc<ForgeSettings>>,
) -> (StatusCode, Json<HealthResponse>) {
    report(&forge, None)
}

/// Liveness: cheap checks only.
pub async fn live(
    Extension(forge): Extension<Arc<ForgeSettings>>,
) -> (StatusCode, Json<HealthResponse>) {
    report(&forge, Some(HealthTag::Live))
}

/// Readiness: includes dependency checks.
pub async fn ready(
    Extension(forge): Extension<Arc<ForgeSettings>>,
) -> (StatusCode, Json<HealthResponse>) {
    report(&forge, Some(HealthTag::Ready))
}

pub async fn whoami(user: RequestUser) -> Json<WhoAmI> {
    Json(WhoAmI {
        user_id: user.user_id().map(str::to_string),
        user_name: user.user_name().map(str::to_string),
        email: user.email().map(str::to_string),
        roles: owned(user.roles()),
        capabilities: owned(user.capabilities()),
        scopes: user.0.as_ref().map(|p| p.scopes.clone()).unwrap_or_default(),
    })
}

fn owned(values: Vec<&str>) -> Vec<String> {
    values.into_iter().map(str::to_string).collect()
}
