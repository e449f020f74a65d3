//! Route guards enforcing named authorization policies.
//!
//! Guards are resolved against the policy registry while the router is
//! built, so a route naming an unknown policy fails startup instead of
//! failing requests.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};

use forge_auth::{
    AuthorizationPolicy, Decision, PolicyError, PolicyRegistry, require_authenticated,
};

use crate::app::errors::Problem;
use crate::context::RequestUser;
use crate::middleware::request_path;

#[derive(Debug, Clone)]
enum Guard {
    Authenticated,
    Policy(Arc<AuthorizationPolicy>),
}

/// A resolved route guard.
#[derive(Debug, Clone)]
pub struct RequirePolicy {
    guard: Guard,
}

impl RequirePolicy {
    pub fn named(policies: &PolicyRegistry, name: &str) -> Result<Self, PolicyError> {
        let policy = policies.require(name)?.clone();
        Ok(Self {
            guard: Guard::Policy(Arc::new(policy)),
        })
    }

    pub fn authenticated() -> Self {
        Self {
            guard: Guard::Authenticated,
        }
    }

    pub fn decide(&self, user: &RequestUser) -> Decision {
        match &self.guard {
            Guard::Authenticated => require_authenticated(user.0.as_ref()),
            Guard::Policy(policy) => policy.evaluate(user.0.as_ref()),
        }
    }

    /// Protect every handler of `route` with this guard.
    pub fn protect(self, route: MethodRouter) -> MethodRouter {
        route.route_layer(from_fn_with_state(self, enforce))
    }
}

pub async fn enforce(State(guard): State<RequirePolicy>, req: Request, next: Next) -> Response {
    let user = req.extensions().get::<RequestUser>().cloned().unwrap_or_default();

    match guard.decide(&user) {
        Decision::Allow => next.run(req).await,
        Decision::Deny(reason) => {
            let policy = match &guard.guard {
                Guard::Authenticated => "authenticated",
                Guard::Policy(policy) => policy.name.as_str(),
            };
            let path = request_path(&req);
            tracing::info!(%policy, reason = ?reason, %path, "request denied");
            Problem::denied(reason).with_instance(path).into_response()
        }
    }
}

