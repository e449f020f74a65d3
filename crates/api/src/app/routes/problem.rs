//! Fixed error responses, one per problem status, for checking how errors
//! are rendered. `instance` and `traceId` are filled in by the problem
//! middleware.

use axum::{Router, extract::Query, http::StatusCode, routing::get};
use serde::Deserialize;

use crate::app::errors::Problem;

pub fn router() -> Router {
    Router::new()
        .route("/bad-request", get(bad_request))
        .route("/unauthorized", get(unauthorized))
        .route("/forbidden", get(forbidden))
        .route("/not-found", get(not_found))
        .route("/exception", get(exception))
        .route("/validation", get(validation))
}

async fn bad_request() -> Problem {
    Problem::new(StatusCode::BAD_REQUEST).with_detail("Validation failed")
}

async fn unauthorized() -> Problem {
    Problem::new(StatusCode::UNAUTHORIZED)
}

async fn forbidden() -> Problem {
    Problem::new(StatusCode::FORBIDDEN).with_detail("Access denied")
}

async fn not_found() -> Problem {
    Problem::new(StatusCode::NOT_FOUND).with_detail("Resource not found")
}

/// Fails without handling the failure; the panic layer answers with a 500.
async fn exception() -> Problem {
    panic!("Test exception")
}

#[derive(Debug, Deserialize)]
struct ValidationQuery {
    param: String,
}

/// `param` is required; omitting it is rejected before the handler runs.
async fn validation(Query(query): Query<ValidationQuery>) -> String {
    query.param
}
