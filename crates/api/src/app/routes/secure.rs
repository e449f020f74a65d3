//! Demonstration endpoints, one per authorization level.

use axum::Json;
use serde_json::{Value, json};

use forge_auth::CurrentUser;

use crate::context::RequestUser;

pub async fn public() -> Json<Value> {
    Json(json!({ "message": "This endpoint is public - anyone can access it" }))
}

pub async fn authenticated(user: RequestUser) -> Json<Value> {
    tracing::info!("authenticated endpoint called");
    Json(json!({
        "message": "You are authenticated!",
        "userId": user.user_id(),
        "userName": user.user_name(),
        "email": user.email(),
        "roles": user.roles(),
    }))
}

pub async fn department(user: RequestUser) -> Json<Value> {
    let department = user.claim("department").unwrap_or_else(|| "Unknown".to_string());
    Json(json!({
        "userName": user.user_name(),
        "department": department,
    }))
}

pub async fn user_only(user: RequestUser) -> Json<Value> {
    Json(json!({
        "message": "You have the 'user' role",
        "userName": user.user_name(),
    }))
}

pub async fn admin_only(user: RequestUser) -> Json<Value> {
    Json(json!({
        "message": "You have the 'admin' role - full access granted",
        "userName": user.user_name(),
    }))
}

pub async fn read_resx(user: RequestUser) -> Json<Value> {
    Json(json!({
        "message": "You have ReadResX capability",
        "userName": user.user_name(),
        "data": "Resource X data here...",
    }))
}

pub async fn write_resx(user: RequestUser) -> Json<Value> {
    tracing::info!("resource X written");
    Json(json!({
        "message": "You have WriteResX capability - write operation allowed",
        "userName": user.user_name(),
    }))
}

pub async fn read_resy(user: RequestUser) -> Json<Value> {
    Json(json!({
        "message": "You have ReadResY capability",
        "userName": user.user_name(),
        "data": "Resource Y data here...",
    }))
}

pub async fn write_resy(user: RequestUser) -> Json<Value> {
    tracing::info!("resource Y written");
    Json(json!({
        "message": "You have WriteResY capability - write operation allowed",
        "userName": user.user_name(),
    }))
}
