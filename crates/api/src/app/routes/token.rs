//! `POST /connect/token`: OAuth2 password and refresh-token grants.

use std::sync::Arc;

use axum::{Extension, Form, Json, extract::rejection::FormRejection};
use chrono::Utc;

use forge_auth::{TokenResponse, UserAccount, parse_scopes};
use forge_core::UserId;

use crate::app::dto::TokenRequest;
use crate::app::errors::{OAuthError, TokenEndpointError, identity_error, token_error};
use crate::app::services::AppServices;

const INVALID_CREDENTIALS: &str = "Invalid username or password.";
const INVALID_REFRESH_TOKEN: &str = "The refresh token is no longer valid.";
const USER_GONE: &str = "The user no longer exists.";

pub async fn exchange(
    Extension(services): Extension<Arc<AppServices>>,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Json<TokenResponse>, TokenEndpointError> {
    let Form(request) = form.map_err(|rejection| {
        tracing::info!(error = %rejection, "malformed token request");
        OAuthError::bad_request("invalid_request", rejection.body_text())
    })?;

    if let Some(client_id) = request.client_id.as_deref() {
        if client_id != services.client_id {
            return Err(OAuthError::bad_request(
                "invalid_client",
                "The client application is not recognized.",
            )
            .into());
        }
    }

    let Some(grant_type) = request.grant_type.as_deref() else {
        return Err(OAuthError::bad_request(
            "invalid_request",
            "The mandatory 'grant_type' parameter is missing.",
        )
        .into());
    };

    let (user, scopes) = match grant_type {
        "password" => password_grant(&services, &request).await?,
        "refresh_token" => refresh_grant(&services, &request).await?,
        other => {
            tracing::info!(grant_type = %other, "unsupported grant type");
            return Err(OAuthError::bad_request(
                "unsupported_grant_type",
                "The specified grant type is not supported.",
            )
            .into());
        }
    };

    // Claims always reflect the current role state of the user.
    let roles = services
        .identities
        .roles_for(&user)
        .await
        .map_err(|e| identity_error(e, services.development))?;
    let issued = services
        .claims
        .build(&user.identity(), roles.iter().map(String::as_str), &scopes);
    let response = services
        .tokens
        .issue(&issued, Utc::now())
        .map_err(|e| token_error(e, services.development))?;

    tracing::info!(
        user_id = %user.id,
        %grant_type,
        scope = %response.scope,
        "token issued"
    );
    Ok(Json(response))
}

async fn password_grant(
    services: &AppServices,
    request: &TokenRequest,
) -> Result<(UserAccount, Vec<String>), TokenEndpointError> {
    let (Some(login), Some(password)) = (request.username.as_deref(), request.password.as_deref())
    else {
        return Err(OAuthError::bad_request(
            "invalid_request",
            "The username and password parameters are required.",
        )
        .into());
    };

    let user = services
        .identities
        .find_by_name_or_email(login)
        .await
        .map_err(|e| identity_error(e, services.development))?;

    let Some(user) = user else {
        tracing::info!("token request for unknown user");
        return Err(OAuthError::invalid_grant(INVALID_CREDENTIALS).into());
    };
    if !services.identities.verify_password(&user, password).await {
        tracing::info!(user_id = %user.id, "token request with wrong password");
        return Err(OAuthError::invalid_grant(INVALID_CREDENTIALS).into());
    }

    let scopes = parse_scopes(request.scope.as_deref().unwrap_or_default());
    Ok((user, scopes))
}

async fn refresh_grant(
    services: &AppServices,
    request: &TokenRequest,
) -> Result<(UserAccount, Vec<String>), TokenEndpointError> {
    let Some(token) = request.refresh_token.as_deref() else {
        return Err(OAuthError::bad_request(
            "invalid_request",
            "The refresh_token parameter is required.",
        )
        .into());
    };

    let grant = services
        .tokens
        .validate_refresh(token, Utc::now())
        .map_err(|e| {
            tracing::info!(error = %e, "refresh token rejected");
            OAuthError::invalid_grant(INVALID_REFRESH_TOKEN)
        })?;
    let id: UserId = grant
        .subject
        .parse()
        .map_err(|_| OAuthError::invalid_grant(INVALID_REFRESH_TOKEN))?;

    let user = services
        .identities
        .find_by_id(id)
        .await
        .map_err(|e| identity_error(e, services.development))?
        .ok_or_else(|| OAuthError::invalid_grant(USER_GONE))?;

    Ok((user, grant.scopes))
}
