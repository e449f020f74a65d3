use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

use forge_auth::{CurrentUser, Principal};

/// The caller of the current request, as established by the authentication
/// middleware. Anonymous when no valid bearer token was presented.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestUser(pub Option<Principal>);

impl RequestUser {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self(Some(principal))
    }
}

impl CurrentUser for RequestUser {
    fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<RequestUser>().cloned().unwrap_or_default())
    }
}
