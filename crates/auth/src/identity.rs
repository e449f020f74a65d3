//! User accounts and the identity store boundary.

use std::collections::BTreeMap;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use forge_core::{ForgeError, UserId};
use password_hash::{PasswordHash, SaltString};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::builder::UserIdentity;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Domain(#[from] ForgeError),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Stored user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAccount {
    pub id: UserId,
    pub user_name: String,
    pub email: Option<String>,
    pub email_confirmed: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Argon2 PHC string.
    #[serde(skip)]
    pub password_hash: String,
    pub roles: Vec<String>,
    pub claims: Vec<(String, String)>,
}

impl UserAccount {
    /// "First Last" when either part is known, else the user name.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            self.user_name.clone()
        } else {
            parts.join(" ")
        }
    }

    /// Identity facts used to build token claims.
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.id.to_string(),
            user_name: self.user_name.clone(),
            email: self.email.clone(),
            email_verified: self.email_confirmed,
            additional_claims: self.claims.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub user_name: String,
    pub email: Option<String>,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_confirmed: bool,
    pub roles: Vec<String>,
    pub claims: Vec<(String, String)>,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Case-insensitive lookup by user name, then by email.
    async fn find_by_name_or_email(
        &self,
        login: &str,
    ) -> Result<Option<UserAccount>, IdentityError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserAccount>, IdentityError>;

    async fn verify_password(&self, user: &UserAccount, password: &str) -> bool;

    async fn roles_for(&self, user: &UserAccount) -> Result<Vec<String>, IdentityError>;

    async fn add_claim(&self, id: UserId, kind: &str, value: &str) -> Result<(), IdentityError>;

    async fn add_to_role(&self, id: UserId, role: &str) -> Result<(), IdentityError>;

    async fn create_user(&self, user: NewUser) -> Result<UserAccount, IdentityError>;

    async fn delete_user(&self, id: UserId) -> Result<(), IdentityError>;
}

fn hashing(e: impl std::fmt::Display) -> IdentityError {
    IdentityError::Hashing(e.to_string())
}

/// Minimum password rules applied on account creation.
pub fn validate_password(password: &str) -> Result<(), ForgeError> {
    let mut problems = Vec::new();
    if password.chars().count() < 8 {
        problems.push("at least 8 characters");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("a digit");
    }
    if !password.chars().any(char::is_lowercase) {
        problems.push("a lowercase letter");
    }
    if !password.chars().any(char::is_uppercase) {
        problems.push("an uppercase letter");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ForgeError::validation(format!(
            "password must contain {}",
            problems.join(", ")
        )))
    }
}

/// Identity store held in process memory. Used for development and tests.
pub struct InMemoryIdentityStore {
    hasher: Argon2<'static>,
    users: RwLock<BTreeMap<UserId, UserAccount>>,
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::with_hasher(Argon2::default())
    }
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hasher(hasher: Argon2<'static>) -> Self {
        Self {
            hasher,
            users: RwLock::new(BTreeMap::new()),
        }
    }

    /// Argon2 is CPU-bound; it runs on the blocking pool.
    async fn hash_password(&self, password: &str) -> Result<String, IdentityError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || -> Result<String, IdentityError> {
            let mut salt_bytes = [0u8; 16];
            getrandom::getrandom(&mut salt_bytes).map_err(hashing)?;
            let salt = SaltString::encode_b64(&salt_bytes).map_err(hashing)?;
            let phc = hasher
                .hash_password(password.as_bytes(), &salt)
                .map_err(hashing)?
                .to_string();
            Ok(phc)
        })
        .await
        .map_err(hashing)?
    }

    async fn update(
        &self,
        id: UserId,
        f: impl FnOnce(&mut UserAccount) + Send,
    ) -> Result<(), IdentityError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or_else(ForgeError::not_found)?;
        f(user);
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_name_or_email(
        &self,
        login: &str,
    ) -> Result<Option<UserAccount>, IdentityError> {
        let users = self.users.read().await;
        let by_name = users
            .values()
            .find(|u| u.user_name.eq_ignore_ascii_case(login));
        let found = by_name.or_else(|| {
            users.values().find(|u| {
                u.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(login))
            })
        });
        Ok(found.cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserAccount>, IdentityError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn verify_password(&self, user: &UserAccount, password: &str) -> bool {
        let hasher = self.hasher.clone();
        let stored = user.password_hash.clone();
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || {
            PasswordHash::new(&stored)
                .map(|parsed| hasher.verify_password(password.as_bytes(), &parsed).is_ok())
                .map_err(|e| e.to_string())
        })
        .await;

        match verified {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                tracing::warn!(
                    user_id = %user.id,
                    error = %e,
                    "stored password hash is unreadable"
                );
                false
            }
            Err(e) => {
                tracing::error!(
                    user_id = %user.id,
                    error = %e,
                    "password verification task failed"
                );
                false
            }
        }
    }

    async fn roles_for(&self, user: &UserAccount) -> Result<Vec<String>, IdentityError> {
        Ok(self
            .users
            .read()
            .await
            .get(&user.id)
            .map(|u| u.roles.clone())
            .unwrap_or_default())
    }

    async fn add_claim(&self, id: UserId, kind: &str, value: &str) -> Result<(), IdentityError> {
        let claim = (kind.to_string(), value.to_string());
        self.update(id, move |u| {
            if !u.claims.contains(&claim) {
                u.claims.push(claim);
            }
        })
        .await
    }

    async fn add_to_role(&self, id: UserId, role: &str) -> Result<(), IdentityError> {
        let role = role.to_string();
        self.update(id, move |u| {
            if !u.roles.contains(&role) {
                u.roles.push(role);
            }
        })
        .await
    }

    async fn create_user(&self, new: NewUser) -> Result<UserAccount, IdentityError> {
        if new.user_name.trim().is_empty() {
            return Err(ForgeError::validation("user name must not be empty").into());
        }
        validate_password(&new.password)?;

        let password_hash = self.hash_password(&new.password).await?;

        let mut users = self.users.write().await;
        if users.values().any(|u| u.user_name.eq_ignore_ascii_case(&new.user_name)) {
            let message = format!("user name '{}' is already taken", new.user_name);
            return Err(ForgeError::conflict(message).into());
        }
        if let Some(email) = new.email.as_deref() {
            let taken = users
                .values()
                .any(|u| u.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)));
            if taken {
                let message = format!("email '{email}' is already taken");
                return Err(ForgeError::conflict(message).into());
            }
        }

        let mut roles: Vec<String> = Vec::new();
        for role in new.roles {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        let account = UserAccount {
            id: UserId::new(),
            user_name: new.user_name,
            email: new.email,
            email_confirmed: new.email_confirmed,
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash,
            roles,
            claims: new.claims,
        };
        users.insert(account.id, account.clone());
        tracing::info!(user_id = %account.id, user_name = %account.user_name, "user created");
        Ok(account)
    }

    async fn delete_user(&self, id: UserId) -> Result<(), IdentityError> {
        self.users
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ForgeError::not_found().into())
    }
}

/// Create the development accounts `admin` and `user` unless they exist.
pub async fn seed_development_users(store: &dyn IdentityStore) -> Result<(), IdentityError> {
    let seeds = [
        NewUser {
            user_name: "admin".into(),
            email: Some("admin@test.local".into()),
            password: "AdminPassword123!".into(),
            first_name: Some("Admin".into()),
            last_name: Some("User".into()),
            email_confirmed: true,
            roles: vec!["admin".into(), "user".into()],
            claims: vec![("department".into(), "IT".into())],
        },
        NewUser {
            user_name: "user".into(),
            email: Some("user@test.local".into()),
            password: "UserPassword123!".into(),
            first_name: Some("Normal".into()),
            last_name: Some("User".into()),
            email_confirmed: true,
            roles: vec!["user".into()],
            claims: vec![("department".into(), "Sales".into())],
        },
    ];

    for seed in seeds {
        if store.find_by_name_or_email(&seed.user_name).await?.is_some() {
            continue;
        }
        store.create_user(seed).await?;
    }
    Ok(())
}
