//! Domain service for password sign-in and identity management.
//!
//! Handles login with lockout, logout, registration, password changes,
//! profile reads/updates and account deactivation.

use serde::Serialize;
use thiserror::Error;

use crate::config::BootstrapConfig;
use crate::db::Identity;
use crate::services::audit::RequestContext;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(vec![msg.into()])
    }
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result of a password sign-in. The caller only learns whether it
/// succeeded or the account is locked; other failures look alike.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Success(Identity),
    LockedOut,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

/// Identity plus its current role names.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub created_at: String,
    pub is_active: bool,
    pub roles: Vec<String>,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Checks credentials and maintains lockout counters. Every attempt is
    /// audited.
    async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, AuthError>;

    /// Audits the sign-out when a caller is known. Never fails.
    async fn logout(&self, caller: Option<&Identity>, ctx: &RequestContext);

    /// Creates a Customer identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] listing every broken rule, including
    /// an email that is already registered.
    async fn register(
        &self,
        registration: Registration,
        ctx: &RequestContext,
    ) -> Result<Identity, AuthError>;

    async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError>;

    async fn get_profile(&self, user_id: &str) -> Result<Profile, AuthError>;

    async fn update_profile(
        &self,
        user_id: &str,
        first_name: String,
        last_name: String,
        phone_number: Option<String>,
        ctx: &RequestContext,
    ) -> Result<Identity, AuthError>;

    /// Soft-deactivates `user_id`. Its sessions fail closed from the next
    /// request on.
    async fn deactivate(
        &self,
        user_id: &str,
        actor: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError>;

    /// Seeds the configured administrator when no identity holds the
    /// Administrator role. Returns true when it changed anything.
    async fn ensure_bootstrap_admin(&self, config: &BootstrapConfig) -> Result<bool, AuthError>;
}
