//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{LockoutPolicy, PasswordHasher, Role, validate_password};
use crate::config::{BootstrapConfig, PasswordPolicyConfig};
use crate::db::{Identity, NewIdentity, ProfileUpdate, Store, normalize_email};
use crate::services::audit::{AuditEvent, Auditor, RequestContext};
use crate::services::auth_service::{
    AuthError, AuthService, LoginOutcome, Profile, Registration,
};

const ENTITY: &str = "User";

pub struct SeaOrmAuthService {
    store: Store,
    auditor: Auditor,
    hasher: PasswordHasher,
    lockout: LockoutPolicy,
    password_policy: PasswordPolicyConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(
        store: Store,
        auditor: Auditor,
        hasher: PasswordHasher,
        lockout: LockoutPolicy,
        password_policy: PasswordPolicyConfig,
    ) -> Self {
        Self {
            store,
            auditor,
            hasher,
            lockout,
            password_policy,
        }
    }

    async fn audit_attempt(
        &self,
        ctx: &RequestContext,
        actor: Option<&str>,
        email: &str,
        reason: &str,
    ) {
        let event = AuditEvent::new(
            ENTITY,
            "LoginAttempt",
            json!({ "email": email, "success": false, "reason": reason }),
        )
        .actor(actor);

        self.auditor.record(ctx, event).await;
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, AuthError> {
        let Some(credentials) = self.store.get_credentials_by_email(email).await? else {
            self.audit_attempt(ctx, None, email, "User not found").await;
            return Ok(LoginOutcome::Failed);
        };

        let user_id = credentials.identity.id.clone();

        if !credentials.identity.is_active {
            self.audit_attempt(ctx, Some(&user_id), email, "Account inactive")
                .await;
            return Ok(LoginOutcome::Failed);
        }

        let now = Utc::now();
        if self.lockout.is_locked(&credentials.lockout, now) {
            self.audit_attempt(ctx, Some(&user_id), email, "Locked out").await;
            return Ok(LoginOutcome::LockedOut);
        }

        let valid = self
            .hasher
            .verify(password, &credentials.password_hash)
            .await?;

        if !valid {
            let tripped = self
                .store
                .record_failed_sign_in(&user_id, &self.lockout, now)
                .await?;

            if tripped {
                warn!(user_id = %user_id, "Account locked after repeated failed sign-ins");
                self.audit_attempt(ctx, Some(&user_id), email, "Locked out").await;
                return Ok(LoginOutcome::LockedOut);
            }

            self.audit_attempt(ctx, Some(&user_id), email, "Invalid password")
                .await;
            return Ok(LoginOutcome::Failed);
        }

        if credentials.lockout.failed_count > 0 || credentials.lockout.lockout_end.is_some() {
            self.store
                .record_lockout(&user_id, &self.lockout.record_success())
                .await?;
        }

        let identity = credentials.identity;
        self.auditor
            .record(
                ctx,
                AuditEvent::new(
                    ENTITY,
                    "Login",
                    json!({
                        "userName": identity.username,
                        "email": identity.email,
                        "success": true,
                    }),
                )
                .entity(&identity.id)
                .actor(Some(&identity.id)),
            )
            .await;

        Ok(LoginOutcome::Success(identity))
    }

    async fn logout(&self, caller: Option<&Identity>, ctx: &RequestContext) {
        let Some(identity) = caller else {
            return;
        };

        self.auditor
            .record(
                ctx,
                AuditEvent::new(
                    ENTITY,
                    "Logout",
                    json!({ "userName": identity.username, "email": identity.email }),
                )
                .entity(&identity.id)
                .actor(Some(&identity.id)),
            )
            .await;
    }

    async fn register(
        &self,
        registration: Registration,
        ctx: &RequestContext,
    ) -> Result<Identity, AuthError> {
        let email = normalize_email(&registration.email);

        let mut errors = Vec::new();
        if email.is_empty() || !email.contains('@') {
            errors.push(format!("Email '{email}' is invalid."));
        }
        if registration.first_name.trim().is_empty() {
            errors.push("First name is required.".to_string());
        }
        if registration.last_name.trim().is_empty() {
            errors.push("Last name is required.".to_string());
        }
        if let Err(password_errors) = validate_password(&self.password_policy, &registration.password)
        {
            errors.extend(password_errors);
        }
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        // The email doubles as the username.
        if self.store.email_or_username_taken(&email, &email).await? {
            return Err(AuthError::validation(format!(
                "Username '{email}' is already taken."
            )));
        }

        let password_hash = self.hasher.hash(&registration.password).await?;

        let identity = self
            .store
            .create_user(
                NewIdentity {
                    username: email.clone(),
                    email,
                    first_name: registration.first_name,
                    last_name: registration.last_name,
                    phone_number: registration.phone_number,
                },
                password_hash,
                &[Role::Customer],
            )
            .await?;

        self.auditor
            .record(
                ctx,
                AuditEvent::new(
                    ENTITY,
                    "Register",
                    json!({
                        "userName": identity.username,
                        "email": identity.email,
                        "firstName": identity.first_name,
                        "lastName": identity.last_name,
                    }),
                )
                .entity(&identity.id)
                .actor(Some(&identity.id)),
            )
            .await;

        info!(user_id = %identity.id, "Registered new identity");
        Ok(identity)
    }

    async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let credentials = self
            .store
            .get_credentials_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self
            .hasher
            .verify(current_password, &credentials.password_hash)
            .await?
        {
            return Err(AuthError::validation("Incorrect password."));
        }

        validate_password(&self.password_policy, new_password).map_err(AuthError::Validation)?;

        let password_hash = self.hasher.hash(new_password).await?;
        self.store.update_password_hash(user_id, password_hash).await?;

        let identity = credentials.identity;
        self.auditor
            .record(
                ctx,
                AuditEvent::new(
                    ENTITY,
                    "ChangePassword",
                    json!({ "userName": identity.username, "email": identity.email }),
                )
                .entity(&identity.id)
                .actor(Some(&identity.id)),
            )
            .await;

        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Profile, AuthError> {
        let identity = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let roles = self.store.roles_for_user(user_id).await?;

        Ok(Profile {
            id: identity.id,
            username: identity.username,
            email: identity.email,
            first_name: identity.first_name,
            last_name: identity.last_name,
            phone_number: identity.phone_number,
            created_at: identity.created_at,
            is_active: identity.is_active,
            roles: roles.names(),
        })
    }

    async fn update_profile(
        &self,
        user_id: &str,
        first_name: String,
        last_name: String,
        phone_number: Option<String>,
        ctx: &RequestContext,
    ) -> Result<Identity, AuthError> {
        let identity = self
            .store
            .update_profile(
                user_id,
                ProfileUpdate {
                    first_name,
                    last_name,
                    phone_number,
                },
            )
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.auditor
            .record(
                ctx,
                AuditEvent::new(
                    ENTITY,
                    "UpdateProfile",
                    json!({
                        "userName": identity.username,
                        "email": identity.email,
                        "firstName": identity.first_name,
                        "lastName": identity.last_name,
                        "phoneNumber": identity.phone_number,
                    }),
                )
                .entity(&identity.id)
                .actor(Some(&identity.id)),
            )
            .await;

        Ok(identity)
    }

    async fn deactivate(
        &self,
        user_id: &str,
        actor: &str,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let target = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if target.is_active
            && self
                .store
                .roles_for_user(user_id)
                .await?
                .contains(Role::Administrator)
            && self
                .store
                .count_active_role_members(Role::Administrator)
                .await?
                <= 1
        {
            return Err(AuthError::validation(
                "Cannot deactivate the last Administrator",
            ));
        }

        if !self.store.set_user_active(user_id, false).await? {
            return Err(AuthError::UserNotFound);
        }

        self.auditor
            .record(
                ctx,
                AuditEvent::new(
                    ENTITY,
                    "Deactivate",
                    json!({ "userId": user_id, "selfService": user_id == actor }),
                )
                .entity(user_id)
                .actor(Some(actor)),
            )
            .await;

        info!(user_id, actor, "Deactivated identity");
        Ok(())
    }

    async fn ensure_bootstrap_admin(&self, config: &BootstrapConfig) -> Result<bool, AuthError> {
        if !config.enabled || self.store.count_role_members(Role::Administrator).await? > 0 {
            return Ok(false);
        }

        if let Some(existing) = self.store.get_user_by_email(&config.admin_email).await? {
            self.store
                .assign_role(&existing.id, Role::Administrator)
                .await?;
            info!(email = %config.admin_email, "Granted Administrator to existing identity");
            return Ok(true);
        }

        let password_hash = self.hasher.hash(&config.admin_password).await?;
        let identity = self
            .store
            .create_user(
                NewIdentity {
                    username: "admin".to_string(),
                    email: config.admin_email.clone(),
                    first_name: "Admin".to_string(),
                    last_name: "User".to_string(),
                    phone_number: None,
                },
                password_hash,
                &[Role::Administrator],
            )
            .await?;

        warn!(
            user_id = %identity.id,
            email = %identity.email,
            "Seeded bootstrap administrator; change its password"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::LockoutState;
    use crate::config::{AuthThrottleConfig, SecurityConfig};
    use crate::db::AuditFilter;
    use std::sync::Arc;

    async fn service() -> (SeaOrmAuthService, Store) {
        let path = std::env::temp_dir().join(format!("storefront-auth-{}.db", uuid::Uuid::new_v4()));
        let store = Store::new(&format!("sqlite:{}", path.display()))
            .await
            .unwrap();

        let security = SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            ..SecurityConfig::default()
        };

        let service = SeaOrmAuthService::new(
            store.clone(),
            Auditor::from_store(store.clone()),
            PasswordHasher::from_config(&security).unwrap(),
            LockoutPolicy::from_config(&AuthThrottleConfig::default()),
            security.password,
        );

        (service, store)
    }

    fn registration(email: &str) -> Registration {
        Registration {
            email: email.to_string(),
            password: "Passw0rd!".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            phone_number: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (service, store) = service().await;
        let ctx = RequestContext::unknown();

        let identity = service
            .register(registration("jane@example.com"), &ctx)
            .await
            .unwrap();
        assert!(store.roles_for_user(&identity.id).await.unwrap().contains(Role::Customer));

        let outcome = service
            .login("jane@example.com", "Passw0rd!", &ctx)
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_register_rejects_weak_password_and_duplicates() {
        let (service, _) = service().await;
        let ctx = RequestContext::unknown();

        let mut weak = registration("weak@example.com");
        weak.password = "short".to_string();
        let Err(AuthError::Validation(errors)) = service.register(weak, &ctx).await else {
            panic!("weak password accepted");
        };
        assert!(errors.len() > 1);

        service
            .register(registration("dup@example.com"), &ctx)
            .await
            .unwrap();
        assert!(matches!(
            service.register(registration("dup@example.com"), &ctx).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_fifth_wrong_password_locks_out() {
        let (service, _) = service().await;
        let ctx = RequestContext::unknown();
        service
            .register(registration("lock@example.com"), &ctx)
            .await
            .unwrap();

        for _ in 0..4 {
            let outcome = service.login("lock@example.com", "wrong", &ctx).await.unwrap();
            assert!(matches!(outcome, LoginOutcome::Failed));
        }

        let fifth = service.login("lock@example.com", "wrong", &ctx).await.unwrap();
        assert!(matches!(fifth, LoginOutcome::LockedOut));

        // Correct password is refused while the lockout window is open.
        let locked = service
            .login("lock@example.com", "Passw0rd!", &ctx)
            .await
            .unwrap();
        assert!(matches!(locked, LoginOutcome::LockedOut));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_wrong_passwords_still_lock_out() {
        let (service, _) = service().await;
        let service = Arc::new(service);
        service
            .register(registration("race@example.com"), &RequestContext::unknown())
            .await
            .unwrap();

        let attempts: Vec<_> = (0..20)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    let ctx = RequestContext::unknown();
                    service.login("race@example.com", "wrong", &ctx).await
                })
            })
            .collect();

        let mut locked = 0;
        for attempt in attempts {
            if matches!(attempt.await.unwrap(), Ok(LoginOutcome::LockedOut)) {
                locked += 1;
            }
        }
        assert!(locked > 0, "no attempt reported a lockout");

        let outcome = service
            .login("race@example.com", "Passw0rd!", &RequestContext::unknown())
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::LockedOut));
    }

    #[tokio::test]
    async fn test_sign_in_recovers_after_cooldown() {
        let (service, store) = service().await;
        let ctx = RequestContext::unknown();
        let identity = service
            .register(registration("cool@example.com"), &ctx)
            .await
            .unwrap();

        for _ in 0..5 {
            service.login("cool@example.com", "wrong", &ctx).await.unwrap();
        }
        let credentials = store
            .get_credentials_by_id(&identity.id)
            .await
            .unwrap()
            .unwrap();
        assert!(credentials.lockout.lockout_end.is_some());

        // Move the window into the past as if the cooldown had elapsed.
        store
            .record_lockout(
                &identity.id,
                &LockoutState {
                    failed_count: 0,
                    lockout_end: Some(Utc::now() - chrono::Duration::seconds(1)),
                },
            )
            .await
            .unwrap();

        let outcome = service
            .login("cool@example.com", "Passw0rd!", &ctx)
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Success(_)));

        let cleared = store
            .get_credentials_by_id(&identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cleared.lockout, LockoutState::default());

        // The counter starts over rather than re-locking on the next miss.
        let miss = service.login("cool@example.com", "wrong", &ctx).await.unwrap();
        assert!(matches!(miss, LoginOutcome::Failed));
    }

    #[tokio::test]
    async fn test_email_matching_ignores_case() {
        let (service, _) = service().await;
        let ctx = RequestContext::unknown();
        let identity = service
            .register(registration("Alice@Example.com"), &ctx)
            .await
            .unwrap();
        assert_eq!(identity.email, "alice@example.com");

        let outcome = service
            .login("ALICE@example.COM", "Passw0rd!", &ctx)
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Success(_)));

        assert!(matches!(
            service.register(registration("alice@example.com"), &ctx).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_email_is_audited_without_actor() {
        let (service, store) = service().await;
        let ctx = RequestContext::new("192.0.2.1");

        let outcome = service
            .login("nobody@example.com", "whatever", &ctx)
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Failed));

        let entries = store
            .list_audit(AuditFilter {
                action: Some("LoginAttempt".to_string()),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id, None);
        assert_eq!(entries[0].ip_address, "192.0.2.1");
        assert!(entries[0].details.contains("User not found"));
    }

    #[tokio::test]
    async fn test_deactivated_identity_cannot_sign_in() {
        let (service, _) = service().await;
        let ctx = RequestContext::unknown();
        let identity = service
            .register(registration("gone@example.com"), &ctx)
            .await
            .unwrap();

        service.deactivate(&identity.id, &identity.id, &ctx).await.unwrap();

        let outcome = service
            .login("gone@example.com", "Passw0rd!", &ctx)
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Failed));
    }

    #[tokio::test]
    async fn test_last_active_administrator_cannot_be_deactivated() {
        let (service, store) = service().await;
        let ctx = RequestContext::unknown();
        service
            .ensure_bootstrap_admin(&BootstrapConfig::default())
            .await
            .unwrap();
        let admin = store
            .get_user_by_email(&BootstrapConfig::default().admin_email)
            .await
            .unwrap()
            .unwrap();

        // An inactive second Administrator does not count.
        let dormant = service
            .register(registration("dormant@example.com"), &ctx)
            .await
            .unwrap();
        store.assign_role(&dormant.id, Role::Administrator).await.unwrap();
        store.set_user_active(&dormant.id, false).await.unwrap();

        assert!(matches!(
            service.deactivate(&admin.id, &admin.id, &ctx).await,
            Err(AuthError::Validation(_))
        ));
        assert!(store.get_user(&admin.id).await.unwrap().unwrap().is_active);

        let backup = service
            .register(registration("backup@example.com"), &ctx)
            .await
            .unwrap();
        store.assign_role(&backup.id, Role::Administrator).await.unwrap();

        service.deactivate(&admin.id, &backup.id, &ctx).await.unwrap();
        assert_eq!(
            store
                .count_active_role_members(Role::Administrator)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_change_password_requires_current() {
        let (service, _) = service().await;
        let ctx = RequestContext::unknown();
        let identity = service
            .register(registration("pw@example.com"), &ctx)
            .await
            .unwrap();

        assert!(matches!(
            service
                .change_password(&identity.id, "nope", "N3wPassw0rd!", &ctx)
                .await,
            Err(AuthError::Validation(_))
        ));

        service
            .change_password(&identity.id, "Passw0rd!", "N3wPassw0rd!", &ctx)
            .await
            .unwrap();
        let outcome = service
            .login("pw@example.com", "N3wPassw0rd!", &ctx)
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_runs_once() {
        let (service, store) = service().await;
        let config = BootstrapConfig::default();

        assert!(service.ensure_bootstrap_admin(&config).await.unwrap());
        assert!(!service.ensure_bootstrap_admin(&config).await.unwrap());
        assert_eq!(store.count_role_members(Role::Administrator).await.unwrap(), 1);
    }
}
