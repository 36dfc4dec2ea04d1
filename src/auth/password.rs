use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use tokio::task;

use crate::config::{PasswordPolicyConfig, SecurityConfig};

/// Argon2id hashing with the configured cost parameters.
///
/// Hashing and verification run on the blocking pool; both are CPU heavy.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        let params = Params::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash_blocking(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

        Ok(hash.to_string())
    }

    pub async fn hash(&self, password: &str) -> Result<String> {
        let hasher = self.clone();
        let password = password.to_string();

        task::spawn_blocking(move || hasher.hash_blocking(&password))
            .await
            .context("Password hashing task panicked")?
    }

    /// Verifies against a PHC string; the parameters embedded in the hash win
    /// over the configured ones.
    pub async fn verify(&self, password: &str, password_hash: &str) -> Result<bool> {
        let argon2 = self.argon2();
        let password = password.to_string();
        let password_hash = password_hash.to_string();

        task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")?
    }
}

/// Returns every rule the password breaks, or `Ok` when it satisfies all.
pub fn validate_password(policy: &PasswordPolicyConfig, password: &str) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if password.chars().count() < policy.min_length {
        errors.push(format!(
            "Passwords must be at least {} characters.",
            policy.min_length
        ));
    }

    if policy.require_non_alphanumeric && password.chars().all(char::is_alphanumeric) {
        errors.push("Passwords must have at least one non alphanumeric character.".to_string());
    }

    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Passwords must have at least one digit ('0'-'9').".to_string());
    }

    if policy.require_lowercase && !password.chars().any(char::is_lowercase) {
        errors.push("Passwords must have at least one lowercase ('a'-'z').".to_string());
    }

    if policy.require_uppercase && !password.chars().any(char::is_uppercase) {
        errors.push("Passwords must have at least one uppercase ('A'-'Z').".to_string());
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        let config = SecurityConfig {
            argon2_memory_cost_kib: 64,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        };
        PasswordHasher::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = fast_hasher();
        let hash = hasher.hash("Secret123!").await.unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("Secret123!", &hash).await.unwrap());
        assert!(!hasher.verify("secret123!", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_rejects_garbage_hash() {
        assert!(fast_hasher().verify("x", "not-a-hash").await.is_err());
    }

    #[test]
    fn test_password_rules() {
        let policy = PasswordPolicyConfig::default();

        assert!(validate_password(&policy, "Secret123!").is_ok());

        let errors = validate_password(&policy, "short").unwrap_err();
        assert_eq!(errors.len(), 4);

        let errors = validate_password(&policy, "alllowercase1!").unwrap_err();
        assert_eq!(errors, vec!["Passwords must have at least one uppercase ('A'-'Z').".to_string()]);
    }

    #[test]
    fn test_relaxed_policy() {
        let policy = PasswordPolicyConfig {
            min_length: 4,
            require_digit: false,
            require_lowercase: false,
            require_uppercase: false,
            require_non_alphanumeric: false,
        };
        assert!(validate_password(&policy, "abcd").is_ok());
        assert!(validate_password(&policy, "abc").is_err());
    }
}
