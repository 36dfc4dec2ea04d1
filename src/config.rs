use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::auth::Role;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub session: SessionConfig,

    pub security: SecurityConfig,

    pub authorization: AuthorizationConfig,

    pub bootstrap: BootstrapConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/storefront.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    /// `*` allows any origin.
    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on the session cookie.
    /// Set to false for local development without HTTPS.
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 5080,
            cors_allowed_origins: vec!["*".to_string()],
            secure_cookies: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,

    /// Lifetime of an issued ticket.
    pub expire_days: i64,

    /// Re-issue the cookie once half of its lifetime has elapsed.
    pub sliding_expiration: bool,

    /// Cookie encryption key material, at least 64 bytes.
    /// When empty a random key is generated at startup and sessions do not
    /// survive a restart.
    #[serde(skip_serializing)]
    pub secret: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "ECommerceAuth".to_string(),
            expire_days: 7,
            sliding_expiration: true,
            secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,

    /// Login lockout policy.
    pub auth_throttle: AuthThrottleConfig,

    pub password: PasswordPolicyConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            auth_throttle: AuthThrottleConfig::default(),
            password: PasswordPolicyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthThrottleConfig {
    /// Consecutive failed attempts before the account is locked.
    pub max_attempts: u32,

    /// Lockout duration once max attempts is reached.
    pub lockout_seconds: u64,

    /// Trusted proxy IP addresses allowed to provide `X-Forwarded-For`.
    ///
    /// When empty, forwarded headers are ignored and the socket peer
    /// address is recorded in audit entries.
    pub trusted_proxy_ips: Vec<String>,
}

impl Default for AuthThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_seconds: 5 * 60,
            trusted_proxy_ips: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicyConfig {
    pub min_length: usize,
    pub require_digit: bool,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_non_alphanumeric: bool,
}

impl Default for PasswordPolicyConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_digit: true,
            require_lowercase: true,
            require_uppercase: true,
            require_non_alphanumeric: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Named policies, each requiring exactly one role.
    pub policies: BTreeMap<String, String>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        let policies = [
            Role::Administrator,
            Role::ProductManager,
            Role::InventoryManager,
            Role::CustomerSupport,
            Role::FinanceTeam,
            Role::DeliveryTeam,
            Role::AuditTeam,
        ]
        .into_iter()
        .map(|role| (format!("Require{}Role", role.as_str()), role.as_str().to_string()))
        .collect();

        Self { policies }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Seed an administrator on startup when none exists.
    pub enabled: bool,

    pub admin_email: String,

    #[serde(skip_serializing)]
    pub admin_password: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            admin_email: "admin@example.com".to_string(),
            admin_password: "Admin123!".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("storefront-gate").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".storefront-gate").join("config.toml"));
        }

        paths
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.cookie_name.is_empty() {
            anyhow::bail!("Session cookie name cannot be empty");
        }

        if self.session.expire_days <= 0 {
            anyhow::bail!("Session expire_days must be > 0");
        }

        if !self.session.secret.is_empty() && self.session.secret.len() < 64 {
            anyhow::bail!("Session secret must be at least 64 bytes");
        }

        if self.security.auth_throttle.max_attempts == 0 {
            anyhow::bail!("auth_throttle.max_attempts must be > 0");
        }

        for (name, role) in &self.authorization.policies {
            if role.parse::<Role>().is_err() {
                anyhow::bail!("Policy '{name}' requires unknown role '{role}'");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.cookie_name, "ECommerceAuth");
        assert_eq!(config.session.expire_days, 7);
        assert!(config.session.sliding_expiration);
        assert_eq!(config.security.auth_throttle.max_attempts, 5);
        assert_eq!(
            config.authorization.policies.get("RequireFinanceTeamRole"),
            Some(&"FinanceTeam".to_string())
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("[authorization.policies]"));
        assert!(!toml_str.contains("admin_password"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [security.auth_throttle]
            max_attempts = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.security.auth_throttle.max_attempts, 3);
        assert_eq!(config.security.auth_throttle.lockout_seconds, 300);
        assert_eq!(config.session.cookie_name, "ECommerceAuth");
    }

    #[test]
    fn test_policy_with_unknown_role_is_rejected() {
        let mut config = Config::default();
        config
            .authorization
            .policies
            .insert("RequireWizardRole".to_string(), "Wizard".to_string());

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Wizard"));
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let mut config = Config::default();
        config.session.secret = "too-short".to_string();
        assert!(config.validate().is_err());
    }
}
