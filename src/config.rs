use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

use crate::registry::{Address, ScoringPolicy};

/// Configuration for the audit registry service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Registry configuration
    pub registry: RegistryConfig,
    /// Reputation weights
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Enable API key authentication
    pub enable_auth: bool,
    /// Accepted API keys
    #[serde(skip_serializing)]
    pub api_keys: Vec<String>,
    /// Rate limit per minute per IP
    pub rate_limit_per_minute: u32,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    #[serde(skip_serializing)]
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, state lives in memory only)
    pub postgres_enabled: bool,
    /// Connection pool size
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Mask client addresses and keys in logs
    pub sanitize_logs: bool,
    /// Enable request/response logging
    pub log_requests: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry administrator address (required)
    pub administrator: String,
    /// Capacity of the notification channel
    pub event_buffer: usize,
    /// Upper bound on journal entries returned per request
    pub journal_page_limit: usize,
}

/// Reputation weights, see `ScoringPolicy`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub audit_weight: u32,
    pub finding_weight: u32,
    pub verified_bonus: u32,
    pub critical_allowance_per_audit: u32,
    pub critical_penalty: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let policy = ScoringPolicy::default();
        Self {
            audit_weight: policy.audit_weight,
            finding_weight: policy.finding_weight,
            verified_bonus: policy.verified_bonus,
            critical_allowance_per_audit: policy.critical_allowance_per_audit,
            critical_penalty: policy.critical_penalty,
        }
    }
}

impl ScoringConfig {
    /// Convert to the policy used by the auditor registry
    pub fn to_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            audit_weight: self.audit_weight,
            finding_weight: self.finding_weight,
            verified_bonus: self.verified_bonus,
            critical_allowance_per_audit: self.critical_allowance_per_audit,
            critical_penalty: self.critical_penalty,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/audit_vault".to_string(),
            postgres_enabled: false,
            max_connections: 10,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            administrator: String::new(), // Must be set via environment
            event_buffer: 1024,
            journal_page_limit: 500,
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8780,
            },
            security: SecurityConfig {
                enable_auth: true,
                api_keys: Vec::new(),
                rate_limit_per_minute: 120,
                max_request_size: 256 * 1024, // 256KB
            },
            database: DatabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                sanitize_logs: true,
                log_requests: false,
            },
            registry: RegistryConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

/// Parse `name` from the environment into `target` if set
fn parse_env<T>(name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Ok(raw) = env::var(name) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value", name))?;
    }
    Ok(())
}

impl VaultConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Ok(host) = env::var("AUDITVAULT_HOST") {
            config.server.host = host;
        }
        parse_env("AUDITVAULT_PORT", &mut config.server.port)?;

        // Security configuration
        parse_env("AUDITVAULT_ENABLE_AUTH", &mut config.security.enable_auth)?;
        if let Ok(keys) = env::var("AUDITVAULT_API_KEYS") {
            config.security.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string)
                .collect();
        }
        parse_env(
            "AUDITVAULT_RATE_LIMIT_PER_MINUTE",
            &mut config.security.rate_limit_per_minute,
        )?;
        parse_env(
            "AUDITVAULT_MAX_REQUEST_SIZE",
            &mut config.security.max_request_size,
        )?;

        // Database configuration
        if let Ok(url) = env::var("AUDITVAULT_POSTGRES_URL") {
            config.database.postgres_url = url;
        }
        parse_env(
            "AUDITVAULT_POSTGRES_ENABLED",
            &mut config.database.postgres_enabled,
        )?;
        parse_env(
            "AUDITVAULT_POSTGRES_MAX_CONNECTIONS",
            &mut config.database.max_connections,
        )?;

        // Logging configuration
        if let Ok(level) = env::var("AUDITVAULT_LOG_LEVEL") {
            config.logging.level = level;
        }
        parse_env("AUDITVAULT_SANITIZE_LOGS", &mut config.logging.sanitize_logs)?;
        parse_env("AUDITVAULT_LOG_REQUESTS", &mut config.logging.log_requests)?;

        // Registry configuration
        config.registry.administrator = env::var("AUDITVAULT_ADMINISTRATOR")
            .context("AUDITVAULT_ADMINISTRATOR environment variable is required")?;
        parse_env("AUDITVAULT_EVENT_BUFFER", &mut config.registry.event_buffer)?;
        parse_env(
            "AUDITVAULT_JOURNAL_PAGE_LIMIT",
            &mut config.registry.journal_page_limit,
        )?;

        // Scoring configuration
        parse_env("AUDITVAULT_SCORE_AUDIT_WEIGHT", &mut config.scoring.audit_weight)?;
        parse_env(
            "AUDITVAULT_SCORE_FINDING_WEIGHT",
            &mut config.scoring.finding_weight,
        )?;
        parse_env(
            "AUDITVAULT_SCORE_VERIFIED_BONUS",
            &mut config.scoring.verified_bonus,
        )?;
        parse_env(
            "AUDITVAULT_SCORE_CRITICAL_ALLOWANCE",
            &mut config.scoring.critical_allowance_per_audit,
        )?;
        parse_env(
            "AUDITVAULT_SCORE_CRITICAL_PENALTY",
            &mut config.scoring.critical_penalty,
        )?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for security and consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.security.enable_auth {
            if self.security.api_keys.is_empty() {
                return Err(anyhow::anyhow!(
                    "Authentication is enabled but no API keys are configured (AUDITVAULT_API_KEYS)"
                ));
            }
            if let Some(key) = self.security.api_keys.iter().find(|key| key.len() < 32) {
                return Err(anyhow::anyhow!(
                    "API key {} is too short (minimum 32 characters for security)",
                    sanitize_for_logging(key)
                ));
            }
        } else {
            warn!("API authentication disabled - every client may submit commands");
        }

        if self.security.rate_limit_per_minute == 0 {
            return Err(anyhow::anyhow!("Rate limit must be non-zero"));
        }

        if self.database.postgres_enabled {
            if self.database.postgres_url.is_empty() {
                return Err(anyhow::anyhow!(
                    "PostgreSQL is enabled but no connection string is configured"
                ));
            }
            if self.database.max_connections == 0 {
                return Err(anyhow::anyhow!("PostgreSQL pool size must be non-zero"));
            }
        }

        self.administrator()?;

        if self.registry.event_buffer == 0 {
            return Err(anyhow::anyhow!("Event buffer must be non-zero"));
        }

        self.scoring
            .to_policy()
            .validate()
            .context("Invalid scoring weights")?;

        Ok(())
    }

    /// Parsed administrator address
    pub fn administrator(&self) -> Result<Address> {
        Address::parse(&self.registry.administrator).with_context(|| {
            format!(
                "Invalid administrator address: {}",
                sanitize_for_logging(&self.registry.administrator)
            )
        })
    }
}

/// Sanitize sensitive data for logging
///
/// Lengths and cut points count characters, not bytes.
pub fn sanitize_for_logging(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    let keep = match chars.len() {
        n if n > 20 => 6,
        n if n > 4 => 2,
        n => return "*".repeat(n),
    };
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();
    format!("{}***{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> VaultConfig {
        let mut config = VaultConfig::default();
        config.security.api_keys = vec!["testApiKey1234567890abcdefghijklm".to_string()];
        config.registry.administrator = "0x00000000000000000000000000000000000000A1".to_string();
        config
    }

    #[test]
    fn test_sanitize_for_logging() {
        assert_eq!(sanitize_for_logging("my_authenticator_123"), "my***23");
        assert_eq!(
            sanitize_for_logging("testApiKey1234567890abcdefghijklm"),
            "testAp***hijklm"
        );
        assert_eq!(sanitize_for_logging("abc"), "***");
        assert_eq!(sanitize_for_logging("postgres://é@db:5432/registry"), "postgr***gistry");
        assert_eq!(sanitize_for_logging("ключ-доступа"), "кл***па");
        assert_eq!(sanitize_for_logging("ééééé"), "éé***éé");
        assert_eq!(sanitize_for_logging("éé"), "**");
    }

    #[test]
    fn test_config_validation() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.administrator().unwrap().as_str(),
            "0x00000000000000000000000000000000000000a1"
        );
    }

    #[test]
    fn test_missing_administrator_rejected() {
        let mut config = valid_config();
        config.registry.administrator = String::new();
        assert!(config.validate().is_err());

        config.registry.administrator = "0x1234".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_requires_strong_keys() {
        let mut config = valid_config();
        config.security.api_keys = vec!["short".to_string()];
        assert!(config.validate().is_err());

        config.security.api_keys.clear();
        assert!(config.validate().is_err());

        config.security.enable_auth = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scoring_weights_validated() {
        let mut config = valid_config();
        config.scoring.critical_penalty = config.scoring.finding_weight + 1;
        assert!(config.validate().is_err());

        let policy = valid_config().scoring.to_policy();
        assert_eq!(policy, ScoringPolicy::default());
    }
}
