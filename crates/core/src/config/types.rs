use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub claims: ClaimsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("bountyboard.db")
}

/// Rules the lifecycle engine applies to claims, submissions and ratings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleConfig {
    /// Minimum number of ratings before an order can complete.
    #[serde(default = "default_completion_min_ratings")]
    pub completion_min_ratings: u32,

    /// Minimum average rating (inclusive) for completion.
    #[serde(default = "default_completion_min_average")]
    pub completion_min_average: f64,

    /// Number of ratings after which a poorly rated submission is rejected.
    /// `None` disables automatic rejection.
    #[serde(default = "default_auto_reject_min_ratings")]
    pub auto_reject_min_ratings: Option<u32>,

    /// Average rating (exclusive) below which automatic rejection fires.
    #[serde(default = "default_auto_reject_below_average")]
    pub auto_reject_below_average: f64,

    /// Whether a requester may claim their own order.
    #[serde(default)]
    pub allow_self_claim: bool,

    /// Require `submitted_by` on submissions and match it against the claimant.
    #[serde(default)]
    pub enforce_submitter_identity: bool,
}

fn default_completion_min_ratings() -> u32 {
    3
}

fn default_completion_min_average() -> f64 {
    4.0
}

fn default_auto_reject_min_ratings() -> Option<u32> {
    Some(5)
}

fn default_auto_reject_below_average() -> f64 {
    2.0
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            completion_min_ratings: default_completion_min_ratings(),
            completion_min_average: default_completion_min_average(),
            auto_reject_min_ratings: default_auto_reject_min_ratings(),
            auto_reject_below_average: default_auto_reject_below_average(),
            allow_self_claim: false,
            enforce_submitter_identity: false,
        }
    }
}

/// Claim expiry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClaimsConfig {
    /// Seconds a claim may stay unsubmitted before it is released (0 = never).
    #[serde(default = "default_claim_timeout")]
    pub timeout_secs: u64,

    /// How often the sweeper looks for stale claims.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Run the background sweeper.
    #[serde(default = "default_true")]
    pub sweeper_enabled: bool,
}

/// Longest accepted claim timeout (ten years).
pub const MAX_CLAIM_TIMEOUT_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_claim_timeout() -> u64 {
    7 * 24 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_claim_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            sweeper_enabled: true,
        }
    }
}

impl ClaimsConfig {
    /// The claim timeout, or `None` when claims never expire.
    pub fn timeout(&self) -> Option<chrono::Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            i64::try_from(self.timeout_secs)
                .ok()
                .and_then(chrono::TimeDelta::try_seconds)
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Capacity of the audit event channel.
    #[serde(default = "default_audit_buffer")]
    pub buffer_size: usize,
}

fn default_audit_buffer() -> usize {
    1000
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_audit_buffer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_server_section() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "bountyboard.db");
        assert_eq!(config.lifecycle.completion_min_ratings, 3);
        assert_eq!(config.lifecycle.completion_min_average, 4.0);
        assert_eq!(config.lifecycle.auto_reject_min_ratings, Some(5));
        assert!(!config.lifecycle.allow_self_claim);
        assert_eq!(config.audit.buffer_size, 1000);
    }

    #[test]
    fn test_deserialize_lifecycle_overrides() {
        let toml = r#"
[lifecycle]
completion_min_ratings = 5
completion_min_average = 4.5
allow_self_claim = true
enforce_submitter_identity = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.lifecycle.completion_min_ratings, 5);
        assert_eq!(config.lifecycle.completion_min_average, 4.5);
        assert!(config.lifecycle.allow_self_claim);
        assert!(config.lifecycle.enforce_submitter_identity);
        // untouched keys keep their defaults
        assert_eq!(config.lifecycle.auto_reject_below_average, 2.0);
    }

    #[test]
    fn test_deserialize_with_custom_database_path() {
        let toml = r#"
[database]
path = "/data/orders.sqlite"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "/data/orders.sqlite");
    }

    #[test]
    fn test_claim_timeout_zero_disables_expiry() {
        let claims = ClaimsConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(claims.timeout().is_none());

        let claims = ClaimsConfig::default();
        assert_eq!(claims.timeout(), Some(chrono::Duration::days(7)));
    }

    #[test]
    fn test_claim_timeout_out_of_range_is_none() {
        let claims = ClaimsConfig {
            timeout_secs: 9_300_000_000_000_000,
            ..Default::default()
        };
        assert!(claims.timeout().is_none());

        let claims = ClaimsConfig {
            timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert!(claims.timeout().is_none());
    }
}
