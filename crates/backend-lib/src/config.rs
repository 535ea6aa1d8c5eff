// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default config file looked up next to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "roulette.toml";

/// Prefix for environment overrides, nested keys split on `__`
pub const ENV_PREFIX: &str = "ROULETTE_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    pub matching: MatchingSettings,
    pub cleanup: CleanupSettings,
    pub chat: ChatSettings,
    pub identity: IdentitySettings,
}

/// Partner selection and event dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingSettings {
    /// Largest accepted age difference between partners
    pub max_age_gap: u32,
    /// Number of per-uid worker partitions
    pub partitions: usize,
    /// Capacity of the queue change broadcast
    pub event_buffer: usize,
}

/// Stale queue entry eviction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSettings {
    pub interval_secs: u64,
    pub queue_ttl_secs: u64,
}

/// Where a fresh match's chat lives at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Temporary,
    Permanent,
}

/// What `endMatch` does with the chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndMatchPolicy {
    /// Delete the session if it is still temporary
    Discard,
    /// Keep the session; deletion is an explicit `deleteChat`
    Retain,
}

/// Chat session behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    pub initial_mode: SessionMode,
    pub end_policy: EndMatchPolicy,
    /// Copy age, gender and interests into matches and sessions
    pub denormalize_profile: bool,
}

/// Anonymous bearer tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySettings {
    pub token_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            log_json: false,
            matching: MatchingSettings::default(),
            cleanup: CleanupSettings::default(),
            chat: ChatSettings::default(),
            identity: IdentitySettings::default(),
        }
    }
}

/// Upper bound for any TTL setting: ten years
pub const MAX_TTL_SECS: u64 = 60 * 60 * 24 * 365 * 10;

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            max_age_gap: 10,
            partitions: 8,
            event_buffer: 1024,
        }
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,  // hourly
            queue_ttl_secs: 60 * 60, // 1 hour
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            initial_mode: SessionMode::Temporary,
            end_policy: EndMatchPolicy::Discard,
            denormalize_profile: false,
        }
    }
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            token_ttl_secs: 60 * 60 * 24 * 7, // 7 days
        }
    }
}

impl CleanupSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn queue_ttl(&self) -> chrono::TimeDelta {
        i64::try_from(self.queue_ttl_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

impl IdentitySettings {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

impl Settings {
    /// Load from `roulette.toml` (if present) and `ROULETTE_*` variables
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from an explicit TOML file, environment still takes precedence
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            bail!("unknown log level `{}`", self.log_level);
        }
        if self.matching.partitions == 0 {
            bail!("matching.partitions must be at least 1");
        }
        if self.matching.event_buffer == 0 {
            bail!("matching.event_buffer must be at least 1");
        }
        if self.cleanup.interval_secs == 0 {
            bail!("cleanup.interval_secs must be positive");
        }
        if self.cleanup.queue_ttl_secs == 0 || self.cleanup.queue_ttl_secs > MAX_TTL_SECS {
            bail!("cleanup.queue_ttl_secs must be between 1 and {MAX_TTL_SECS}");
        }
        if self.identity.token_ttl_secs == 0 || self.identity.token_ttl_secs > MAX_TTL_SECS {
            bail!("identity.token_ttl_secs must be between 1 and {MAX_TTL_SECS}");
        }
        Ok(())
    }
}
