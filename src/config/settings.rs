//! Application settings loaded from config.toml
//!
//! Every field has a default, so a missing file or a partial file still yields a
//! usable configuration. Environment variables (`DATABASE_URL`, `BIND_ADDRESS`)
//! override the file for deployment-specific values.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SeaORM connection string
    pub database_url: String,
    /// Address the HTTP API listens on
    pub bind_address: String,
    /// Upper bound on acquiring a pooled connection, in seconds
    pub db_timeout_secs: u64,
    /// Inventory enumerations
    pub inventory: InventoryConfig,
    /// Warranty duration policy
    pub warranty: WarrantyConfig,
    /// Public endpoint throttling
    pub rate_limit: RateLimitConfig,
    /// Bill artifact storage
    pub bills: BillsConfig,
    /// Analytics scan bounds
    pub analytics: AnalyticsConfig,
}

/// Enumerated sets units are validated against.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Product type stamped on new units when none is given
    pub product_type: String,
    /// Allowed capacity labels
    pub capacities: Vec<String>,
    /// Capacity given to units created by a public registration
    pub placeholder_capacity: String,
    /// Allowed sales channels, lowercase
    pub platforms: Vec<String>,
}

/// Warranty duration policy.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WarrantyConfig {
    /// Duration applied when the caller omits one
    pub default_duration_months: u32,
    /// Inclusive upper bound for any duration
    pub max_duration_months: u32,
}

/// Which counter store backs the public rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// Counters persisted in the `rate_limits` table
    Database,
    /// Counters kept in process memory
    Memory,
}

/// Fixed-window limiter settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in seconds
    pub window_secs: u64,
    /// Attempts allowed per window and caller
    pub max_attempts: u32,
    /// Counter store
    pub backend: RateLimitBackend,
}

/// Bill artifact storage settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BillsConfig {
    /// Directory bill files are written to
    pub storage_dir: PathBuf,
    /// Largest accepted upload in bytes
    pub max_bytes: usize,
}

/// Analytics scan bounds.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Maximum filtered units read per dashboard run
    pub unit_scan_limit: u64,
    /// Maximum returns and inquiries read per dashboard run
    pub archive_window: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/disk_ledger.sqlite?mode=rwc".to_string(),
            bind_address: "0.0.0.0:3100".to_string(),
            db_timeout_secs: 10,
            inventory: InventoryConfig::default(),
            warranty: WarrantyConfig::default(),
            rate_limit: RateLimitConfig::default(),
            bills: BillsConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            product_type: "Disk".to_string(),
            capacities: vec!["320".into(), "512".into(), "1024".into()],
            placeholder_capacity: "512".to_string(),
            platforms: [
                "amazon", "flipkart", "myntra", "snapdeal", "paytm", "offline", "other",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

impl Default for WarrantyConfig {
    fn default() -> Self {
        Self {
            default_duration_months: 12,
            max_duration_months: 60,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 15 * 60,
            max_attempts: 10,
            backend: RateLimitBackend::Database,
        }
    }
}

impl Default for BillsConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("files/bills"),
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            unit_scan_limit: 5000,
            archive_window: 1000,
        }
    }
}

impl InventoryConfig {
    /// Returns the canonical (lowercase) platform name if it is supported.
    #[must_use]
    pub fn normalize_platform(&self, platform: &str) -> Option<String> {
        let wanted = platform.trim().to_lowercase();
        self.platforms.iter().find(|p| **p == wanted).cloned()
    }

    /// Whether the capacity label is one of the configured values.
    #[must_use]
    pub fn is_known_capacity(&self, capacity: &str) -> bool {
        self.capacities.iter().any(|c| c == capacity)
    }
}

impl AppConfig {
    /// Applies environment overrides and normalises enumerations.
    fn finish(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            self.bind_address = addr;
        }
        self.inventory.platforms = self
            .inventory
            .platforms
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        self.inventory.capacities = self
            .inventory
            .capacities
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.inventory.capacities.is_empty() {
            return Err(Error::Config {
                message: "inventory.capacities must not be empty".to_string(),
            });
        }
        if self.inventory.platforms.is_empty() {
            return Err(Error::Config {
                message: "inventory.platforms must not be empty".to_string(),
            });
        }
        if !self
            .inventory
            .is_known_capacity(&self.inventory.placeholder_capacity)
        {
            return Err(Error::Config {
                message: format!(
                    "inventory.placeholder_capacity '{}' is not one of the configured capacities",
                    self.inventory.placeholder_capacity
                ),
            });
        }
        if self.warranty.max_duration_months == 0
            || self.warranty.default_duration_months == 0
            || self.warranty.default_duration_months > self.warranty.max_duration_months
        {
            return Err(Error::Config {
                message: "warranty durations must satisfy 0 < default <= max".to_string(),
            });
        }
        Ok(())
    }
}

/// Parses configuration from a TOML string.
///
/// # Errors
/// Returns an error if the TOML syntax is invalid or a value fails validation.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.finish()
}

/// Loads configuration from a TOML file.
///
/// A missing file is not an error: defaults (plus environment overrides) are used.
///
/// # Errors
/// Returns an error if:
/// - The file exists but cannot be read
/// - The TOML syntax is invalid
/// - A value fails validation
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!("No config file at {}, using defaults", path.display());
        return AppConfig::default().finish();
    }
    tracing::debug!("Loading configuration from {}", path.display());
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;
    parse_config(&contents)
}

/// Loads configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<AppConfig> {
    load_config("config.toml")
}
