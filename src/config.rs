use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub limits: SafetyLimits,
    pub store: StoreConfig,
    pub placement_retry_max: Duration,
}

/// Bounds that only trip on corrupt or runaway graph data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyLimits {
    pub placement_visit_limit: usize,
    pub ancestor_depth_limit: usize,
    pub tree_max_depth: u32,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            placement_visit_limit: 50_000,
            ancestor_depth_limit: 50_000,
            tree_max_depth: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub transaction_mode: TransactionMode,
    pub transaction_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            transaction_mode: TransactionMode::Auto,
            transaction_timeout: Duration::from_millis(5_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Probe the backend once and use transactions if it supports them.
    Auto,
    /// Refuse to start unless the backend supports transactions.
    Required,
    /// Run every unit of work sequentially without a transaction.
    Disabled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let defaults = SafetyLimits::default();
        let limits = SafetyLimits {
            placement_visit_limit: positive_from_map(
                &env_map,
                "PLACEMENT_VISIT_LIMIT",
                defaults.placement_visit_limit,
            )?,
            ancestor_depth_limit: positive_from_map(
                &env_map,
                "ANCESTOR_DEPTH_LIMIT",
                defaults.ancestor_depth_limit,
            )?,
            tree_max_depth: positive_from_map(&env_map, "TREE_MAX_DEPTH", defaults.tree_max_depth)?,
        };

        let transaction_mode = match env_map
            .get("TRANSACTION_MODE")
            .map(|s| s.as_str())
            .unwrap_or("auto")
        {
            "auto" => TransactionMode::Auto,
            "required" => TransactionMode::Required,
            "disabled" => TransactionMode::Disabled,
            other => {
                return Err(ConfigError::InvalidValue(
                    "TRANSACTION_MODE".to_string(),
                    format!("must be auto, required, or disabled, got {}", other),
                ))
            }
        };

        let transaction_timeout = Duration::from_millis(positive_from_map(
            &env_map,
            "TRANSACTION_TIMEOUT_MS",
            5_000u64,
        )?);

        let placement_retry_max = Duration::from_millis(positive_from_map(
            &env_map,
            "PLACEMENT_RETRY_MAX_MS",
            2_000u64,
        )?);

        Ok(Config {
            port,
            database_path,
            limits,
            store: StoreConfig {
                transaction_mode,
                transaction_timeout,
            },
            placement_retry_max,
        })
    }
}

/// Read an optional numeric key that must be strictly positive.
fn positive_from_map<T>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = env_map.get(key) else {
        return Ok(default);
    };
    let value = raw.trim().parse::<T>().map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), format!("must be a number, got {}", raw))
    })?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}
