use crate::engine::{PricingCatalog, SuspensionCharging};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const MAX_AMOUNT_SCALE: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    /// Contracts processed concurrently.
    pub worker_count: usize,
    /// Contract ids per port query.
    pub chunk_size: usize,
    /// Decimal places of final charge amounts.
    pub amount_scale: u32,
    /// Default share of the monthly fee charged while suspended.
    pub suspended_charge_rate: Decimal,
    /// Upper bound on retrying a transiently unavailable port.
    pub port_retry_max_elapsed: Duration,
    pub log_level: String,
    pub pricing_catalog_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            worker_count: 8,
            chunk_size: 100,
            amount_scale: 2,
            suspended_charge_rate: Decimal::ZERO,
            port_retry_max_elapsed: Duration::from_millis(10_000),
            log_level: "info".to_string(),
            pricing_catalog_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let worker_count = parse_or(&env_map, "WORKER_COUNT", "8", "must be a valid usize")?;
        if worker_count == 0 {
            return Err(ConfigError::InvalidValue(
                "WORKER_COUNT".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        let chunk_size = parse_or(&env_map, "CHUNK_SIZE", "100", "must be a valid usize")?;
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "CHUNK_SIZE".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        let amount_scale: u32 = parse_or(&env_map, "AMOUNT_SCALE", "2", "must be a valid u32")?;
        if amount_scale > MAX_AMOUNT_SCALE {
            return Err(ConfigError::InvalidValue(
                "AMOUNT_SCALE".to_string(),
                format!("must be at most {}, got {}", MAX_AMOUNT_SCALE, amount_scale),
            ));
        }

        let suspended_charge_rate: Decimal = parse_or(
            &env_map,
            "SUSPENDED_CHARGE_RATE",
            "0",
            "must be a decimal number",
        )?;
        if suspended_charge_rate < Decimal::ZERO || suspended_charge_rate > Decimal::ONE {
            return Err(ConfigError::InvalidValue(
                "SUSPENDED_CHARGE_RATE".to_string(),
                format!("must be between 0 and 1, got {}", suspended_charge_rate),
            ));
        }

        let retry_ms: u64 = parse_or(
            &env_map,
            "PORT_RETRY_MAX_ELAPSED_MS",
            "10000",
            "must be a valid u64",
        )?;

        let log_level = env_map
            .get("LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| "info".to_string());

        let pricing_catalog_path = env_map.get("PRICING_CATALOG_PATH").map(PathBuf::from);

        Ok(Config {
            worker_count,
            chunk_size,
            amount_scale,
            suspended_charge_rate,
            port_retry_max_elapsed: Duration::from_millis(retry_ms),
            log_level,
            pricing_catalog_path,
        })
    }

    pub fn suspension_charging(&self) -> SuspensionCharging {
        SuspensionCharging::from_rate(self.suspended_charge_rate)
    }

    /// Load the pricing catalog named by `PRICING_CATALOG_PATH`, with the
    /// configured suspension charging as its default.
    pub fn load_pricing_catalog(&self) -> Result<PricingCatalog, ConfigError> {
        let path = self
            .pricing_catalog_path
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnv("PRICING_CATALOG_PATH".to_string()))?;

        let json = std::fs::read_to_string(path).map_err(|_| {
            ConfigError::InvalidValue(
                "PRICING_CATALOG_PATH".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        let catalog = PricingCatalog::from_json_str(&json).map_err(|e| {
            ConfigError::InvalidValue("PRICING_CATALOG_PATH".to_string(), e.to_string())
        })?;

        Ok(catalog.with_default_suspension_charging(self.suspension_charging()))
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), expected.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expect_invalid(pairs: &[(&str, &str)], key: &str) {
        match Config::from_env_map(env(pairs)) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, key),
            other => panic!("Expected InvalidValue error, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(HashMap::new()).unwrap();
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.amount_scale, 2);
        assert_eq!(config.suspended_charge_rate, Decimal::ZERO);
        assert_eq!(config.port_retry_max_elapsed, Duration::from_millis(10_000));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.suspension_charging(), SuspensionCharging::Excluded);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_env_map(env(&[
            ("WORKER_COUNT", "2"),
            ("CHUNK_SIZE", "10"),
            ("AMOUNT_SCALE", "0"),
            ("SUSPENDED_CHARGE_RATE", "0.5"),
            ("PORT_RETRY_MAX_ELAPSED_MS", "0"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.amount_scale, 0);
        assert_eq!(
            config.suspension_charging(),
            SuspensionCharging::Reduced {
                rate: Decimal::new(5, 1)
            }
        );
        assert_eq!(config.port_retry_max_elapsed, Duration::ZERO);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_worker_count() {
        expect_invalid(&[("WORKER_COUNT", "0")], "WORKER_COUNT");
        expect_invalid(&[("WORKER_COUNT", "many")], "WORKER_COUNT");
    }

    #[test]
    fn test_invalid_chunk_size() {
        expect_invalid(&[("CHUNK_SIZE", "0")], "CHUNK_SIZE");
    }

    #[test]
    fn test_invalid_amount_scale() {
        expect_invalid(&[("AMOUNT_SCALE", "11")], "AMOUNT_SCALE");
    }

    #[test]
    fn test_invalid_suspended_charge_rate() {
        expect_invalid(&[("SUSPENDED_CHARGE_RATE", "1.5")], "SUSPENDED_CHARGE_RATE");
        expect_invalid(&[("SUSPENDED_CHARGE_RATE", "-0.1")], "SUSPENDED_CHARGE_RATE");
    }

    #[test]
    fn test_missing_pricing_catalog_path() {
        let config = Config::default();
        match config.load_pricing_catalog() {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "PRICING_CATALOG_PATH"),
            other => panic!("Expected MissingEnv error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_pricing_catalog_applies_configured_rate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"products": {{"BASE": [{{"policy": {{"type": "flat", "charge_name": "MONTHLY_FEE", "price": "300"}}}}]}}}}"#
        )
        .unwrap();

        let config = Config::from_env_map(env(&[
            ("SUSPENDED_CHARGE_RATE", "1"),
            ("PRICING_CATALOG_PATH", file.path().to_str().unwrap()),
        ]))
        .unwrap();
        let catalog = config.load_pricing_catalog().unwrap();
        assert_eq!(catalog.default_suspension_charging, SuspensionCharging::Full);
        assert_eq!(catalog.products.len(), 1);
    }
}
