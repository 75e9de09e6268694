use log::debug;
use std::env;

use crate::bluetooth::permissions::Platform;
use crate::buffer::DEFAULT_SAMPLE_CAPACITY;
use crate::error::ConfigError;
use crate::models::DeviceSelection;

pub const DEFAULT_SCALE_NAME_FILTER: &str = "IF_B7";
pub const DEFAULT_PROGRESSOR_NAME: &str = "Progressor_2068";
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub device: DeviceSelection,
    pub scale_name_filter: String,
    pub progressor_name: String,
    pub sample_capacity: usize,
    pub poll_interval_ms: u64,
    pub auto_connect: bool,
    pub platform: Platform,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            device: DeviceSelection::default(),
            scale_name_filter: DEFAULT_SCALE_NAME_FILTER.to_string(),
            progressor_name: DEFAULT_PROGRESSOR_NAME.to_string(),
            sample_capacity: DEFAULT_SAMPLE_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            auto_connect: false,
            platform: Platform::Linux,
        }
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key -> value source
    ///
    /// Unset or blank keys fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = AppConfig::default();

        if let Some(value) = get("WEIGHT_DEVICE") {
            config.device = value
                .parse()
                .map_err(|reason| invalid("WEIGHT_DEVICE", &value, reason))?;
        }

        if let Some(value) = get("SCALE_NAME_FILTER") {
            config.scale_name_filter = value;
        }

        if let Some(value) = get("PROGRESSOR_NAME") {
            config.progressor_name = value;
        }

        if let Some(value) = get("SAMPLE_CAPACITY") {
            config.sample_capacity = match value.parse::<usize>() {
                Ok(0) => {
                    return Err(invalid("SAMPLE_CAPACITY", &value, "must be positive".into()))
                }
                Ok(capacity) => capacity,
                Err(e) => return Err(invalid("SAMPLE_CAPACITY", &value, e.to_string())),
            };
        }

        if let Some(value) = get("POLL_INTERVAL_MS") {
            config.poll_interval_ms = match value.parse::<u64>() {
                Ok(0) => {
                    return Err(invalid("POLL_INTERVAL_MS", &value, "must be positive".into()))
                }
                Ok(interval) => interval,
                Err(e) => return Err(invalid("POLL_INTERVAL_MS", &value, e.to_string())),
            };
        }

        if let Some(value) = get("AUTO_CONNECT") {
            config.auto_connect = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid("AUTO_CONNECT", &value, "expected a boolean".into())),
            };
        }

        if let Some(value) = get("BLE_PLATFORM") {
            config.platform = value
                .parse()
                .map_err(|reason| invalid("BLE_PLATFORM", &value, reason))?;
        }

        debug!("Loaded configuration: {:?}", config);

        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason,
    }
}
