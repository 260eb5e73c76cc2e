use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::models::{CalibrationParameters, Device};

const DEFAULT_DEVICES_CONFIG: &str = "config/config.yml";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8005";
const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid key for device {mac}: {reason}")]
    InvalidKey { mac: String, reason: String },

    #[error("invalid UNKNOWN_SENSOR_POLICY '{0}', expected 'store' or 'skip'")]
    InvalidPolicy(String),

    #[error("no devices configured in {}", .0.display())]
    NoDevices(PathBuf),
}

/// What to do with readings whose sensor code is not in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownSensorPolicy {
    /// Store under type `unknown` with the raw value unconverted
    #[default]
    Store,
    /// Drop the reading with a warning
    Skip,
}

impl FromStr for UnknownSensorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" => Ok(UnknownSensorPolicy::Store),
            "skip" => Ok(UnknownSensorPolicy::Skip),
            other => Err(ConfigError::InvalidPolicy(other.to_string())),
        }
    }
}

/// Process-level settings taken from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub devices_path: PathBuf,
    pub database_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub unknown_sensor_policy: UnknownSensorPolicy,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        let unknown_sensor_policy = match env::var("UNKNOWN_SENSOR_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => UnknownSensorPolicy::default(),
        };

        let config = GatewayConfig {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            devices_path: env::var("DEVICES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DEVICES_CONFIG)),
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            output_dir: env::var("OUTPUT_DIR").ok().map(PathBuf::from),
            unknown_sensor_policy,
        };
        debug!(
            "Devices file: {}, bind address: {}, database: {}",
            config.devices_path.display(),
            config.bind_addr,
            if config.database_url.is_some() { "configured" } else { "none" }
        );
        Ok(config)
    }
}

/// Fixed values pushed to every device in its configuration reply
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct OperationalSettings {
    pub transmit_interval: u32,
    pub transmit_app_led: bool,
    pub sensor_app_led: bool,
    pub day_threshold: f64,
}

impl Default for OperationalSettings {
    fn default() -> Self {
        Self {
            transmit_interval: 55202,
            transmit_app_led: true,
            sensor_app_led: false,
            day_threshold: 10.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OutputSection {
    directory: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct DeviceEntry {
    #[serde(default)]
    name: String,
    key: String,
    #[serde(default)]
    calibration_parameters: CalibrationParameters,
}

#[derive(Debug, Deserialize)]
struct DeviceFile {
    output: Option<OutputSection>,
    #[serde(default)]
    settings: OperationalSettings,
    #[serde(default)]
    devices: HashMap<String, DeviceEntry>,
}

/// Provisioned devices keyed by MAC address, immutable after start-up
#[derive(Debug, Clone, Default)]
pub struct DeviceDirectory {
    devices: HashMap<String, Device>,
}

impl DeviceDirectory {
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|d| (d.mac_address.clone(), d))
                .collect(),
        }
    }

    pub fn lookup(&self, mac_address: &str) -> Option<&Device> {
        self.devices.get(mac_address)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Contents of the YAML device file
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub directory: DeviceDirectory,
    pub settings: OperationalSettings,
    pub output_dir: Option<PathBuf>,
}

fn decode_key(mac: &str, key: &str) -> Result<Vec<u8>, ConfigError> {
    let bytes = hex::decode(key.trim()).map_err(|e| ConfigError::InvalidKey {
        mac: mac.to_string(),
        reason: e.to_string(),
    })?;
    match bytes.len() {
        16 | 24 | 32 => Ok(bytes),
        n => Err(ConfigError::InvalidKey {
            mac: mac.to_string(),
            reason: format!("{} bytes, expected 16, 24 or 32", n),
        }),
    }
}

impl DeviceConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let file: DeviceFile = serde_yaml::from_str(yaml)?;

        let mut devices = Vec::with_capacity(file.devices.len());
        for (mac, entry) in file.devices {
            let key = decode_key(&mac, &entry.key)?;
            info!("Device: {} -> {}", mac, entry.name);
            devices.push(Device {
                mac_address: mac,
                name: entry.name,
                key,
                calibration: entry.calibration_parameters,
            });
        }

        Ok(DeviceConfig {
            directory: DeviceDirectory::new(devices),
            settings: file.settings,
            output_dir: file.output.and_then(|o| o.directory),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content)?;

        if config.directory.is_empty() {
            return Err(ConfigError::NoDevices(path.to_path_buf()));
        }
        info!("Total devices loaded: {}", config.directory.len());
        Ok(config)
    }
}

/// CSV output directory: environment first, then the device file, then the default
pub fn resolve_output_dir(gateway: &GatewayConfig, devices: &DeviceConfig) -> PathBuf {
    gateway
        .output_dir
        .clone()
        .or_else(|| devices.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}
