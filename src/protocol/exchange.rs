/// The three device exchanges: connect, fetch-config and upload-readings
///
/// Every request body is a frame under the key of the device named in the
/// request path, and every reply is encrypted under that same key. Exchanges
/// are independent; the only shared mutable resource is the reading store.
use log::{debug, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{DeviceDirectory, OperationalSettings, UnknownSensorPolicy};
use crate::database::{ReadingStore, StoreError};
use crate::models::{ConvertedReading, Data, Device, RawReading};
use crate::protocol::frame::{self, FrameError};
use crate::sensors::SensorRegistry;
use crate::utils::Clock;

/// Semantic type recorded for codes missing from the sensor registry
pub const UNKNOWN_SENSOR_TYPE: &str = "unknown";

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("unknown device {0}")]
    UnknownDevice(String),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("malformed batch: {0}")]
    MalformedBatch(#[from] serde_json::Error),

    #[error("failed to store reading: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of storing one uploaded batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub stored: usize,
    pub untyped: usize,
    pub skipped: usize,
}

pub struct Gateway {
    devices: DeviceDirectory,
    registry: SensorRegistry,
    settings: OperationalSettings,
    store: ReadingStore,
    clock: Arc<dyn Clock>,
    unknown_sensor_policy: UnknownSensorPolicy,
    last_config_change: i64,
}

impl Gateway {
    /// The configuration is considered changed at construction time
    pub fn new(
        devices: DeviceDirectory,
        settings: OperationalSettings,
        store: ReadingStore,
        clock: Arc<dyn Clock>,
        unknown_sensor_policy: UnknownSensorPolicy,
    ) -> Self {
        let last_config_change = clock.unix_now();
        Self {
            devices,
            registry: SensorRegistry::builtin(),
            settings,
            store,
            clock,
            unknown_sensor_policy,
            last_config_change,
        }
    }

    pub fn last_config_change(&self) -> i64 {
        self.last_config_change
    }

    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    fn device(&self, mac_address: &str) -> Result<&Device, ExchangeError> {
        self.devices
            .lookup(mac_address)
            .ok_or_else(|| ExchangeError::UnknownDevice(mac_address.to_string()))
    }

    /// `current_time=<unix>&last_config_change=<unix>`
    pub fn status_reply(&self) -> String {
        format!(
            "current_time={}&last_config_change={}",
            self.clock.unix_now(),
            self.last_config_change
        )
    }

    /// Operational constants followed by every sensor in ascending code order
    pub fn config_reply(&self) -> String {
        let settings = &self.settings;
        let mut parts = vec![
            format!("current_time={}", self.clock.unix_now()),
            format!("transmit_interval={}", settings.transmit_interval),
            format!("transmit_app_led={}", u8::from(settings.transmit_app_led)),
            format!("sensor_app_led={}", u8::from(settings.sensor_app_led)),
            format!("day_threshold={:?}", settings.day_threshold),
        ];

        for sensor in self.registry.list_all() {
            parts.push(format!(
                "sensor_enabled[{}]={}",
                sensor.code,
                u8::from(sensor.enabled)
            ));
            if sensor.polling_interval > 0 {
                parts.push(format!(
                    "sensor_polling_interval[{}]={}",
                    sensor.code, sensor.polling_interval
                ));
            }
        }

        parts.join("&")
    }

    /// Resolve a raw reading against the registry and the device calibration
    ///
    /// Unknown codes follow the configured policy: stored untyped with the raw
    /// value, or dropped (`None`).
    pub fn convert(&self, device: &Device, reading: &RawReading) -> Option<ConvertedReading> {
        match self.registry.lookup(reading.code) {
            Some(sensor) => Some(ConvertedReading {
                timestamp: reading.timestamp,
                code: reading.code,
                sensor_type: sensor.sensor_type.as_str(),
                raw_value: reading.value,
                converted_value: sensor.conversion.apply(reading.value, &device.calibration),
            }),
            None => match self.unknown_sensor_policy {
                UnknownSensorPolicy::Store => Some(ConvertedReading {
                    timestamp: reading.timestamp,
                    code: reading.code,
                    sensor_type: UNKNOWN_SENSOR_TYPE,
                    raw_value: reading.value,
                    converted_value: reading.value,
                }),
                UnknownSensorPolicy::Skip => None,
            },
        }
    }

    /// Handshake; the decrypted body carries nothing the gateway uses
    pub fn connect(&self, mac_address: &str, body: &[u8]) -> Result<Vec<u8>, ExchangeError> {
        let device = self.device(mac_address)?;
        let _handshake = frame::decrypt(&device.key, body)?;

        let reply = self.status_reply();
        debug!("connect {}: {}", mac_address, reply);
        Ok(frame::encrypt(&device.key, reply.as_bytes())?)
    }

    pub fn fetch_config(&self, mac_address: &str, body: &[u8]) -> Result<Vec<u8>, ExchangeError> {
        let device = self.device(mac_address)?;
        let _request = frame::decrypt(&device.key, body)?;

        let reply = self.config_reply();
        debug!("config {}: {}", mac_address, reply);
        Ok(frame::encrypt(&device.key, reply.as_bytes())?)
    }

    /// Decrypt and parse a batch, then store every reading in order
    ///
    /// The batch is parsed completely before anything is stored, so a
    /// malformed record rejects the whole upload and leaves earlier uploads
    /// untouched.
    pub async fn upload_readings(
        &self,
        mac_address: &str,
        body: &[u8],
    ) -> Result<(Vec<u8>, UploadSummary), ExchangeError> {
        let device = self.device(mac_address)?;
        let plaintext = frame::decrypt(&device.key, body)?;
        let data = parse_batch(&plaintext)?;

        let mut summary = UploadSummary::default();
        for raw in &data.readings {
            match self.convert(device, raw) {
                Some(reading) => {
                    if reading.sensor_type == UNKNOWN_SENSOR_TYPE {
                        warn!(
                            "{}: unknown sensor code {}, storing raw value untyped",
                            mac_address, raw.code
                        );
                        summary.untyped += 1;
                    }
                    self.store.write_reading(device, &reading).await?;
                    summary.stored += 1;
                }
                None => {
                    warn!("{}: unknown sensor code {}, skipped", mac_address, raw.code);
                    summary.skipped += 1;
                }
            }
        }

        debug!(
            "readings {}: batch at {} stored {} ({} untyped), skipped {}",
            mac_address, data.timestamp, summary.stored, summary.untyped, summary.skipped
        );

        let reply = self.status_reply();
        Ok((frame::encrypt(&device.key, reply.as_bytes())?, summary))
    }
}

/// Parse `{"timestamp": .., "readings": [[ts, code, value], ..]}`
pub fn parse_batch(plaintext: &[u8]) -> Result<Data, ExchangeError> {
    Ok(serde_json::from_slice(plaintext)?)
}
