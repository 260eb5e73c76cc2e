use serde::Deserialize;

/// Per-device constants correcting for manufacturing variance in the analog
/// sensor circuitry. Field names in the device file follow the firmware's
/// calibration table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct CalibrationParameters {
    #[serde(rename = "LM94022_TEMPERATURE_OFFSET", default)]
    pub temperature_offset: f64,
    #[serde(rename = "RN171_SMU_DC_OFFSET", default)]
    pub smu_dc_offset: f64,
    #[serde(rename = "RN171_SMU_GAIN", default)]
    pub smu_gain: f64,
    #[serde(rename = "SFH3710_DC_OFFSET_CORRECTION", default)]
    pub dc_offset_correction: f64,
    #[serde(rename = "SOIL_MOISTURE_DISCONTINUITY", default)]
    pub moisture_continuity: f64,
    #[serde(rename = "SOIL_MOISTURE_MIN", default)]
    pub moisture_min: f64,
}

/// A provisioned device with its decoded AES key
#[derive(Debug, Clone)]
pub struct Device {
    pub mac_address: String,
    pub name: String,
    pub key: Vec<u8>,
    pub calibration: CalibrationParameters,
}

/// One reading as reported by a device: `[timestamp, code, value]`
///
/// Deserialized from a positional JSON array. Arrays with fewer or more than
/// three elements are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RawReading {
    pub timestamp: i64,
    pub code: u32,
    pub value: f64,
}

/// A batch of readings uploaded in one exchange
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Data {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub readings: Vec<RawReading>,
}

/// A raw reading resolved against the sensor registry and converted with the
/// owning device's calibration parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedReading {
    pub timestamp: i64,
    pub code: u32,
    pub sensor_type: &'static str,
    pub raw_value: f64,
    pub converted_value: f64,
}
