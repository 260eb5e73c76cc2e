/// Static table of the sensor codes a device reports
use crate::sensors::calibration::Conversion;

/// Semantic category a sensor code maps to
///
/// Several codes can share a type, e.g. both light sensor models map to
/// `Light`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorType {
    BoardTemperature,
    BatteryVoltage,
    Button,
    Temperature,
    Light,
    Rssi,
    SoilSensorsTrigger,
    SoilTemperature,
    SoilMoisture,
}

impl SensorType {
    pub const fn as_str(self) -> &'static str {
        match self {
            SensorType::BoardTemperature => "board_temperature",
            SensorType::BatteryVoltage => "battery_voltage",
            SensorType::Button => "button",
            SensorType::Temperature => "temperature",
            SensorType::Light => "light",
            SensorType::Rssi => "rssi",
            SensorType::SoilSensorsTrigger => "soil_sensors_trigger",
            SensorType::SoilTemperature => "soil_temperature",
            SensorType::SoilMoisture => "soil_moisture",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorDescriptor {
    pub code: u32,
    pub sensor_type: SensorType,
    pub enabled: bool,
    /// Seconds between samples; 0 means event driven
    pub polling_interval: u32,
    pub conversion: Conversion,
}

const fn sensor(
    code: u32,
    sensor_type: SensorType,
    enabled: bool,
    polling_interval: u32,
    conversion: Conversion,
) -> SensorDescriptor {
    SensorDescriptor {
        code,
        sensor_type,
        enabled,
        polling_interval,
        conversion,
    }
}

/// Sorted by code
static SENSORS: [SensorDescriptor; 11] = [
    sensor(1, SensorType::BoardTemperature, false, 3600, Conversion::Identity),
    sensor(2, SensorType::BatteryVoltage, true, 86400, Conversion::Identity),
    sensor(6, SensorType::Button, true, 0, Conversion::Button),
    sensor(7, SensorType::Temperature, true, 3600, Conversion::Lm94022Temperature),
    sensor(8, SensorType::Light, true, 3600, Conversion::Sfh3710Light),
    sensor(9, SensorType::Rssi, true, 0, Conversion::Identity),
    sensor(10, SensorType::SoilSensorsTrigger, true, 18000, Conversion::Identity),
    sensor(11, SensorType::SoilTemperature, true, 18000, Conversion::SoilTemperature),
    sensor(12, SensorType::SoilMoisture, true, 0, Conversion::SoilMoisture),
    sensor(15, SensorType::Temperature, true, 0, Conversion::Sht21Temperature),
    sensor(29, SensorType::Light, true, 0, Conversion::Tsl2561Light),
];

/// Read-only view over a code-sorted sensor table
#[derive(Debug, Clone, Copy)]
pub struct SensorRegistry {
    sensors: &'static [SensorDescriptor],
}

impl SensorRegistry {
    /// Sensors fitted to the garden sensor hardware
    pub fn builtin() -> Self {
        Self { sensors: &SENSORS }
    }

    /// Descriptor for a code, `None` for codes the table does not know
    pub fn lookup(&self, code: u32) -> Option<&'static SensorDescriptor> {
        let sensors: &'static [SensorDescriptor] = self.sensors;
        sensors
            .binary_search_by_key(&code, |s| s.code)
            .ok()
            .map(|i| &sensors[i])
    }

    /// All descriptors in ascending code order
    pub fn list_all(&self) -> impl Iterator<Item = &'static SensorDescriptor> {
        self.sensors.iter()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_and_unique() {
        let codes: Vec<u32> = SensorRegistry::builtin().list_all().map(|s| s.code).collect();
        assert_eq!(codes, vec![1, 2, 6, 7, 8, 9, 10, 11, 12, 15, 29]);
        assert!(codes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn lookup_known_codes() {
        let registry = SensorRegistry::builtin();

        let light = registry.lookup(8).unwrap();
        assert_eq!(light.sensor_type.as_str(), "light");
        assert_eq!(light.conversion, Conversion::Sfh3710Light);
        assert_eq!(light.polling_interval, 3600);

        let board = registry.lookup(1).unwrap();
        assert!(!board.enabled);

        assert_eq!(registry.lookup(29).unwrap().sensor_type, SensorType::Light);
        assert_eq!(registry.lookup(15).unwrap().sensor_type, SensorType::Temperature);
    }

    #[test]
    fn lookup_unknown_code_is_none() {
        let registry = SensorRegistry::builtin();
        assert!(registry.lookup(0).is_none());
        assert!(registry.lookup(3).is_none());
        assert!(registry.lookup(1000).is_none());
    }

    #[test]
    fn event_driven_sensors_have_no_interval() {
        let event_driven: Vec<u32> = SensorRegistry::builtin()
            .list_all()
            .filter(|s| s.polling_interval == 0)
            .map(|s| s.code)
            .collect();
        assert_eq!(event_driven, vec![6, 9, 12, 15, 29]);
    }
}
