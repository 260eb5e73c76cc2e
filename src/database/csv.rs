/// Flat-file storage: one CSV file per device and sensor type
///
/// Files are named `<mac>_<type>.csv`. The header `timestamp,<type>,raw_value`
/// is written when a file is created; each reading appends
/// `timestamp,converted,raw` with six decimal places.
use log::debug;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::database::StoreError;
use crate::models::{ConvertedReading, Device};

pub struct CsvStore {
    directory: PathBuf,
    // Serialises header creation and appends across concurrent exchanges
    write_lock: Mutex<()>,
}

impl CsvStore {
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).await?;
        Ok(Self {
            directory,
            write_lock: Mutex::new(()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn file_path(&self, mac_address: &str, sensor_type: &str) -> PathBuf {
        self.directory
            .join(format!("{}_{}.csv", mac_address, sensor_type))
    }

    pub async fn write_reading(
        &self,
        device: &Device,
        reading: &ConvertedReading,
    ) -> Result<(), StoreError> {
        let path = self.file_path(&device.mac_address, reading.sensor_type);
        let _guard = self.write_lock.lock().await;

        let mut lines = String::new();
        if fs::metadata(&path).await.is_err() {
            lines.push_str(&format!("timestamp,{},raw_value\n", reading.sensor_type));
        }
        lines.push_str(&format!(
            "{},{:.6},{:.6}\n",
            reading.timestamp, reading.converted_value, reading.raw_value
        ));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;

        debug!("Appended code {} reading to {}", reading.code, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CalibrationParameters;

    fn device() -> Device {
        Device {
            mac_address: "00066680aabb".to_string(),
            name: "Kitchen basil".to_string(),
            key: vec![0; 16],
            calibration: CalibrationParameters::default(),
        }
    }

    fn reading(timestamp: i64, raw: f64, converted: f64) -> ConvertedReading {
        ConvertedReading {
            timestamp,
            code: 11,
            sensor_type: "soil_temperature",
            raw_value: raw,
            converted_value: converted,
        }
    }

    #[tokio::test]
    async fn writes_header_once_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::open(dir.path()).await.unwrap();

        store.write_reading(&device(), &reading(1600000000, 22.5, 20.0)).await.unwrap();
        store.write_reading(&device(), &reading(1600000060, 23.0, 20.5)).await.unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("00066680aabb_soil_temperature.csv")).unwrap();
        assert_eq!(
            content,
            "timestamp,soil_temperature,raw_value\n\
             1600000000,20.000000,22.500000\n\
             1600000060,20.500000,23.000000\n"
        );
    }

    #[tokio::test]
    async fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = CsvStore::open(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert_eq!(store.directory(), nested.as_path());
    }
}
