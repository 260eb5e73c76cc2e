/// PostgreSQL storage for converted readings
use log::debug;
use time::OffsetDateTime;
use tokio_postgres::Client;

use crate::database::connection::connect_with_retry;
use crate::database::StoreError;
use crate::models::{ConvertedReading, Device};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS devices (
    id BIGSERIAL PRIMARY KEY,
    macaddress TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sensors (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS readings (
    id BIGSERIAL PRIMARY KEY,
    device BIGINT NOT NULL REFERENCES devices(id),
    rawvalue DOUBLE PRECISION,
    convertedvalue DOUBLE PRECISION,
    timestamp BIGINT NOT NULL,
    sensor BIGINT NOT NULL REFERENCES sensors(id),
    received_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS readings_device_sensor_timestamp
    ON readings (device, sensor, timestamp);
";

pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connect (with retry) and create the schema if it is missing
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let client = connect_with_retry(database_url).await?;
        client.batch_execute(SCHEMA).await?;
        Ok(Self { client })
    }

    async fn device_id(&self, device: &Device) -> Result<i64, StoreError> {
        let row = self
            .client
            .query_one(
                "INSERT INTO devices (macaddress, name) VALUES ($1, $2)
                 ON CONFLICT (macaddress) DO UPDATE SET name = EXCLUDED.name
                 RETURNING id",
                &[&device.mac_address, &device.name],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn sensor_id(&self, sensor_type: &str) -> Result<i64, StoreError> {
        let row = self
            .client
            .query_one(
                "INSERT INTO sensors (name) VALUES ($1)
                 ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                 RETURNING id",
                &[&sensor_type],
            )
            .await?;
        Ok(row.get(0))
    }

    /// Append one reading, creating its device and sensor rows on first use
    pub async fn write_reading(
        &self,
        device: &Device,
        reading: &ConvertedReading,
    ) -> Result<(), StoreError> {
        let device_id = self.device_id(device).await?;
        let sensor_id = self.sensor_id(reading.sensor_type).await?;
        let received_at = OffsetDateTime::now_utc();

        self.client
            .execute(
                "INSERT INTO readings (device, rawvalue, convertedvalue, timestamp, sensor, received_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &device_id,
                    &reading.raw_value,
                    &reading.converted_value,
                    &reading.timestamp,
                    &sensor_id,
                    &received_at,
                ],
            )
            .await?;

        debug!(
            "Stored {} reading (code {}) for {} at {}",
            reading.sensor_type, reading.code, device.mac_address, reading.timestamp
        );
        Ok(())
    }
}
