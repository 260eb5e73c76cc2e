pub mod connection;
pub mod csv;
pub mod operations;

use thiserror::Error;

use crate::models::{ConvertedReading, Device};

pub use self::csv::CsvStore;
pub use operations::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("file output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database connection failed: {0}")]
    Connect(String),
}

/// Destination for converted readings
///
/// Writes are append-only; a device retrying an exchange may deliver the same
/// readings twice.
pub enum ReadingStore {
    Postgres(PostgresStore),
    Csv(CsvStore),
}

impl ReadingStore {
    pub async fn write_reading(
        &self,
        device: &Device,
        reading: &ConvertedReading,
    ) -> Result<(), StoreError> {
        match self {
            ReadingStore::Postgres(store) => store.write_reading(device, reading).await,
            ReadingStore::Csv(store) => store.write_reading(device, reading).await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ReadingStore::Postgres(_) => "PostgreSQL".to_string(),
            ReadingStore::Csv(store) => format!("CSV files in {}", store.directory().display()),
        }
    }
}
