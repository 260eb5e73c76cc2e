//! HTTP handlers for the device exchanges.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use log::{debug, warn};
use std::sync::Arc;

use crate::protocol::{ExchangeError, Gateway, CONTENT_TYPE};

/// A failed exchange, tagged with the device that attempted it
pub struct ApiError {
    mac_address: String,
    error: ExchangeError,
}

impl ApiError {
    fn new(mac_address: &str, error: ExchangeError) -> Self {
        Self {
            mac_address: mac_address.to_string(),
            error,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.error {
            ExchangeError::UnknownDevice(_) => StatusCode::NOT_FOUND,
            ExchangeError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            // Device retries on any 5xx
            ExchangeError::Frame(_) | ExchangeError::MalformedBatch(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!("{} rejected ({}): {}", self.mac_address, status, self.error);
        (status, self.error.to_string()).into_response()
    }
}

fn encrypted(status: StatusCode, body: Vec<u8>) -> Response {
    (status, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}

/// PUT /v1/smart_devices/:mac_address
pub async fn connect(
    State(gateway): State<Arc<Gateway>>,
    Path(mac_address): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let reply = gateway
        .connect(&mac_address, &body)
        .map_err(|e| ApiError::new(&mac_address, e))?;
    Ok(encrypted(StatusCode::OK, reply))
}

/// POST /v1/smart_devices/:mac_address/config
pub async fn config(
    State(gateway): State<Arc<Gateway>>,
    Path(mac_address): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let reply = gateway
        .fetch_config(&mac_address, &body)
        .map_err(|e| ApiError::new(&mac_address, e))?;
    Ok(encrypted(StatusCode::OK, reply))
}

/// POST /v1/smart_devices/:mac_address/readings
pub async fn readings(
    State(gateway): State<Arc<Gateway>>,
    Path(mac_address): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (reply, summary) = gateway
        .upload_readings(&mac_address, &body)
        .await
        .map_err(|e| ApiError::new(&mac_address, e))?;
    debug!("{} uploaded {} reading(s)", mac_address, summary.stored);
    Ok(encrypted(StatusCode::CREATED, reply))
}
