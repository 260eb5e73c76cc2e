use log::{error, info};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use tokio::time::Duration;
use tokio_postgres::{Client, NoTls};
use url::Url;

use crate::database::StoreError;

const MAX_RETRIES: usize = 100;
const WAIT_BETWEEN_RETRIES: u64 = 5;

pub fn create_ssl_connector(sslrootcert_path: &str) -> Result<MakeTlsConnector, String> {
    let mut builder =
        SslConnector::builder(SslMethod::tls()).map_err(|e| format!("SSL builder error: {}", e))?;

    builder
        .set_ca_file(sslrootcert_path)
        .map_err(|e| format!("Error loading CA cert: {}", e))?;

    builder.set_verify(SslVerifyMode::NONE); // self-signed gateway database certs

    Ok(MakeTlsConnector::new(builder.build()))
}

/// Split the non-libpq `sslrootcert` parameter off a connection URL
///
/// Returns the cleaned URL and the certificate path, if one was given.
pub fn split_sslrootcert(database_url: &str) -> Result<(String, Option<String>), StoreError> {
    let url = Url::parse(database_url)
        .map_err(|e| StoreError::Connect(format!("URL parse error: {}", e)))?;

    let mut sslrootcert_path = None;
    let mut clean_params = Vec::new();
    for (key, value) in url.query_pairs() {
        if key == "sslrootcert" {
            sslrootcert_path = Some(value.to_string());
        } else {
            clean_params.push((key.into_owned(), value.into_owned()));
        }
    }

    let mut clean_url = url.clone();
    clean_url.set_query(None);
    if !clean_params.is_empty() {
        let query = clean_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        clean_url.set_query(Some(&query));
    }

    Ok((clean_url.to_string(), sslrootcert_path))
}

async fn connect_once(
    clean_database_url: &str,
    sslrootcert_path: Option<&str>,
) -> Result<Client, String> {
    match sslrootcert_path {
        Some(path) => {
            let connector = create_ssl_connector(path)?;
            let (client, connection) = tokio_postgres::connect(clean_database_url, connector)
                .await
                .map_err(|e| format!("Connection error: {}", e))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Connection error: {}", e);
                }
            });
            Ok(client)
        }
        None => {
            let (client, connection) = tokio_postgres::connect(clean_database_url, NoTls)
                .await
                .map_err(|e| format!("Connection error: {}", e))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Connection error: {}", e);
                }
            });
            Ok(client)
        }
    }
}

/// Open a client, retrying while the database is unreachable
///
/// TLS is used when the URL carries `sslrootcert=<path>`.
pub async fn connect_with_retry(database_url: &str) -> Result<Client, StoreError> {
    let (clean_database_url, sslrootcert_path) = split_sslrootcert(database_url)?;

    for attempt in 0..MAX_RETRIES {
        match connect_once(&clean_database_url, sslrootcert_path.as_deref()).await {
            Ok(client) => {
                info!("Connected to database after {} attempt(s)", attempt + 1);
                return Ok(client);
            }
            Err(e) => error!("Attempt {}: {}", attempt + 1, e),
        }

        if attempt < MAX_RETRIES - 1 {
            tokio::time::sleep(Duration::from_secs(WAIT_BETWEEN_RETRIES)).await;
        }
    }

    Err(StoreError::Connect("Max retries exceeded".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_sslrootcert_and_keeps_other_params() {
        let (url, cert) = split_sslrootcert(
            "postgres://gw:pw@db.local:5432/garden?sslmode=require&sslrootcert=/etc/ca.pem",
        )
        .unwrap();
        assert_eq!(url, "postgres://gw:pw@db.local:5432/garden?sslmode=require");
        assert_eq!(cert.as_deref(), Some("/etc/ca.pem"));
    }

    #[test]
    fn url_without_cert_is_plain() {
        let (url, cert) = split_sslrootcert("postgres://gw@localhost/garden").unwrap();
        assert_eq!(url, "postgres://gw@localhost/garden");
        assert!(cert.is_none());
    }

    #[test]
    fn rejects_unparseable_url() {
        assert!(matches!(
            split_sslrootcert("not a url"),
            Err(StoreError::Connect(_))
        ));
    }
}
