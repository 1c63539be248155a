//! Remote blob network storage tier.
//!
//! Talks to a content-addressed publisher/aggregator pair over HTTP:
//! - `PUT {publisher}/v1/blobs?epochs=N` stores bytes and answers with the
//!   content id, either freshly created or already certified
//! - `GET {aggregator}/v1/blobs/{id}` reads them back
//!
//! Identical payloads may come back with the id of an earlier upload; that
//! deduplication belongs to the network.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::backend::BlobBackend;
use crate::config::RemoteConfig;
use sealvault_common::{BlobKind, Error, Result, Tier};

/// Connect timeout for every request. Whole-request budgets are enforced by
/// the orchestrator.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Response from the publisher's store endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreResponse {
    #[serde(default)]
    newly_created: Option<NewlyCreated>,
    #[serde(default)]
    already_certified: Option<AlreadyCertified>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewlyCreated {
    blob_object: BlobObject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobObject {
    blob_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlreadyCertified {
    blob_id: String,
}

impl StoreResponse {
    fn into_blob_id(self) -> Result<String> {
        if let Some(created) = self.newly_created {
            return Ok(created.blob_object.blob_id);
        }
        if let Some(certified) = self.already_certified {
            return Ok(certified.blob_id);
        }
        Err(Error::Serialization(
            "Store response carried no blob id".to_string(),
        ))
    }
}

/// Remote blob network backend.
pub struct RemoteBackend {
    http: Client,
    publisher: String,
    aggregator: String,
    health_path: String,
    epochs: u32,
}

impl RemoteBackend {
    /// Create a new remote backend.
    ///
    /// # Errors
    /// - Publisher or aggregator URL does not parse
    /// - HTTP client cannot be built
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let publisher = Self::base_url(&config.publisher_url)?;
        let aggregator = Self::base_url(&config.aggregator_url)?;

        let http = Client::builder()
            .user_agent(concat!("SealVault/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        let health_path = if config.health_path.starts_with('/') {
            config.health_path.clone()
        } else {
            format!("/{}", config.health_path)
        };

        Ok(Self {
            http,
            publisher,
            aggregator,
            health_path,
            epochs: config.epochs,
        })
    }

    fn base_url(raw: &str) -> Result<String> {
        let url = Url::parse(raw)
            .map_err(|e| Error::InvalidInput(format!("Invalid remote URL {:?}: {}", raw, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "Remote URL must be http(s): {}",
                raw
            )));
        }
        Ok(url.as_str().trim_end_matches('/').to_string())
    }

    /// Content ids are URL-safe base64 or hex; anything else never reaches the wire.
    fn check_id(id: &str) -> Result<()> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!("Invalid content id: {:?}", id)))
        }
    }

    fn transport_error(err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(format!("Remote request timed out: {}", err))
        } else if err.is_connect() {
            Error::TierUnreachable {
                tier: Tier::Remote,
                reason: err.to_string(),
            }
        } else {
            Error::Network(err.to_string())
        }
    }

    /// Map non-success statuses to tier errors.
    async fn check_status(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = format!("{} ({}): {}", what, status, body.trim());
        Err(match status {
            StatusCode::NOT_FOUND => Error::NotFound(detail),
            StatusCode::PAYLOAD_TOO_LARGE | StatusCode::INSUFFICIENT_STORAGE => {
                Error::QuotaExceeded(detail)
            }
            s if s.is_server_error() => Error::TierUnreachable {
                tier: Tier::Remote,
                reason: detail,
            },
            _ => Error::Network(detail),
        })
    }
}

#[async_trait]
impl BlobBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    fn tier(&self) -> Tier {
        Tier::Remote
    }

    async fn put(&self, data: &[u8], kind: BlobKind) -> Result<String> {
        let url = format!("{}/v1/blobs", self.publisher);

        let response = self
            .http
            .put(&url)
            .query(&[("epochs", self.epochs)])
            .body(data.to_vec())
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check_status(response, "store blob").await?;
        let parsed: StoreResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Bad store response: {}", e)))?;

        let id = parsed.into_blob_id()?;
        debug!(id = %id, kind = %kind, size = data.len(), "Stored blob on remote network");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        Self::check_id(id)?;
        let url = format!("{}/v1/blobs/{}", self.aggregator, id);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check_status(response, "read blob").await?;
        let bytes = response.bytes().await.map_err(Self::transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        Self::check_id(id)?;
        // Content on the network expires by epoch; there is nothing to erase.
        Err(Error::InvalidInput(
            "Remote blobs cannot be deleted".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}{}", self.aggregator, self.health_path);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "Remote health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_port_config() -> RemoteConfig {
        RemoteConfig {
            enabled: true,
            publisher_url: "http://127.0.0.1:1".to_string(),
            aggregator_url: "http://127.0.0.1:1/".to_string(),
            health_path: "status".to_string(),
            epochs: 1,
        }
    }

    #[test]
    fn test_parse_newly_created() {
        let json = r#"{"newlyCreated":{"blobObject":{"id":"0x1","blobId":"abc-_123","size":10}}}"#;
        let parsed: StoreResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.into_blob_id().unwrap(), "abc-_123");
    }

    #[test]
    fn test_parse_already_certified() {
        let json = r#"{"alreadyCertified":{"blobId":"dedup42","endEpoch":9}}"#;
        let parsed: StoreResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.into_blob_id().unwrap(), "dedup42");
    }

    #[test]
    fn test_parse_empty_response_fails() {
        let parsed: StoreResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.into_blob_id().is_err());
    }

    #[test]
    fn test_rejects_bad_urls() {
        let mut config = closed_port_config();
        config.publisher_url = "not a url".to_string();
        assert!(RemoteBackend::new(&config).is_err());

        config.publisher_url = "ftp://example.com".to_string();
        assert!(RemoteBackend::new(&config).is_err());
    }

    #[test]
    fn test_normalizes_urls() {
        let backend = RemoteBackend::new(&closed_port_config()).unwrap();
        assert_eq!(backend.aggregator, "http://127.0.0.1:1");
        assert_eq!(backend.health_path, "/status");
    }

    #[tokio::test]
    async fn test_unsafe_ids_never_sent() {
        let backend = RemoteBackend::new(&closed_port_config()).unwrap();
        assert!(matches!(
            backend.get("../admin").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_port_is_unhealthy() {
        let backend = RemoteBackend::new(&closed_port_config()).unwrap();
        assert!(!backend.health_check().await);

        let err = backend.put(b"data", BlobKind::Vault).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
