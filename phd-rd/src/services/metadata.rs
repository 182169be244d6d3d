//! Plate and protocol metadata lookups
//!
//! Used only by the enriched plate view. Each lookup is a simple
//! request/response call; any failure surfaces as `UnresolvableDependency`.

use async_trait::async_trait;
use phd_common::{Error, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlateInfo {
    pub id: i64,
    pub barcode: Option<String>,
    pub rows: Option<i32>,
    pub columns: Option<i32>,
    pub experiment_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolInfo {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub features: Vec<FeatureInfo>,
}

#[async_trait]
pub trait PlateMetadata: Send + Sync {
    async fn plate(&self, plate_id: i64) -> Result<PlateInfo>;
}

#[async_trait]
pub trait ProtocolMetadata: Send + Sync {
    async fn protocol(&self, protocol_id: i64) -> Result<ProtocolInfo>;
}

/// Configured lookups; an absent client makes the enriched view unavailable
#[derive(Clone, Default)]
pub struct MetadataClients {
    pub plates: Option<Arc<dyn PlateMetadata>>,
    pub protocols: Option<Arc<dyn ProtocolMetadata>>,
}

impl MetadataClients {
    /// HTTP clients for whichever base URLs are configured
    pub fn from_urls(
        plate_service_url: Option<&str>,
        protocol_service_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let plates = plate_service_url
            .map(|url| HttpPlateClient::new(url, timeout))
            .transpose()?
            .map(|client| Arc::new(client) as Arc<dyn PlateMetadata>);
        let protocols = protocol_service_url
            .map(|url| HttpProtocolClient::new(url, timeout))
            .transpose()?
            .map(|client| Arc::new(client) as Arc<dyn ProtocolMetadata>);

        Ok(Self { plates, protocols })
    }

    pub fn plates(&self) -> Result<&Arc<dyn PlateMetadata>> {
        self.plates.as_ref().ok_or_else(|| {
            Error::UnresolvableDependency("plate metadata service is not configured".to_string())
        })
    }

    pub fn protocols(&self) -> Result<&Arc<dyn ProtocolMetadata>> {
        self.protocols.as_ref().ok_or_else(|| {
            Error::UnresolvableDependency("protocol metadata service is not configured".to_string())
        })
    }
}

fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}

async fn fetch_json<T: DeserializeOwned>(client: &Client, service: &str, url: &str) -> Result<T> {
    debug!("GET {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::UnresolvableDependency(format!("{} request failed: {}", service, e)))?;

    response
        .json::<T>()
        .await
        .map_err(|e| Error::UnresolvableDependency(format!("{} returned an invalid body: {}", service, e)))
}

/// `GET {base}/plates/{id}`
pub struct HttpPlateClient {
    http_client: Client,
    base_url: String,
}

impl HttpPlateClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PlateMetadata for HttpPlateClient {
    async fn plate(&self, plate_id: i64) -> Result<PlateInfo> {
        let url = format!("{}/plates/{}", self.base_url, plate_id);
        fetch_json(&self.http_client, "plate service", &url).await
    }
}

/// `GET {base}/protocols/{id}` (features included)
pub struct HttpProtocolClient {
    http_client: Client,
    base_url: String,
}

impl HttpProtocolClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProtocolMetadata for HttpProtocolClient {
    async fn protocol(&self, protocol_id: i64) -> Result<ProtocolInfo> {
        let url = format!("{}/protocols/{}", self.base_url, protocol_id);
        fetch_json(&self.http_client, "protocol service", &url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_clients_are_unresolvable() {
        let clients = MetadataClients::default();
        assert!(matches!(
            clients.plates(),
            Err(Error::UnresolvableDependency(_))
        ));
        assert!(matches!(
            clients.protocols(),
            Err(Error::UnresolvableDependency(_))
        ));
    }

    #[test]
    fn test_from_urls_builds_only_configured_clients() {
        let clients =
            MetadataClients::from_urls(Some("http://plates.local/"), None, Duration::from_secs(1))
                .unwrap();
        assert!(clients.plates().is_ok());
        assert!(clients.protocols().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unresolvable() {
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let client = HttpPlateClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            client.plate(1).await,
            Err(Error::UnresolvableDependency(_))
        ));
    }

    #[test]
    fn test_protocol_features_default_to_empty() {
        let info: ProtocolInfo = serde_json::from_str(r#"{"id": 1, "name": "Viability"}"#).unwrap();
        assert!(info.features.is_empty());
    }
}
