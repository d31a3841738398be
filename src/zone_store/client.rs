//! Zone service HTTP client
//!
//! `GET {base}/zones`, `POST {base}/zones`, `DELETE {base}/zones/{id}`.
//! A mutation counts as acknowledged only when the body says
//! `success: true`; an HTTP error status is a rejection even if the body
//! cannot be read.

use crate::error::{CreateError, DeleteError, FetchError};
use crate::models::{
    CreateZoneRequest, DeleteResponse, PolygonGeometry, Zone, ZoneListResponse, ZoneResponse,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Remote zone service contract
#[async_trait]
pub trait ZoneApi: Send + Sync {
    /// Fetch the full zone set
    async fn list_zones(&self) -> Result<Vec<Zone>, FetchError>;

    /// Create a zone; returns the server-assigned zone on acknowledgment
    async fn create_zone(&self, name: &str, geometry: &PolygonGeometry)
        -> Result<Zone, CreateError>;

    /// Delete a zone; `Ok` only on acknowledgment
    async fn delete_zone(&self, zone_id: &str) -> Result<(), DeleteError>;
}

/// reqwest implementation of [`ZoneApi`]
#[derive(Clone)]
pub struct HttpZoneApi {
    http: Client,
    base_url: String,
}

impl HttpZoneApi {
    /// Create client with default timeouts
    pub fn new(base_url: impl Into<String>) -> crate::Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create client with the given request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self::with_client(http, base_url))
    }

    /// Reuse an existing reqwest client
    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn zones_url(&self) -> String {
        format!("{}/zones", self.base_url)
    }

    fn zone_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}", self.base_url, urlencoding::encode(zone_id))
    }
}

#[async_trait]
impl ZoneApi for HttpZoneApi {
    async fn list_zones(&self) -> Result<Vec<Zone>, FetchError> {
        let url = self.zones_url();
        debug!(url = %url, "Fetching zones");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(status = %status, "Zone list request failed");
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: ZoneListResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Protocol(e.to_string()))?;

        if !body.success {
            return Err(FetchError::Rejected);
        }

        let zones = body
            .zones
            .ok_or_else(|| FetchError::Protocol("success response without zones".to_string()))?;

        info!(count = zones.len(), "Zones fetched");
        Ok(zones)
    }

    async fn create_zone(
        &self,
        name: &str,
        geometry: &PolygonGeometry,
    ) -> Result<Zone, CreateError> {
        let url = self.zones_url();
        let request = CreateZoneRequest {
            name: name.to_string(),
            geometry: geometry.clone(),
        };

        let resp = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CreateError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %detail, "Zone create request failed");
            return Err(if status.as_u16() == 400 || status.as_u16() == 422 {
                CreateError::Validation(format!("HTTP {}", status.as_u16()))
            } else {
                CreateError::Rejected(format!("HTTP {}", status.as_u16()))
            });
        }

        let body: ZoneResponse = resp
            .json()
            .await
            .map_err(|e| CreateError::Protocol(e.to_string()))?;

        if !body.success {
            let reason = body
                .message
                .unwrap_or_else(|| "service reported failure".to_string());
            return Err(CreateError::Rejected(reason));
        }

        let zone = body
            .zone
            .ok_or_else(|| CreateError::Protocol("success response without zone".to_string()))?;

        info!(zone_id = %zone.id, name = %zone.name, "Zone created");
        Ok(zone)
    }

    async fn delete_zone(&self, zone_id: &str) -> Result<(), DeleteError> {
        let url = self.zone_url(zone_id);

        let resp = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| DeleteError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(zone_id = %zone_id, status = %status, "Zone delete request failed");
            return Err(DeleteError::Rejected(format!("HTTP {}", status.as_u16())));
        }

        let body: DeleteResponse = resp
            .json()
            .await
            .map_err(|e| DeleteError::Protocol(e.to_string()))?;

        if !body.success {
            let reason = body
                .message
                .unwrap_or_else(|| "service reported failure".to_string());
            return Err(DeleteError::Rejected(reason));
        }

        info!(zone_id = %zone_id, "Zone deleted");
        Ok(())
    }
}
