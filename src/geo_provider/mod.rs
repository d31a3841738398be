//! GeoProvider - Device position
//!
//! ## Responsibilities
//!
//! - Resolving the operator's position once at startup
//! - Bounding resolution time (10 s by default); a timeout is a failure
//!
//! There is no automatic retry. The operator re-triggers through recenter.

use crate::error::LocationError;
use crate::models::LatLng;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on a single position resolution
pub const DEFAULT_LOCATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of the device position
#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Whether the device can provide a position at all
    fn is_available(&self) -> bool {
        true
    }

    async fn current_position(&self) -> Result<LatLng, LocationError>;
}

/// Resolve the device position once, failing after `timeout`
pub async fn resolve_once(
    provider: &dyn GeoProvider,
    timeout: Duration,
) -> Result<LatLng, LocationError> {
    if !provider.is_available() {
        warn!("Geolocation is not supported");
        return Err(LocationError::Unsupported);
    }

    match tokio::time::timeout(timeout, provider.current_position()).await {
        Ok(Ok(position)) => {
            info!(lat = position.lat, lng = position.lng, "Location found");
            Ok(position)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Could not get location");
            Err(e)
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Location request timed out");
            Err(LocationError::Timeout(timeout.as_secs()))
        }
    }
}

/// Statically configured position
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub LatLng);

#[async_trait]
impl GeoProvider for FixedPosition {
    async fn current_position(&self) -> Result<LatLng, LocationError> {
        Ok(self.0)
    }
}

/// Device without location capability
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

#[async_trait]
impl GeoProvider for Unavailable {
    fn is_available(&self) -> bool {
        false
    }

    async fn current_position(&self) -> Result<LatLng, LocationError> {
        Err(LocationError::Unsupported)
    }
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Approximate position from an IP geolocation service
/// (`{status, lat, lon}` JSON, as served by ip-api.com)
pub struct IpGeoProvider {
    http: Client,
    url: String,
}

impl IpGeoProvider {
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_LOCATE_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl GeoProvider for IpGeoProvider {
    async fn current_position(&self) -> Result<LatLng, LocationError> {
        debug!(url = %self.url, "Requesting IP geolocation");

        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LocationError::Denied);
        }
        if !status.is_success() {
            return Err(LocationError::Unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body: IpLookupResponse = resp
            .json()
            .await
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;

        if body.status.as_deref().is_some_and(|s| s != "success") {
            return Err(LocationError::Unavailable(
                body.message.unwrap_or_else(|| "lookup failed".to_string()),
            ));
        }

        match (body.lat, body.lon) {
            (Some(lat), Some(lon)) => Ok(LatLng::new(lat, lon)),
            _ => Err(LocationError::Unavailable("response without coordinates".to_string())),
        }
    }
}

/// Provider selection from configuration
pub fn from_config(config: &crate::state::AppConfig) -> crate::Result<Arc<dyn GeoProvider>> {
    if let Some(position) = config.device_position {
        return Ok(Arc::new(FixedPosition(position)));
    }
    match config.geoip_url.as_deref() {
        Some(url) if !url.is_empty() => Ok(Arc::new(IpGeoProvider::new(url)?)),
        _ => Ok(Arc::new(Unavailable)),
    }
}
