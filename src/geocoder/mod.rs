//! Geocoder - Free-text location search
//!
//! Nominatim-compatible search: `GET {base}/search?format=json&q=...&limit=1`
//! returning `[{lat, lon, display_name}]` with coordinates as strings.

use crate::error::SearchError;
use crate::models::LatLng;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Best match for a query
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub position: LatLng,
    pub display_name: String,
}

impl GeocodeResult {
    /// First three comma-separated parts of the display name
    pub fn short_name(&self) -> String {
        self.display_name
            .split(',')
            .take(3)
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Free-text geocoding collaborator
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best match, or `SearchError::NoMatch`
    async fn search(&self, query: &str) -> Result<GeocodeResult, SearchError>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

/// reqwest client for a Nominatim endpoint
pub struct NominatimGeocoder {
    http: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>) -> crate::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(10))
            // Nominatim's usage policy requires an identifying agent
            .user_agent(concat!("geo-guardian/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str) -> Result<GeocodeResult, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let url = format!("{}/search", self.base_url);
        debug!(url = %url, query = %query, "Geocoding");

        let resp = self
            .http
            .get(&url)
            .query(&[("format", "json"), ("q", query), ("limit", "1")])
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SearchError::Request(format!("HTTP {}", status.as_u16())));
        }

        let places: Vec<NominatimPlace> = resp
            .json()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        let place = places.into_iter().next().ok_or(SearchError::NoMatch)?;
        let lat: f64 = place
            .lat
            .parse()
            .map_err(|_| SearchError::Request(format!("invalid latitude {:?}", place.lat)))?;
        let lon: f64 = place
            .lon
            .parse()
            .map_err(|_| SearchError::Request(format!("invalid longitude {:?}", place.lon)))?;

        info!(query = %query, lat = lat, lng = lon, "Location found");

        Ok(GeocodeResult {
            position: LatLng::new(lat, lon),
            display_name: place.display_name,
        })
    }
}
