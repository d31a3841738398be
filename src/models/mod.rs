//! Shared data models
//!
//! Wire shapes of the zone service and the alert stream, plus the
//! coordinate types used by the view layer.
//!
//! Coordinates travel as (lng, lat) on the wire (GeoJSON order) and are
//! rendered as (lat, lng). Only [`PolygonGeometry::to_lat_lng_ring`] and
//! [`PolygonGeometry::from_lat_lng`] cross between the two orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name used when the operator leaves the zone name empty
pub const DEFAULT_ZONE_NAME: &str = "Unnamed Zone";

/// Minimum number of positions in a closed polygon ring
pub const MIN_RING_POSITIONS: usize = 4;

/// Geographic position in presentation order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// GeoJSON position `[lng, lat]`
    pub fn to_position(self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    /// From a GeoJSON position `[lng, lat]`
    pub fn from_position(position: [f64; 2]) -> Self {
        Self {
            lat: position[1],
            lng: position[0],
        }
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// GeoJSON geometry type tag. Only polygons are stored as zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    Polygon,
}

/// Zone geometry: GeoJSON polygon with a single exterior ring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGeometry {
    #[serde(rename = "type")]
    pub geometry_type: GeometryType,
    /// Rings of `[lng, lat]` positions; the first ring is the exterior
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

impl PolygonGeometry {
    /// Build a closed polygon from vertices in (lat, lng) order.
    ///
    /// The ring is closed by repeating the first vertex unless the caller
    /// already did so.
    pub fn from_lat_lng(vertices: &[LatLng]) -> Self {
        let mut ring: Vec<[f64; 2]> = vertices.iter().map(|v| v.to_position()).collect();
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
            if first != last {
                ring.push(first);
            }
        }

        Self {
            geometry_type: GeometryType::Polygon,
            coordinates: vec![ring],
        }
    }

    /// Exterior ring in wire order
    pub fn exterior(&self) -> &[[f64; 2]] {
        self.coordinates.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Exterior ring transposed to (lat, lng) for rendering
    pub fn to_lat_lng_ring(&self) -> Vec<LatLng> {
        self.exterior()
            .iter()
            .map(|p| LatLng::from_position(*p))
            .collect()
    }

    /// First and last exterior positions are identical
    pub fn is_closed(&self) -> bool {
        let ring = self.exterior();
        match (ring.first(), ring.last()) {
            (Some(first), Some(last)) => ring.len() > 1 && first == last,
            _ => false,
        }
    }

    /// Closed ring with at least [`MIN_RING_POSITIONS`] positions
    pub fn is_valid_ring(&self) -> bool {
        self.is_closed() && self.exterior().len() >= MIN_RING_POSITIONS
    }
}

/// Server-persisted danger zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    /// Server-assigned opaque id
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub geometry: PolygonGeometry,
    pub created_at: DateTime<Utc>,
}

/// `GET /zones` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneListResponse {
    pub success: bool,
    #[serde(default)]
    pub zones: Option<Vec<Zone>>,
}

/// `POST /zones` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateZoneRequest {
    pub name: String,
    pub geometry: PolygonGeometry,
}

/// `POST /zones` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneResponse {
    pub success: bool,
    #[serde(default)]
    pub zone: Option<Zone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `DELETE /zones/{id}` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Location attached to an alert
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertLocation {
    pub lat: f64,
    pub lng: f64,
}

/// `admin_alert` payload. Ephemeral, carries no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<AlertLocation>,
}
