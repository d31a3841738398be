//! ViewController - Map camera state
//!
//! ## Responsibilities
//!
//! - Device-location state machine
//!   (`Uninitialized -> Locating -> Located | Failed`)
//! - Camera center/zoom from the first fix, search results and recenter
//!   requests (last writer wins)
//! - Composing the camera with the ZoneStore snapshot for rendering
//!
//! The camera center is `None` only before the first resolution attempt
//! finishes. A failed attempt always falls back to the wide-area default.

use crate::error::{LocationError, SearchError};
use crate::geo_provider::{resolve_once, GeoProvider};
use crate::geocoder::{GeocodeResult, Geocoder};
use crate::models::LatLng;
use crate::notifier::{Notification, Notifier};
use crate::zone_store::ZoneStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Wide-area default center (India)
pub const FALLBACK_CENTER: LatLng = LatLng {
    lat: 20.5937,
    lng: 78.9629,
};
pub const FALLBACK_ZOOM: u8 = 5;
/// Zoom applied on the first device fix
pub const LOCATED_ZOOM: u8 = 13;
pub const SEARCH_ZOOM: u8 = 15;
pub const RECENTER_ZOOM: u8 = 18;
pub const MIN_ZOOM: u8 = 0;
/// Satellite imagery tiles stop at 19
pub const MAX_ZOOM: u8 = 19;

/// Device-location subsystem state
#[derive(Debug, Clone, PartialEq)]
pub enum LocationState {
    Uninitialized,
    Locating,
    Located(LatLng),
    Failed(LocationError),
}

/// Map camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraState {
    pub center: Option<LatLng>,
    pub zoom: u8,
    /// Whether the change should animate (fly-to)
    pub animate: bool,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            center: None,
            zoom: LOCATED_ZOOM,
            animate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecenterError {
    #[error("GPS location not available")]
    NoLocation,
}

/// Zone prepared for rendering, ring in (lat, lng) order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneShape {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub ring: Vec<LatLng>,
}

/// Everything the map needs for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub camera: CameraState,
    pub my_location: Option<LatLng>,
    pub zones: Vec<ZoneShape>,
}

/// ViewController instance
pub struct ViewController {
    location: LocationState,
    camera: CameraState,
    notifier: Arc<dyn Notifier>,
}

impl ViewController {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            location: LocationState::Uninitialized,
            camera: CameraState::default(),
            notifier,
        }
    }

    pub fn location_state(&self) -> &LocationState {
        &self.location
    }

    pub fn camera(&self) -> CameraState {
        self.camera
    }

    /// Last device fix; drives the "my location" marker
    pub fn my_location(&self) -> Option<LatLng> {
        match self.location {
            LocationState::Located(position) => Some(position),
            _ => None,
        }
    }

    /// Start a resolution attempt. Returns `false` when the device has no
    /// location capability, in which case the fallback camera is applied.
    pub fn begin_locating(&mut self, available: bool) -> bool {
        if !available {
            self.fail(LocationError::Unsupported);
            return false;
        }
        self.location = LocationState::Locating;
        self.notifier.notify(Notification::info("Getting your location..."));
        true
    }

    /// Apply the outcome of a resolution attempt started by `begin_locating`
    pub fn on_location_result(&mut self, result: Result<LatLng, LocationError>) {
        if self.location != LocationState::Locating {
            debug!(state = ?self.location, "Ignoring location result outside of locating");
            return;
        }

        match result {
            Ok(position) => {
                self.location = LocationState::Located(position);
                self.camera = CameraState {
                    center: Some(position),
                    zoom: LOCATED_ZOOM,
                    animate: true,
                };
                self.notifier.notify(Notification::success("Location found!"));
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: LocationError) {
        info!(error = %error, "Falling back to default map view");
        let title = match error {
            LocationError::Unsupported => "Geolocation is not supported by your device",
            _ => "Could not get your location",
        };
        self.notifier.notify(
            Notification::error(title).with_detail(format!("{} ({})", error, error.category())),
        );
        self.location = LocationState::Failed(error);
        self.camera = CameraState {
            center: Some(FALLBACK_CENTER),
            zoom: FALLBACK_ZOOM,
            animate: false,
        };
    }

    /// Resolve the device position once and apply it to the camera
    pub async fn locate(&mut self, provider: &dyn GeoProvider, timeout: Duration) -> CameraState {
        if self.begin_locating(provider.is_available()) {
            let result = resolve_once(provider, timeout).await;
            self.on_location_result(result);
        }
        self.camera
    }

    /// Fly back to the last device fix at the detail zoom level
    pub fn recenter(&mut self) -> Result<CameraState, RecenterError> {
        let Some(position) = self.my_location() else {
            self.notifier.notify(Notification::error("GPS location not available"));
            return Err(RecenterError::NoLocation);
        };

        self.camera = CameraState {
            center: Some(position),
            zoom: RECENTER_ZOOM,
            animate: true,
        };
        self.notifier.notify(Notification::info("Zooming to your location"));
        Ok(self.camera)
    }

    /// Recenter, re-running geolocation first when there is no fix yet.
    /// This is the only way a failed geolocation is retried.
    pub async fn recenter_or_locate(
        &mut self,
        provider: &dyn GeoProvider,
        timeout: Duration,
    ) -> Result<CameraState, RecenterError> {
        if self.my_location().is_none() && self.location != LocationState::Locating {
            self.locate(provider, timeout).await;
        }
        self.recenter()
    }

    /// Apply a geocoding outcome; failures leave the camera unchanged
    pub fn apply_search(
        &mut self,
        result: Result<GeocodeResult, SearchError>,
    ) -> Result<CameraState, SearchError> {
        match result {
            Ok(found) => {
                self.camera = CameraState {
                    center: Some(found.position),
                    zoom: SEARCH_ZOOM,
                    animate: true,
                };
                self.notifier
                    .notify(Notification::success("Location Found!").with_detail(found.short_name()));
                Ok(self.camera)
            }
            Err(SearchError::EmptyQuery) => Err(SearchError::EmptyQuery),
            Err(e) => {
                let title = match e {
                    SearchError::NoMatch => "Location not found. Try a different search.",
                    _ => "Search failed. Please try again.",
                };
                self.notifier
                    .notify(Notification::error(title).with_detail(e.category()));
                Err(e)
            }
        }
    }

    /// Geocode `query` and center the camera on the best match
    pub async fn search(
        &mut self,
        geocoder: &dyn Geocoder,
        query: &str,
    ) -> Result<CameraState, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        self.notifier.notify(Notification::info("Searching location..."));
        let result = geocoder.search(query).await;
        self.apply_search(result)
    }

    pub fn zoom_in(&mut self) -> CameraState {
        self.set_zoom(self.camera.zoom.saturating_add(1))
    }

    pub fn zoom_out(&mut self) -> CameraState {
        self.set_zoom(self.camera.zoom.saturating_sub(1))
    }

    fn set_zoom(&mut self, zoom: u8) -> CameraState {
        self.camera.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.camera.animate = true;
        self.camera
    }

    /// Compose camera, marker and current zones
    pub async fn map_view(&self, store: &ZoneStore) -> MapView {
        let zones = store
            .snapshot()
            .await
            .into_iter()
            .map(|zone| ZoneShape {
                ring: zone.geometry.to_lat_lng_ring(),
                id: zone.id,
                name: zone.name,
                created_at: zone.created_at,
            })
            .collect();

        MapView {
            camera: self.camera,
            my_location: self.my_location(),
            zones,
        }
    }
}
