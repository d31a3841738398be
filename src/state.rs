//! Application state
//!
//! Holds configuration and the explicitly constructed components

use crate::alert_channel::{
    AlertChannel, EventStreamTransport, PushTransport, ReconnectPolicy, SocketIoTransport,
};
use crate::drawing_session::{DrawingSession, NamePrompt};
use crate::geo_provider::{self, GeoProvider};
use crate::geocoder::{Geocoder, NominatimGeocoder};
use crate::models::LatLng;
use crate::notifier::Notifier;
use crate::zone_store::{HttpZoneApi, ZoneStore};
use std::sync::Arc;
use std::time::Duration;

/// Zone service base when nothing is configured
pub const DEFAULT_API_URL: &str = "https://geo-guardian-backend.onrender.com/api";
/// Socket.IO server root pushing `admin_alert`
pub const DEFAULT_ALERT_URL: &str = "https://geo-guardian-backend.onrender.com";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_GEOIP_URL: &str = "http://ip-api.com/json";

/// Protocol spoken by the alert endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertTransportKind {
    /// Socket.IO session at the service root
    #[default]
    SocketIo,
    /// `text/event-stream` over plain HTTP
    EventStream,
}

impl std::str::FromStr for AlertTransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "socketio" | "socket.io" => Ok(Self::SocketIo),
            "sse" | "event-stream" => Ok(Self::EventStream),
            other => Err(format!("unknown alert transport {:?} (socketio|sse)", other)),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Zone service base URL (`{api_url}/zones`)
    pub api_url: String,
    /// Alert endpoint: Socket.IO server root, or stream URL for SSE
    pub alert_url: String,
    pub alert_transport: AlertTransportKind,
    /// Nominatim-compatible geocoder base URL
    pub geocoder_url: String,
    /// Fixed device position, takes precedence over IP lookup
    pub device_position: Option<LatLng>,
    /// IP geolocation endpoint; `None` disables device location
    pub geoip_url: Option<String>,
    /// Upper bound on one geolocation attempt
    pub locate_timeout: Duration,
    /// Zone service request timeout
    pub http_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for AppConfig {
    fn default() -> Self {
        let device_position = match (
            env_parse::<f64>("GEO_GUARDIAN_DEVICE_LAT"),
            env_parse::<f64>("GEO_GUARDIAN_DEVICE_LNG"),
        ) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
            _ => None,
        };

        Self {
            api_url: std::env::var("GEO_GUARDIAN_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            alert_url: std::env::var("GEO_GUARDIAN_ALERT_URL")
                .unwrap_or_else(|_| DEFAULT_ALERT_URL.to_string()),
            alert_transport: env_parse("GEO_GUARDIAN_ALERT_TRANSPORT").unwrap_or_default(),
            geocoder_url: std::env::var("GEO_GUARDIAN_GEOCODER_URL")
                .unwrap_or_else(|_| DEFAULT_GEOCODER_URL.to_string()),
            device_position,
            // set but empty disables location
            geoip_url: match std::env::var("GEO_GUARDIAN_GEOIP_URL") {
                Ok(url) if url.trim().is_empty() => None,
                Ok(url) => Some(url),
                Err(_) => Some(DEFAULT_GEOIP_URL.to_string()),
            },
            locate_timeout: Duration::from_secs(
                env_parse("GEO_GUARDIAN_LOCATE_TIMEOUT_SECS").unwrap_or(10),
            ),
            http_timeout: Duration::from_secs(
                env_parse("GEO_GUARDIAN_HTTP_TIMEOUT_SECS").unwrap_or(30),
            ),
            reconnect_base: Duration::from_millis(
                env_parse("GEO_GUARDIAN_RECONNECT_BASE_MS").unwrap_or(1000),
            ),
            reconnect_max: Duration::from_millis(
                env_parse("GEO_GUARDIAN_RECONNECT_MAX_MS").unwrap_or(30_000),
            ),
        }
    }
}

impl AppConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: self.reconnect_base,
            max_delay: self.reconnect_max.max(self.reconnect_base),
            max_attempts: None,
        }
    }
}

/// Application state shared by the console commands
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// ZoneStore (zone service sync)
    pub zones: Arc<ZoneStore>,
    /// Operator notification sink
    pub notifier: Arc<dyn Notifier>,
    /// Device location
    pub geo: Arc<dyn GeoProvider>,
    /// Location search
    pub geocoder: Arc<dyn Geocoder>,
}

impl AppState {
    /// Build the HTTP-backed components from configuration
    pub fn new(config: AppConfig, notifier: Arc<dyn Notifier>) -> crate::Result<Self> {
        let api = HttpZoneApi::with_timeout(&config.api_url, config.http_timeout)?;
        let zones = Arc::new(ZoneStore::new(Arc::new(api)));
        let geo = geo_provider::from_config(&config)?;
        let geocoder: Arc<dyn Geocoder> = Arc::new(NominatimGeocoder::new(&config.geocoder_url)?);

        Ok(Self {
            config,
            zones,
            notifier,
            geo,
            geocoder,
        })
    }

    /// Drawing session over this state's zone store
    pub fn drawing_session(&self, prompt: Arc<dyn NamePrompt>) -> DrawingSession {
        DrawingSession::new(self.zones.clone(), self.notifier.clone(), prompt)
    }

    /// Open the alert channel. The caller owns it and must close it.
    pub fn open_alert_channel(&self) -> crate::Result<AlertChannel> {
        let policy = self.config.reconnect_policy();
        let transport: Arc<dyn PushTransport> = match self.config.alert_transport {
            AlertTransportKind::SocketIo => {
                Arc::new(SocketIoTransport::new(&self.config.alert_url).with_policy(policy))
            }
            AlertTransportKind::EventStream => Arc::new(
                EventStreamTransport::new(&self.config.alert_url)?.with_policy(policy),
            ),
        };
        Ok(AlertChannel::open(transport))
    }
}
