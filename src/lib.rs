//! Geo-Guardian Library
//!
//! Danger-zone synchronization and real-time alerts for the operator console
//!
//! ## Architecture (6 Components)
//!
//! 1. ZoneStore - Client-side zone state, synced with the zone service
//! 2. AlertChannel - Push subscription for `admin_alert` events
//! 3. DrawingSession - Drawn shape -> zone creation, provisional rendering
//! 4. ViewController - Camera and device-location state machine
//! 5. GeoProvider - Device position lookup
//! 6. Geocoder - Free-text location search
//!
//! ## Design Principles
//!
//! - Server acknowledgement first: no zone exists locally without one
//! - Explicit lifecycles: every component is constructed and owned, no globals
//! - Local recovery: every failure is surfaced to the operator, none is fatal

pub mod alert_channel;
pub mod drawing_session;
pub mod error;
pub mod geo_provider;
pub mod geocoder;
pub mod models;
pub mod notifier;
pub mod state;
pub mod view_controller;
pub mod zone_store;

pub use error::{Error, Result};
pub use state::{AppConfig, AppState};
