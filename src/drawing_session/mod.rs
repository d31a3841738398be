//! DrawingSession - Operator-drawn zone submission
//!
//! ## Responsibilities
//!
//! - Draw tool policy (which shape kinds may become zones)
//! - Name prompt, canonical polygon conversion, `ZoneStore::create`
//! - Provisional rendering of a drawn shape until the service answers
//! - Symmetric provisional removal for deletes, restored on failure
//!
//! ## Shape lifecycle
//!
//! ```text
//! drawn ──► Provisional ──ack──► Confirmed(zone) ──delete──► PendingRemoval(zone)
//!               │                      ▲                          │      │
//!               └──fail──► removed     └────────── fail ──────────┘    ack──► removed
//! ```
//!
//! The layer lock is never held across a network call.

mod layer;

pub use layer::{RenderedShape, ShapeId, ShapeLayer, ShapeStatus};

use crate::error::{CreateError, DeleteError, DrawError};
use crate::models::{LatLng, PolygonGeometry, Zone};
use crate::notifier::{Notification, Notifier};
use crate::zone_store::{normalize_zone_name, DeleteOutcome, ZoneStore};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Kinds of shape the map drawing tool can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Polygon,
    Rectangle,
    Circle,
    CircleMarker,
    Marker,
    Polyline,
}

impl std::fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ShapeKind::Polygon => "polygon",
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Circle => "circle",
            ShapeKind::CircleMarker => "circle marker",
            ShapeKind::Marker => "marker",
            ShapeKind::Polyline => "polyline",
        };
        write!(f, "{}", name)
    }
}

/// Drawing tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawToolPolicy {
    pub enabled: HashSet<ShapeKind>,
    /// Self-intersecting polygons may be finished
    pub allow_intersection: bool,
    /// Vertex editing of existing shapes
    pub edit: bool,
    /// Shape removal tool
    pub remove: bool,
}

impl Default for DrawToolPolicy {
    fn default() -> Self {
        Self {
            enabled: HashSet::from([ShapeKind::Polygon]),
            allow_intersection: false,
            edit: false,
            remove: true,
        }
    }
}

impl DrawToolPolicy {
    pub fn accepts(&self, kind: ShapeKind) -> bool {
        self.enabled.contains(&kind)
    }
}

/// Shape as finished by the drawing tool, vertices in (lat, lng) order
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnShape {
    pub kind: ShapeKind,
    pub vertices: Vec<LatLng>,
}

impl DrawnShape {
    pub fn polygon(vertices: Vec<LatLng>) -> Self {
        Self {
            kind: ShapeKind::Polygon,
            vertices,
        }
    }

    /// Closed (lng, lat) ring for the zone service
    pub fn to_geometry(&self) -> Result<PolygonGeometry, DrawError> {
        let mut open: &[LatLng] = &self.vertices;
        if open.len() > 1 && open.first() == open.last() {
            open = &open[..open.len() - 1];
        }

        let mut distinct: Vec<LatLng> = Vec::with_capacity(open.len());
        for v in open {
            if !distinct.contains(v) {
                distinct.push(*v);
            }
        }
        if distinct.len() < 3 {
            return Err(DrawError::TooFewVertices(distinct.len()));
        }

        Ok(PolygonGeometry::from_lat_lng(open))
    }
}

/// Blocking zone-name prompt. `None` means the operator cancelled.
pub trait NamePrompt: Send + Sync {
    fn prompt_zone_name(&self) -> Option<String>;
}

/// Prompt answered in advance
#[derive(Debug, Clone, Default)]
pub struct PresetName(pub Option<String>);

impl NamePrompt for PresetName {
    fn prompt_zone_name(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Result of submitting a drawn shape
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOutcome {
    /// Shape now bound to the acknowledged zone
    Created { shape: ShapeId, zone: Zone },
    /// Provisional shape removed
    Failed(CreateError),
}

impl DrawOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, DrawOutcome::Created { .. })
    }
}

/// Result of removing one shape
#[derive(Debug, Clone, PartialEq)]
pub enum RemovalOutcome {
    Deleted { shape: ShapeId, zone_id: String },
    /// Shape restored, zone still active
    Failed {
        shape: ShapeId,
        zone_id: String,
        error: DeleteError,
    },
    /// An earlier delete for this shape is still awaiting the service; no
    /// second request was sent
    InProgress { shape: ShapeId, zone_id: String },
    /// Shape has no acknowledged zone (unknown or provisional)
    Unbound(ShapeId),
}

impl RemovalOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, RemovalOutcome::Deleted { .. })
    }
}

/// Drawing session over one zone store
pub struct DrawingSession {
    store: Arc<ZoneStore>,
    notifier: Arc<dyn Notifier>,
    prompt: Arc<dyn NamePrompt>,
    policy: DrawToolPolicy,
    layer: Mutex<ShapeLayer>,
}

impl DrawingSession {
    pub fn new(
        store: Arc<ZoneStore>,
        notifier: Arc<dyn Notifier>,
        prompt: Arc<dyn NamePrompt>,
    ) -> Self {
        Self {
            store,
            notifier,
            prompt,
            policy: DrawToolPolicy::default(),
            layer: Mutex::new(ShapeLayer::new()),
        }
    }

    pub fn with_policy(mut self, policy: DrawToolPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &DrawToolPolicy {
        &self.policy
    }

    fn layer(&self) -> MutexGuard<'_, ShapeLayer> {
        self.layer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Submit a finished shape as a new zone.
    ///
    /// Refused shapes (`DrawError`) never reach the prompt or the service.
    pub async fn on_shape_drawn(&self, shape: DrawnShape) -> Result<DrawOutcome, DrawError> {
        if !self.policy.accepts(shape.kind) {
            let e = DrawError::UnsupportedShape(shape.kind);
            warn!(kind = %shape.kind, "Drawn shape refused by tool policy");
            self.notifier
                .notify(Notification::warning("Shape Not Supported").with_detail(e.to_string()));
            return Err(e);
        }

        let geometry = shape.to_geometry().map_err(|e| {
            warn!(error = %e, "Drawn shape refused");
            self.notifier
                .notify(Notification::warning("Shape Not Supported").with_detail(e.to_string()));
            e
        })?;

        let name = normalize_zone_name(&self.prompt.prompt_zone_name().unwrap_or_default());
        let shape_id = self
            .layer()
            .add_provisional(&name, geometry.to_lat_lng_ring());
        debug!(shape_id = %shape_id, name = %name, "Provisional shape rendered");

        match self.store.create(&name, geometry).await.into_result() {
            Ok(zone) => {
                let shape_id = self.layer().confirm_or_merge(shape_id, &zone.id, &zone.name);
                info!(shape_id = %shape_id, zone_id = %zone.id, "Drawn zone saved");
                self.notifier.notify(
                    Notification::success("Zone Created!")
                        .with_detail(format!("\"{}\" is now active", zone.name)),
                );
                Ok(DrawOutcome::Created {
                    shape: shape_id,
                    zone,
                })
            }
            Err(e) => {
                self.layer().remove(shape_id);
                warn!(shape_id = %shape_id, error = %e, "Drawn zone not saved, provisional shape removed");
                self.notifier.notify(
                    Notification::error("Creation Failed")
                        .with_detail(format!("{} ({})", e, e.category())),
                );
                Ok(DrawOutcome::Failed(e))
            }
        }
    }

    /// Delete the zones behind the removed shapes.
    ///
    /// Shapes are hidden first and deleted concurrently; each failed delete
    /// restores its shape.
    pub async fn on_shapes_deleted(&self, shapes: &[ShapeId]) -> Vec<RemovalOutcome> {
        let mut outcomes: Vec<Option<RemovalOutcome>> = Vec::with_capacity(shapes.len());
        let mut pending: Vec<(usize, ShapeId, String)> = Vec::new();
        {
            let mut layer = self.layer();
            for (i, &shape) in shapes.iter().enumerate() {
                let in_flight = match layer.get(shape).map(|s| &s.status) {
                    Some(ShapeStatus::PendingRemoval(zone_id)) => Some(zone_id.clone()),
                    _ => None,
                };
                if let Some(zone_id) = in_flight {
                    debug!(shape_id = %shape, zone_id = %zone_id, "Deletion already in flight");
                    outcomes.push(Some(RemovalOutcome::InProgress { shape, zone_id }));
                    continue;
                }
                match layer.begin_removal(shape) {
                    Some(zone_id) => {
                        pending.push((i, shape, zone_id));
                        outcomes.push(None);
                    }
                    None => {
                        debug!(shape_id = %shape, "Removed shape has no bound zone");
                        outcomes.push(Some(RemovalOutcome::Unbound(shape)));
                    }
                }
            }
        }

        let results = join_all(
            pending
                .iter()
                .map(|(_, _, zone_id)| self.store.delete(zone_id)),
        )
        .await;

        for ((i, shape, zone_id), result) in pending.into_iter().zip(results) {
            outcomes[i] = Some(self.finish_removal(shape, zone_id, result));
        }

        outcomes.into_iter().flatten().collect()
    }

    fn finish_removal(&self, shape: ShapeId, zone_id: String, result: DeleteOutcome) -> RemovalOutcome {
        match result {
            DeleteOutcome::Deleted(_) => {
                let name = self
                    .layer()
                    .remove(shape)
                    .map(|s| s.name)
                    .unwrap_or_default();
                self.notifier.notify(
                    Notification::success("Zone Deleted")
                        .with_detail(format!("\"{}\" removed", name)),
                );
                RemovalOutcome::Deleted { shape, zone_id }
            }
            DeleteOutcome::Failed(error) => {
                self.layer().restore(shape);
                warn!(shape_id = %shape, zone_id = %zone_id, "Shape restored after failed delete");
                self.notifier.notify(
                    Notification::error("Delete Failed").with_detail(format!(
                        "{} ({}); zone remains active",
                        error,
                        error.category()
                    )),
                );
                RemovalOutcome::Failed {
                    shape,
                    zone_id,
                    error,
                }
            }
        }
    }

    /// Delete a zone by id, e.g. from its popup.
    ///
    /// Returns `None` when a delete for the zone is already in flight.
    pub async fn delete_zone(&self, zone_id: &str) -> Option<DeleteOutcome> {
        let bound = self.layer().find_by_zone(zone_id);
        if let Some(shape) = bound {
            let mut outcomes = self.on_shapes_deleted(&[shape]).await;
            match outcomes.pop() {
                Some(RemovalOutcome::Deleted { zone_id, .. }) => {
                    return Some(DeleteOutcome::Deleted(zone_id))
                }
                Some(RemovalOutcome::Failed { error, .. }) => {
                    return Some(DeleteOutcome::Failed(error))
                }
                Some(RemovalOutcome::InProgress { zone_id, .. }) => {
                    self.notifier.notify(
                        Notification::info("Deletion In Progress")
                            .with_detail(format!("Zone {} is already being deleted", zone_id)),
                    );
                    return None;
                }
                Some(RemovalOutcome::Unbound(_)) | None => {}
            }
        }

        let outcome = self.store.delete(zone_id).await;
        match &outcome {
            DeleteOutcome::Deleted(id) => self.notifier.notify(
                Notification::success("Zone Deleted").with_detail(format!("Zone {} removed", id)),
            ),
            DeleteOutcome::Failed(e) => self.notifier.notify(
                Notification::error("Delete Failed").with_detail(format!(
                    "{} ({}); zone remains active",
                    e,
                    e.category()
                )),
            ),
        }
        Some(outcome)
    }

    /// Render a confirmed shape for every zone in the store and drop shapes
    /// whose zone is gone. Returns the number of shapes added.
    ///
    /// A zone that shows up here before its own create is confirmed gets a
    /// shape now; the provisional shape folds into it on confirmation.
    pub async fn sync_from_store(&self) -> usize {
        let zones = self.store.snapshot().await;
        let ids: HashSet<&str> = zones.iter().map(|z| z.id.as_str()).collect();

        let mut layer = self.layer();
        let dropped = layer.retain_zones(|id| ids.contains(id));
        let mut added = 0;
        for zone in &zones {
            if layer.find_by_zone(&zone.id).is_none() {
                layer.add_confirmed(&zone.id, &zone.name, zone.geometry.to_lat_lng_ring());
                added += 1;
            }
        }
        debug!(added = added, dropped = dropped, "Shape layer synced with zone store");
        added
    }

    /// All shapes, including hidden ones pending removal
    pub fn shapes(&self) -> Vec<RenderedShape> {
        self.layer().shapes().to_vec()
    }

    pub fn visible_shapes(&self) -> Vec<RenderedShape> {
        self.layer().visible().cloned().collect()
    }

    pub fn shape(&self, id: ShapeId) -> Option<RenderedShape> {
        self.layer().get(id).cloned()
    }

    pub fn shape_for_zone(&self, zone_id: &str) -> Option<ShapeId> {
        self.layer().find_by_zone(zone_id)
    }

    pub fn provisional_count(&self) -> usize {
        self.layer().provisional_count()
    }
}
