//! Locally rendered zone shapes
//!
//! Shapes are kept in draw order. A shape is `Provisional` until the zone
//! service acknowledges it, and `PendingRemoval` while its deletion is in
//! flight (hidden, but restorable).

use crate::models::LatLng;
use serde::Serialize;
use uuid::Uuid;

/// Identity of a drawn shape, independent of any zone id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ShapeId(Uuid);

impl ShapeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ShapeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "zone_id", rename_all = "snake_case")]
pub enum ShapeStatus {
    /// Drawn, not yet acknowledged
    Provisional,
    /// Bound to a server zone
    Confirmed(String),
    /// Deletion in flight; hidden until confirmed or restored
    PendingRemoval(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedShape {
    pub id: ShapeId,
    pub name: String,
    /// Closed ring in (lat, lng) order
    pub ring: Vec<LatLng>,
    pub status: ShapeStatus,
}

impl RenderedShape {
    /// Zone id bound to the shape, if acknowledged
    pub fn zone_id(&self) -> Option<&str> {
        match &self.status {
            ShapeStatus::Provisional => None,
            ShapeStatus::Confirmed(id) | ShapeStatus::PendingRemoval(id) => Some(id),
        }
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self.status, ShapeStatus::PendingRemoval(_))
    }
}

/// Shape layer of the map
#[derive(Debug, Default)]
pub struct ShapeLayer {
    shapes: Vec<RenderedShape>,
}

impl ShapeLayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, id: ShapeId) -> Option<usize> {
        self.shapes.iter().position(|s| s.id == id)
    }

    pub fn get(&self, id: ShapeId) -> Option<&RenderedShape> {
        self.shapes.iter().find(|s| s.id == id)
    }

    pub fn add_provisional(&mut self, name: &str, ring: Vec<LatLng>) -> ShapeId {
        let id = ShapeId::new();
        self.shapes.push(RenderedShape {
            id,
            name: name.to_string(),
            ring,
            status: ShapeStatus::Provisional,
        });
        id
    }

    pub fn add_confirmed(&mut self, zone_id: &str, name: &str, ring: Vec<LatLng>) -> ShapeId {
        let id = ShapeId::new();
        self.shapes.push(RenderedShape {
            id,
            name: name.to_string(),
            ring,
            status: ShapeStatus::Confirmed(zone_id.to_string()),
        });
        id
    }

    /// Bind a provisional shape to its acknowledged zone
    pub fn confirm(&mut self, id: ShapeId, zone_id: &str, name: &str) -> bool {
        match self.shapes.iter_mut().find(|s| s.id == id) {
            Some(shape) if shape.status == ShapeStatus::Provisional => {
                shape.status = ShapeStatus::Confirmed(zone_id.to_string());
                shape.name = name.to_string();
                true
            }
            _ => false,
        }
    }

    /// Bind a provisional shape, folding it into a shape already rendered
    /// for the same zone (a store sync can get there first). Returns the
    /// shape that now represents the zone.
    pub fn confirm_or_merge(&mut self, id: ShapeId, zone_id: &str, name: &str) -> ShapeId {
        match self.find_by_zone(zone_id) {
            Some(existing) if existing != id => {
                self.remove(id);
                if let Some(shape) = self.shapes.iter_mut().find(|s| s.id == existing) {
                    shape.name = name.to_string();
                }
                existing
            }
            _ => {
                self.confirm(id, zone_id, name);
                id
            }
        }
    }

    /// Hide a confirmed shape while its deletion is in flight.
    /// Returns the bound zone id.
    pub fn begin_removal(&mut self, id: ShapeId) -> Option<String> {
        let shape = self.shapes.iter_mut().find(|s| s.id == id)?;
        match &shape.status {
            ShapeStatus::Confirmed(zone_id) => {
                let zone_id = zone_id.clone();
                shape.status = ShapeStatus::PendingRemoval(zone_id.clone());
                Some(zone_id)
            }
            _ => None,
        }
    }

    /// Undo `begin_removal`
    pub fn restore(&mut self, id: ShapeId) -> bool {
        match self.shapes.iter_mut().find(|s| s.id == id) {
            Some(shape) => match &shape.status {
                ShapeStatus::PendingRemoval(zone_id) => {
                    shape.status = ShapeStatus::Confirmed(zone_id.clone());
                    true
                }
                _ => false,
            },
            None => false,
        }
    }

    pub fn remove(&mut self, id: ShapeId) -> Option<RenderedShape> {
        self.position(id).map(|pos| self.shapes.remove(pos))
    }

    pub fn find_by_zone(&self, zone_id: &str) -> Option<ShapeId> {
        self.shapes
            .iter()
            .find(|s| s.zone_id() == Some(zone_id))
            .map(|s| s.id)
    }

    pub fn shapes(&self) -> &[RenderedShape] {
        &self.shapes
    }

    pub fn visible(&self) -> impl Iterator<Item = &RenderedShape> {
        self.shapes.iter().filter(|s| s.is_visible())
    }

    pub fn provisional_count(&self) -> usize {
        self.shapes
            .iter()
            .filter(|s| s.status == ShapeStatus::Provisional)
            .count()
    }

    /// Drop confirmed shapes whose zone is gone; pending ones are left alone
    pub fn retain_zones(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.shapes.len();
        self.shapes.retain(|s| match &s.status {
            ShapeStatus::Confirmed(zone_id) => keep(zone_id),
            _ => true,
        });
        before - self.shapes.len()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}
