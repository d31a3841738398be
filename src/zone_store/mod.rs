//! ZoneStore - Client-side zone state
//!
//! ## Responsibilities
//!
//! - Authoritative local mapping of zone id -> zone
//! - Create/delete round trips to the zone service
//! - Applying server acknowledgements to local state
//!
//! ## Invariants
//!
//! - A zone enters the local mapping only after the service acknowledged
//!   its creation, and leaves it only after the service acknowledged its
//!   deletion (or when a fresh list replaces the mapping).
//! - A failed load leaves the mapping empty. No partial set is cached.
//! - Mutations acknowledged while a load is in flight are replayed over the
//!   loaded list, so a list fetched before a delete cannot bring the deleted
//!   zone back.
//! - A list response older than one already applied is discarded.
//!
//! No lock is held across a network call. Two operations on the same zone
//! id are last-response-wins.

mod client;

pub use client::{HttpZoneApi, ZoneApi};

use crate::error::{CreateError, DeleteError, FetchError};
use crate::models::{PolygonGeometry, Zone, DEFAULT_ZONE_NAME};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Result of a create round trip
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// Acknowledged by the service and now present locally
    Created(Zone),
    /// Not acknowledged; local state unchanged
    Failed(CreateError),
}

impl CreateOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }

    pub fn into_result(self) -> Result<Zone, CreateError> {
        match self {
            CreateOutcome::Created(zone) => Ok(zone),
            CreateOutcome::Failed(e) => Err(e),
        }
    }
}

/// Result of a delete round trip
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// Acknowledged by the service and removed locally
    Deleted(String),
    /// Not acknowledged; the zone stays active
    Failed(DeleteError),
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted(_))
    }

    pub fn into_result(self) -> Result<String, DeleteError> {
        match self {
            DeleteOutcome::Deleted(id) => Ok(id),
            DeleteOutcome::Failed(e) => Err(e),
        }
    }
}

/// Acknowledged mutation recorded while a load is in flight
#[derive(Debug, Clone)]
enum Mutation {
    Created(Zone),
    Deleted(String),
}

#[derive(Debug, Default)]
struct StoreState {
    zones: HashMap<String, Zone>,
    loaded: bool,
    loads_in_flight: usize,
    /// Sequence number handed to the next load
    next_load_seq: u64,
    /// Sequence number of the newest applied load
    applied_load_seq: Option<u64>,
    journal: Vec<Mutation>,
}

impl StoreState {
    fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::Created(zone) => {
                self.zones.insert(zone.id.clone(), zone.clone());
            }
            Mutation::Deleted(id) => {
                self.zones.remove(id);
            }
        }
    }

    fn record(&mut self, mutation: Mutation) {
        self.apply(&mutation);
        if self.loads_in_flight > 0 {
            self.journal.push(mutation);
        }
    }

    fn finish_load(&mut self) {
        self.loads_in_flight = self.loads_in_flight.saturating_sub(1);
        if self.loads_in_flight == 0 {
            self.journal.clear();
        }
    }
}

/// Fall back to the default name for empty input
pub fn normalize_zone_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_ZONE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// ZoneStore instance
pub struct ZoneStore {
    api: Arc<dyn ZoneApi>,
    state: RwLock<StoreState>,
}

impl ZoneStore {
    /// Create new ZoneStore over a zone service
    pub fn new(api: Arc<dyn ZoneApi>) -> Self {
        Self {
            api,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Replace the local mapping with the service's current zone set.
    ///
    /// Returns the number of zones now held locally. On failure the mapping
    /// is cleared and the error is returned for the operator to see.
    pub async fn load_all(&self) -> Result<usize, FetchError> {
        let (seq, journal_start) = {
            let mut state = self.state.write().await;
            let seq = state.next_load_seq;
            state.next_load_seq += 1;
            state.loads_in_flight += 1;
            (seq, state.journal.len())
        };

        let result = self.api.list_zones().await;

        let mut state = self.state.write().await;
        let outcome = if state.applied_load_seq.is_some_and(|applied| applied > seq) {
            debug!(load_seq = seq, "Discarding stale zone list");
            match result {
                Ok(_) => Ok(state.zones.len()),
                Err(e) => Err(e),
            }
        } else {
            state.applied_load_seq = Some(seq);
            match result {
                Ok(zones) => {
                    state.zones = zones.into_iter().map(|z| (z.id.clone(), z)).collect();
                    let replay: Vec<Mutation> = state.journal[journal_start..].to_vec();
                    if !replay.is_empty() {
                        debug!(count = replay.len(), "Replaying mutations acknowledged during load");
                    }
                    for mutation in &replay {
                        state.apply(mutation);
                    }
                    state.loaded = true;
                    info!(count = state.zones.len(), "Zone set loaded");
                    Ok(state.zones.len())
                }
                Err(e) => {
                    state.zones.clear();
                    state.loaded = false;
                    warn!(error = %e, "Failed to load danger zones");
                    Err(e)
                }
            }
        };
        state.finish_load();
        outcome
    }

    /// Create a zone on the service and, on acknowledgment, add it locally
    pub async fn create(&self, name: &str, geometry: PolygonGeometry) -> CreateOutcome {
        let name = normalize_zone_name(name);

        if !geometry.is_valid_ring() {
            let e = CreateError::Validation(
                "polygon must be a closed ring of at least 4 positions".to_string(),
            );
            warn!(name = %name, error = %e, "Refusing to send invalid zone");
            return CreateOutcome::Failed(e);
        }

        match self.api.create_zone(&name, &geometry).await {
            Ok(zone) => {
                let mut state = self.state.write().await;
                state.record(Mutation::Created(zone.clone()));
                info!(zone_id = %zone.id, name = %zone.name, "Zone added to local state");
                CreateOutcome::Created(zone)
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Zone creation failed");
                CreateOutcome::Failed(e)
            }
        }
    }

    /// Delete a zone on the service and, on acknowledgment, remove it locally
    pub async fn delete(&self, zone_id: &str) -> DeleteOutcome {
        match self.api.delete_zone(zone_id).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                state.record(Mutation::Deleted(zone_id.to_string()));
                info!(zone_id = %zone_id, "Zone removed from local state");
                DeleteOutcome::Deleted(zone_id.to_string())
            }
            Err(e) => {
                warn!(zone_id = %zone_id, error = %e, "Zone deletion failed, zone remains active");
                DeleteOutcome::Failed(e)
            }
        }
    }

    /// Current zones ordered by creation time, then id
    pub async fn snapshot(&self) -> Vec<Zone> {
        let state = self.state.read().await;
        let mut zones: Vec<Zone> = state.zones.values().cloned().collect();
        zones.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        zones
    }

    pub async fn get(&self, zone_id: &str) -> Option<Zone> {
        self.state.read().await.zones.get(zone_id).cloned()
    }

    pub async fn contains(&self, zone_id: &str) -> bool {
        self.state.read().await.zones.contains_key(zone_id)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.zones.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.zones.is_empty()
    }

    /// Whether the last applied load succeeded
    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.loaded
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{GeometryType, LatLng};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    pub(crate) fn square() -> PolygonGeometry {
        PolygonGeometry::from_lat_lng(&[
            LatLng::new(20.0, 78.0),
            LatLng::new(20.0, 78.1),
            LatLng::new(20.1, 78.1),
            LatLng::new(20.1, 78.0),
        ])
    }

    pub(crate) fn zone(id: &str, name: &str, minute: u32) -> Zone {
        Zone {
            id: id.to_string(),
            name: name.to_string(),
            geometry: square(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 13, 10, minute, 0).unwrap(),
        }
    }

    /// Scripted zone service
    #[derive(Default)]
    pub(crate) struct FakeZoneApi {
        pub lists: Mutex<VecDeque<Result<Vec<Zone>, FetchError>>>,
        pub creates: Mutex<VecDeque<Result<Zone, CreateError>>>,
        pub delete_failures: Mutex<HashMap<String, DeleteError>>,
        pub created_names: Mutex<Vec<String>>,
        pub create_calls: AtomicUsize,
        pub delete_calls: AtomicUsize,
        /// (entered, release) pair for the next list call
        pub list_gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
        /// (entered, release) pair for the next create call
        pub create_gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
        /// (entered, release) pair for the next delete call
        pub delete_gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
    }

    impl FakeZoneApi {
        pub fn push_list(&self, result: Result<Vec<Zone>, FetchError>) {
            self.lists.lock().unwrap().push_back(result);
        }

        pub fn push_create(&self, result: Result<Zone, CreateError>) {
            self.creates.lock().unwrap().push_back(result);
        }

        pub fn fail_delete(&self, id: &str, error: DeleteError) {
            self.delete_failures
                .lock()
                .unwrap()
                .insert(id.to_string(), error);
        }

        /// Gate the next list call: returns (entered, release)
        pub fn gate_list(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
            let (entered_tx, entered_rx) = oneshot::channel();
            let (release_tx, release_rx) = oneshot::channel();
            *self.list_gate.lock().unwrap() = Some((entered_tx, release_rx));
            (entered_rx, release_tx)
        }

        /// Gate the next create call: returns (entered, release)
        pub fn gate_create(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
            let (entered_tx, entered_rx) = oneshot::channel();
            let (release_tx, release_rx) = oneshot::channel();
            *self.create_gate.lock().unwrap() = Some((entered_tx, release_rx));
            (entered_rx, release_tx)
        }

        /// Gate the next delete call: returns (entered, release)
        pub fn gate_delete(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
            let (entered_tx, entered_rx) = oneshot::channel();
            let (release_tx, release_rx) = oneshot::channel();
            *self.delete_gate.lock().unwrap() = Some((entered_tx, release_rx));
            (entered_rx, release_tx)
        }
    }

    #[async_trait]
    impl ZoneApi for FakeZoneApi {
        async fn list_zones(&self) -> Result<Vec<Zone>, FetchError> {
            let result = self
                .lists
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![]));
            let gate = self.list_gate.lock().unwrap().take();
            if let Some((entered, release)) = gate {
                let _ = entered.send(());
                let _ = release.await;
            }
            result
        }

        async fn create_zone(
            &self,
            name: &str,
            _geometry: &PolygonGeometry,
        ) -> Result<Zone, CreateError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.created_names.lock().unwrap().push(name.to_string());
            let gate = self.create_gate.lock().unwrap().take();
            if let Some((entered, release)) = gate {
                let _ = entered.send(());
                let _ = release.await;
            }
            self.creates
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CreateError::Network("no scripted response".to_string())))
        }

        async fn delete_zone(&self, zone_id: &str) -> Result<(), DeleteError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.delete_gate.lock().unwrap().take();
            if let Some((entered, release)) = gate {
                let _ = entered.send(());
                let _ = release.await;
            }
            tokio::task::yield_now().await;
            match self.delete_failures.lock().unwrap().get(zone_id) {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    fn store_with(api: &Arc<FakeZoneApi>) -> ZoneStore {
        ZoneStore::new(api.clone())
    }

    async fn ids(store: &ZoneStore) -> Vec<String> {
        store.snapshot().await.into_iter().map(|z| z.id).collect()
    }

    #[tokio::test]
    async fn test_load_then_delete() {
        let api = Arc::new(FakeZoneApi::default());
        api.push_list(Ok(vec![zone("z1", "School", 0), zone("z2", "River", 1)]));
        let store = store_with(&api);

        assert_eq!(store.load_all().await, Ok(2));
        assert_eq!(ids(&store).await, vec!["z1", "z2"]);

        let outcome = store.delete("z1").await;
        assert_eq!(outcome, DeleteOutcome::Deleted("z1".to_string()));
        assert_eq!(ids(&store).await, vec!["z2"]);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_empty_set() {
        let api = Arc::new(FakeZoneApi::default());
        api.push_list(Ok(vec![zone("z1", "School", 0)]));
        api.push_list(Err(FetchError::Status(503)));
        let store = store_with(&api);

        store.load_all().await.unwrap();
        assert_eq!(store.len().await, 1);

        let err = store.load_all().await.unwrap_err();
        assert_eq!(err, FetchError::Status(503));
        assert!(store.is_empty().await);
        assert!(!store.is_loaded().await);
    }

    #[tokio::test]
    async fn test_successful_creates_match_server_ids() {
        let api = Arc::new(FakeZoneApi::default());
        let store = store_with(&api);
        let returned = ["a1", "a2", "a3"];
        for (i, id) in returned.iter().enumerate() {
            api.push_create(Ok(zone(id, "Zone", i as u32)));
        }

        for _ in 0..returned.len() {
            assert!(store.create("Zone", square()).await.is_created());
        }

        assert_eq!(store.len().await, returned.len());
        assert_eq!(ids(&store).await, returned);
    }

    #[tokio::test]
    async fn test_rejected_create_leaves_state_unchanged() {
        let api = Arc::new(FakeZoneApi::default());
        api.push_list(Ok(vec![zone("z1", "School", 0)]));
        api.push_create(Err(CreateError::Rejected("service reported failure".to_string())));
        let store = store_with(&api);
        store.load_all().await.unwrap();

        let outcome = store.create("Flood Area", square()).await;
        assert!(matches!(outcome, CreateOutcome::Failed(CreateError::Rejected(_))));
        assert_eq!(ids(&store).await, vec!["z1"]);
    }

    #[tokio::test]
    async fn test_invalid_geometry_never_sent() {
        let api = Arc::new(FakeZoneApi::default());
        let store = store_with(&api);
        let open = PolygonGeometry {
            geometry_type: GeometryType::Polygon,
            coordinates: vec![vec![[78.0, 20.0], [78.1, 20.0]]],
        };

        let outcome = store.create("Bad", open).await;
        assert!(matches!(outcome, CreateOutcome::Failed(CreateError::Validation(_))));
        assert_eq!(api.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_zone() {
        let api = Arc::new(FakeZoneApi::default());
        api.push_list(Ok(vec![zone("z1", "School", 0)]));
        api.fail_delete("z1", DeleteError::Network("connection reset".to_string()));
        let store = store_with(&api);
        store.load_all().await.unwrap();

        let outcome = store.delete("z1").await;
        assert!(!outcome.is_deleted());
        assert!(store.contains("z1").await);
    }

    #[tokio::test]
    async fn test_concurrent_deletes_are_independent() {
        let api = Arc::new(FakeZoneApi::default());
        api.push_list(Ok(vec![
            zone("z1", "A", 0),
            zone("z2", "B", 1),
            zone("z3", "C", 2),
        ]));
        api.fail_delete("z2", DeleteError::Rejected("locked".to_string()));
        let store = store_with(&api);
        store.load_all().await.unwrap();

        let (a, b, c) = tokio::join!(store.delete("z1"), store.delete("z2"), store.delete("z3"));
        assert!(a.is_deleted());
        assert!(!b.is_deleted());
        assert!(c.is_deleted());
        assert_eq!(ids(&store).await, vec!["z2"]);
    }

    #[tokio::test]
    async fn test_stale_list_does_not_resurrect_deleted_zone() {
        let api = Arc::new(FakeZoneApi::default());
        api.push_list(Ok(vec![zone("z1", "A", 0), zone("z2", "B", 1)]));
        let store = Arc::new(store_with(&api));
        store.load_all().await.unwrap();

        // reload fetched before the delete lands
        api.push_list(Ok(vec![zone("z1", "A", 0), zone("z2", "B", 1)]));
        let (entered, release) = api.gate_list();
        let reload = tokio::spawn({
            let store = store.clone();
            async move { store.load_all().await }
        });
        entered.await.unwrap();

        assert!(store.delete("z1").await.is_deleted());
        release.send(()).unwrap();

        assert_eq!(reload.await.unwrap(), Ok(1));
        assert_eq!(ids(&store).await, vec!["z2"]);
    }

    #[tokio::test]
    async fn test_create_during_load_survives() {
        let api = Arc::new(FakeZoneApi::default());
        api.push_list(Ok(vec![zone("z1", "A", 0)]));
        api.push_create(Ok(zone("z9", "New", 5)));
        let store = Arc::new(store_with(&api));

        let (entered, release) = api.gate_list();
        let load = tokio::spawn({
            let store = store.clone();
            async move { store.load_all().await }
        });
        entered.await.unwrap();

        assert!(store.create("New", square()).await.is_created());
        release.send(()).unwrap();

        load.await.unwrap().unwrap();
        assert_eq!(ids(&store).await, vec!["z1", "z9"]);
    }

    #[test]
    fn test_normalize_zone_name() {
        assert_eq!(normalize_zone_name("  "), DEFAULT_ZONE_NAME);
        assert_eq!(normalize_zone_name(" Flood Area "), "Flood Area");
    }
}
