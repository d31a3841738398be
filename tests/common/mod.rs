//! In-process mock collaborators for integration tests

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Utc;
use futures::Stream;
use geo_guardian::models::{CreateZoneRequest, Zone};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

/// Bind to an ephemeral port and serve `app` in the background
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ========================================
// Zone service
// ========================================

#[derive(Default)]
pub struct ZoneService {
    pub zones: Mutex<Vec<Zone>>,
    next_id: AtomicUsize,
    pub reject_creates: AtomicBool,
    /// Status returned by `GET /zones` instead of the list
    pub list_status: Mutex<Option<StatusCode>>,
    pub requests: AtomicUsize,
}

impl ZoneService {
    pub fn seed(&self, zone: Zone) {
        self.zones.lock().unwrap().push(zone);
    }

    pub fn ids(&self) -> Vec<String> {
        self.zones.lock().unwrap().iter().map(|z| z.id.clone()).collect()
    }
}

async fn list_zones(State(svc): State<Arc<ZoneService>>) -> impl IntoResponse {
    svc.requests.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = *svc.list_status.lock().unwrap() {
        return (status, Json(json!({ "success": false, "message": "unavailable" })));
    }
    let zones = svc.zones.lock().unwrap().clone();
    (StatusCode::OK, Json(json!({ "success": true, "zones": zones })))
}

async fn create_zone(
    State(svc): State<Arc<ZoneService>>,
    Json(req): Json<CreateZoneRequest>,
) -> impl IntoResponse {
    svc.requests.fetch_add(1, Ordering::SeqCst);
    if svc.reject_creates.load(Ordering::SeqCst) {
        return (
            StatusCode::OK,
            Json(json!({ "success": false, "message": "Failed to save zone" })),
        );
    }
    let n = svc.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let zone = Zone {
        id: format!("65f1c0de{:04}", n),
        name: req.name,
        geometry: req.geometry,
        created_at: Utc::now(),
    };
    svc.zones.lock().unwrap().push(zone.clone());
    (StatusCode::CREATED, Json(json!({ "success": true, "zone": zone })))
}

async fn delete_zone(
    State(svc): State<Arc<ZoneService>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    svc.requests.fetch_add(1, Ordering::SeqCst);
    let mut zones = svc.zones.lock().unwrap();
    let before = zones.len();
    zones.retain(|z| z.id != id);
    if zones.len() == before {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Zone not found" })),
        );
    }
    (StatusCode::OK, Json(json!({ "success": true, "message": "Zone deleted" })))
}

/// Zone service mounted under `/api`; returns the base URL
pub async fn spawn_zone_service(svc: Arc<ZoneService>) -> String {
    let app = Router::new()
        .route("/api/zones", get(list_zones).post(create_zone))
        .route("/api/zones/:id", delete(delete_zone))
        .with_state(svc);
    let addr = serve(app).await;
    format!("http://{}/api", addr)
}

// ========================================
// Alert stream
// ========================================

/// Event-stream endpoint with controllable connections
pub struct AlertHub {
    clients: Mutex<Vec<mpsc::UnboundedSender<Event>>>,
    connections: watch::Sender<usize>,
}

impl Default for AlertHub {
    fn default() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            connections: watch::channel(0).0,
        }
    }
}

impl AlertHub {
    /// Emit to every connected client
    pub fn emit(&self, event: &str, data: &str) {
        let clients = self.clients.lock().unwrap();
        for client in clients.iter() {
            let _ = client.send(Event::default().event(event).data(data));
        }
    }

    pub fn alert(&self, message: &str) {
        self.emit("admin_alert", &json!({ "message": message }).to_string());
    }

    /// End every open stream
    pub fn disconnect_all(&self) {
        self.clients.lock().unwrap().clear();
    }

    /// Wait until at least `n` connections have been accepted in total
    pub async fn wait_for_connections(&self, n: usize) {
        let mut rx = self.connections.subscribe();
        tokio::time::timeout(std::time::Duration::from_secs(5), rx.wait_for(|c| *c >= n))
            .await
            .expect("timed out waiting for stream connection")
            .unwrap();
    }
}

async fn alert_stream(
    State(hub): State<Arc<AlertHub>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    hub.clients.lock().unwrap().push(tx);
    hub.connections.send_modify(|c| *c += 1);

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });
    Sse::new(stream)
}

/// Alert stream at `/api/alerts/stream`; returns the stream URL
pub async fn spawn_alert_hub(hub: Arc<AlertHub>) -> String {
    let app = Router::new()
        .route("/api/alerts/stream", get(alert_stream))
        .with_state(hub);
    let addr = serve(app).await;
    format!("http://{}/api/alerts/stream", addr)
}

// ========================================
// Geocoder
// ========================================

async fn nominatim_search(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    let query = params.get("q").cloned().unwrap_or_default();
    if params.get("format").map(String::as_str) != Some("json") {
        return (StatusCode::BAD_REQUEST, Json(json!([])));
    }
    let body = match query.as_str() {
        "Mumbai" => json!([{
            "lat": "19.0759837",
            "lon": "72.8776559",
            "display_name": "Mumbai, Mumbai Suburban, Maharashtra, India"
        }]),
        "boom" => return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!([]))),
        _ => json!([]),
    };
    (StatusCode::OK, Json(body))
}

/// Nominatim-compatible search; returns the base URL
pub async fn spawn_geocoder() -> String {
    let app = Router::new().route("/search", get(nominatim_search));
    let addr = serve(app).await;
    format!("http://{}", addr)
}
