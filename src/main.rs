//! Geo-Guardian operator console
//!
//! ## Usage
//! ```bash
//! # List zones
//! geo-guardian zones
//!
//! # Draw a zone (name prompted on stdin when --name is omitted)
//! geo-guardian draw --point 19.07,72.87 --point 19.08,72.87 --point 19.08,72.88 --name "Flood Area"
//!
//! # Follow alerts until Ctrl-C
//! geo-guardian watch
//!
//! # Follow alerts from an event-stream endpoint instead of Socket.IO
//! geo-guardian --alert-transport sse --alert-url http://localhost:3000/api/alerts/stream watch
//! ```

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use colored::*;
use geo_guardian::{
    drawing_session::{DrawOutcome, DrawnShape, NamePrompt, PresetName},
    models::LatLng,
    notifier::{Notification, NotificationLevel, Notifier},
    view_controller::{CameraState, LocationState, ViewController},
    state::AlertTransportKind,
    AppConfig, AppState,
};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "geo-guardian")]
#[command(about = "Geo-Guardian operator console: danger zones and live alerts")]
struct Args {
    /// Zone service base URL (overrides GEO_GUARDIAN_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Alert endpoint URL (overrides GEO_GUARDIAN_ALERT_URL)
    #[arg(long, global = true)]
    alert_url: Option<String>,

    /// Alert protocol: socketio or sse (overrides GEO_GUARDIAN_ALERT_TRANSPORT)
    #[arg(long, global = true)]
    alert_transport: Option<AlertTransportKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and list danger zones
    Zones,
    /// Create a zone from polygon vertices
    Draw {
        /// Vertex as LAT,LNG (repeat, at least 3)
        #[arg(long = "point", value_parser = parse_lat_lng, required = true)]
        points: Vec<LatLng>,
        /// Zone name (prompted when omitted)
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a zone by id
    Delete { zone_id: String },
    /// Geocode a place and show the resulting camera
    Search { query: String },
    /// Resolve the device position
    Locate,
    /// Print danger alerts until Ctrl-C
    Watch,
}

fn parse_lat_lng(s: &str) -> std::result::Result<LatLng, String> {
    let (lat, lng) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got {:?}", s))?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("invalid latitude {:?}", lat))?;
    let lng: f64 = lng.trim().parse().map_err(|_| format!("invalid longitude {:?}", lng))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(format!("coordinates out of range: {}", s));
    }
    Ok(LatLng::new(lat, lng))
}

/// Prints notifications to the terminal
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, n: Notification) {
        let title = match n.level {
            NotificationLevel::Info => n.title.normal(),
            NotificationLevel::Success => n.title.green(),
            NotificationLevel::Warning => n.title.yellow(),
            NotificationLevel::Error => n.title.red(),
            NotificationLevel::Alert => format!("🚨 {}", n.title).on_red().white().bold(),
        };
        match &n.detail {
            Some(detail) => println!("{} {}", title, detail.dimmed()),
            None => println!("{}", title),
        }
    }
}

/// Reads the zone name from stdin
struct StdinPrompt;

impl NamePrompt for StdinPrompt {
    fn prompt_zone_name(&self) -> Option<String> {
        print!("Enter a name for this danger zone: ");
        std::io::stdout().flush().ok()?;
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

fn print_camera(camera: &CameraState) {
    let center = camera
        .center
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("   └─ center {} zoom {}", center.bold(), camera.zoom);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geo_guardian=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    // Load configuration
    let mut config = AppConfig::default();
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    if let Some(url) = args.alert_url {
        config.alert_url = url;
    }
    if let Some(kind) = args.alert_transport {
        config.alert_transport = kind;
    }
    tracing::debug!(
        api_url = %config.api_url,
        alert_url = %config.alert_url,
        alert_transport = ?config.alert_transport,
        geocoder_url = %config.geocoder_url,
        "Configuration loaded"
    );

    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let state = AppState::new(config, notifier.clone())?;

    match args.command {
        Command::Zones => list_zones(&state).await,
        Command::Draw { points, name } => draw(&state, points, name).await,
        Command::Delete { zone_id } => delete(&state, &zone_id).await,
        Command::Search { query } => {
            let mut view = ViewController::new(state.notifier.clone());
            let camera = view.search(state.geocoder.as_ref(), &query).await?;
            print_camera(&camera);
            Ok(())
        }
        Command::Locate => {
            let mut view = ViewController::new(state.notifier.clone());
            let camera = view
                .locate(state.geo.as_ref(), state.config.locate_timeout)
                .await;
            match view.location_state() {
                LocationState::Located(_) => println!("{}", "Device located".green()),
                _ => println!("{}", "Using default view".yellow()),
            }
            print_camera(&camera);
            Ok(())
        }
        Command::Watch => watch(&state).await,
    }
}

async fn list_zones(state: &AppState) -> Result<()> {
    if let Err(e) = state.zones.load_all().await {
        state.notifier.notify(
            Notification::warning("Failed to load danger zones")
                .with_detail(format!("{} ({})", e, e.category())),
        );
        return Ok(());
    }

    let zones = state.zones.snapshot().await;
    println!("{} {}", "Danger zones:".bold(), zones.len());
    for zone in zones {
        println!(
            "  {} {} {}",
            zone.id.dimmed(),
            zone.name.bold(),
            zone.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }
    Ok(())
}

async fn draw(state: &AppState, points: Vec<LatLng>, name: Option<String>) -> Result<()> {
    let prompt: Arc<dyn NamePrompt> = match name {
        Some(name) => Arc::new(PresetName(Some(name))),
        None => Arc::new(StdinPrompt),
    };
    let session = state.drawing_session(prompt);

    match session.on_shape_drawn(DrawnShape::polygon(points)).await? {
        DrawOutcome::Created { zone, .. } => {
            println!("   └─ id {}", zone.id.bold());
            Ok(())
        }
        DrawOutcome::Failed(e) => Err(anyhow!(e)),
    }
}

async fn delete(state: &AppState, zone_id: &str) -> Result<()> {
    // bind shapes first so the deletion goes through the shape layer
    if state.zones.load_all().await.is_err() {
        tracing::warn!("Zone list unavailable, deleting by id only");
    }
    let session = state.drawing_session(Arc::new(PresetName(None)));
    session.sync_from_store().await;

    let outcome = session
        .delete_zone(zone_id)
        .await
        .ok_or_else(|| anyhow!("zone {} is already being deleted", zone_id))?;
    outcome.into_result()?;
    Ok(())
}

async fn watch(state: &AppState) -> Result<()> {
    let mut view = ViewController::new(state.notifier.clone());
    view.locate(state.geo.as_ref(), state.config.locate_timeout)
        .await;
    if let Err(e) = state.zones.load_all().await {
        state.notifier.notify(
            Notification::warning("Failed to load danger zones")
                .with_detail(format!("{} ({})", e, e.category())),
        );
    }
    let map = view.map_view(&state.zones).await;
    println!(
        "{} {} zones, alerts from {}",
        "Watching".bold(),
        map.zones.len(),
        state.config.alert_url
    );
    print_camera(&map.camera);

    let channel = state.open_alert_channel()?;
    let notifier = state.notifier.clone();
    let subscription = channel.subscribe(move |alert| notifier.notify(Notification::from_alert(alert)));

    let mut states = channel.watch_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        tokio::select! {
            signal = &mut ctrl_c => break signal.map_err(anyhow::Error::from),
            changed = states.changed() => {
                if changed.is_err() {
                    break Err(anyhow!("alert channel stopped"));
                }
                let current = *states.borrow();
                tracing::info!(state = ?current, "Alert channel state changed");
            }
        }
    };

    subscription.unsubscribe();
    channel.close().await;
    println!("{}", "Stopped watching".dimmed());

    if let Err(e) = &result {
        bail!("watch ended: {}", e);
    }
    Ok(())
}
