//! AlertChannel over a real event stream

mod common;

use common::{spawn_alert_hub, AlertHub};
use geo_guardian::alert_channel::{
    AlertChannel, ConnectionState, EventStreamTransport, ReconnectPolicy,
};
use geo_guardian::models::AlertEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

async fn open(hub: &Arc<AlertHub>) -> AlertChannel {
    let url = spawn_alert_hub(hub.clone()).await;
    let transport = EventStreamTransport::new(url).unwrap().with_policy(ReconnectPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        max_attempts: None,
    });
    AlertChannel::open(Arc::new(transport))
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for alert")
        .expect("subscription closed")
}

async fn next(rx: &mut mpsc::UnboundedReceiver<AlertEvent>) -> AlertEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for alert")
        .expect("subscription closed")
}

#[tokio::test]
async fn alerts_arrive_in_emission_order() {
    let hub = Arc::new(AlertHub::default());
    let channel = open(&hub).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = channel.subscribe(move |alert| {
        let _ = tx.send(alert.clone());
    });

    hub.wait_for_connections(1).await;
    hub.alert("A");
    hub.emit("zone_updated", r#"{"id":"Z1"}"#);
    hub.emit(
        "admin_alert",
        r#"{"message":"B","location":{"lat":19.0760,"lng":72.8777}}"#,
    );

    assert_eq!(next(&mut rx).await.message, "A");
    let b = next(&mut rx).await;
    assert_eq!(b.message, "B");
    assert_eq!(b.location.map(|l| l.lat), Some(19.0760));

    channel.close().await;
}

#[tokio::test]
async fn channel_reconnects_after_server_closes_stream() {
    let hub = Arc::new(AlertHub::default());
    let channel = open(&hub).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = channel.subscribe(move |alert| {
        let _ = tx.send(alert.message.clone());
    });

    hub.wait_for_connections(1).await;
    hub.alert("before");
    assert_eq!(tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap(), "before");

    hub.disconnect_all();
    hub.wait_for_connections(2).await;
    hub.alert("after");
    assert_eq!(tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap(), "after");

    channel.close().await;
}

#[tokio::test]
async fn late_subscriber_only_sees_later_alerts() {
    let hub = Arc::new(AlertHub::default());
    let channel = open(&hub).await;
    let (early_tx, mut early_rx) = mpsc::unbounded_channel();
    let _early = channel.subscribe(move |alert| {
        let _ = early_tx.send(alert.message.clone());
    });

    hub.wait_for_connections(1).await;
    hub.alert("first");
    assert_eq!(next_message(&mut early_rx).await, "first");

    let (late_tx, mut late_rx) = mpsc::unbounded_channel();
    let _late = channel.subscribe(move |alert| {
        let _ = late_tx.send(alert.message.clone());
    });
    hub.alert("second");

    assert_eq!(next_message(&mut late_rx).await, "second");
    assert_eq!(next_message(&mut early_rx).await, "second");
    assert!(late_rx.try_recv().is_err());

    channel.close().await;
}

#[tokio::test]
async fn alerts_emitted_while_disconnected_are_lost() {
    let hub = Arc::new(AlertHub::default());
    let channel = open(&hub).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = channel.subscribe(move |alert| {
        let _ = tx.send(alert.message.clone());
    });

    hub.wait_for_connections(1).await;
    hub.alert("connected");
    assert_eq!(next_message(&mut rx).await, "connected");

    hub.disconnect_all();
    hub.alert("missed");
    hub.wait_for_connections(2).await;
    hub.alert("reconnected");

    assert_eq!(next_message(&mut rx).await, "reconnected");
    assert!(rx.try_recv().is_err());

    channel.close().await;
}

#[tokio::test]
async fn no_delivery_after_unsubscribe() {
    let hub = Arc::new(AlertHub::default());
    let channel = open(&hub).await;

    let (gone_tx, mut gone_rx) = mpsc::unbounded_channel::<String>();
    let (kept_tx, mut kept_rx) = mpsc::unbounded_channel::<String>();
    let gone = channel.subscribe(move |alert| {
        let _ = gone_tx.send(alert.message.clone());
    });
    let _kept = channel.subscribe(move |alert| {
        let _ = kept_tx.send(alert.message.clone());
    });

    hub.wait_for_connections(1).await;
    gone.unsubscribe();
    assert_eq!(channel.subscriber_count(), 1);

    hub.alert("late");
    // the remaining subscriber proves the alert was dispatched
    assert_eq!(tokio::time::timeout(WAIT, kept_rx.recv()).await.unwrap().unwrap(), "late");
    assert!(gone_rx.try_recv().is_err());

    channel.close().await;
}

#[tokio::test]
async fn close_reports_closed_state() {
    let hub = Arc::new(AlertHub::default());
    let channel = open(&hub).await;
    let mut states = channel.watch_state();

    tokio::time::timeout(WAIT, states.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();

    channel.close().await;
    assert_eq!(channel.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn unreachable_endpoint_keeps_retrying_until_closed() {
    let transport = EventStreamTransport::new("http://127.0.0.1:9/api/alerts/stream")
        .unwrap()
        .with_policy(ReconnectPolicy {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            max_attempts: None,
        });
    let channel = AlertChannel::open(Arc::new(transport));
    let mut states = channel.watch_state();

    tokio::time::timeout(WAIT, states.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();

    channel.close().await;
    assert_eq!(channel.state(), ConnectionState::Closed);
}
