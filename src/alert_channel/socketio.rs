//! Socket.IO push transport
//!
//! The alert backend is a Socket.IO server. One client session is opened per
//! `connect` and reconnects by itself after transport loss, so the frame
//! stream only ends when the session is dropped. Session loss and recovery
//! surface as [`SESSION_LOST_EVENT`] / [`SESSION_RESTORED_EVENT`] frames.

use super::transport::{FrameStream, PushFrame, PushTransport, ReconnectPolicy};
use super::ADMIN_ALERT_EVENT;
use crate::error::TransportError;
use async_trait::async_trait;
use futures::FutureExt;
use futures::StreamExt;
use rust_socketio::asynchronous::{Client, ClientBuilder};
use rust_socketio::{Event, Payload};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Frame emitted when the session drops and reconnection starts
pub const SESSION_LOST_EVENT: &str = "disconnect";
/// Frame emitted when the session is (re)established
pub const SESSION_RESTORED_EVENT: &str = "connect";

/// Socket.IO transport against the service root
pub struct SocketIoTransport {
    url: String,
    policy: ReconnectPolicy,
}

impl SocketIoTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn builder(&self, frames: mpsc::UnboundedSender<PushFrame>) -> ClientBuilder {
        let alerts = frames.clone();
        let restored = frames.clone();
        let lost = frames;

        let mut builder = ClientBuilder::new(self.url.as_str())
            .reconnect(true)
            .reconnect_on_disconnect(true)
            .reconnect_delay(
                self.policy.base_delay.as_millis() as u64,
                self.policy.max_delay.as_millis() as u64,
            )
            .on(ADMIN_ALERT_EVENT, move |payload: Payload, _: Client| {
                let alerts = alerts.clone();
                async move {
                    match frame_from_payload(ADMIN_ALERT_EVENT, payload) {
                        Some(frame) => {
                            let _ = alerts.send(frame);
                        }
                        None => warn!("admin_alert emitted without payload"),
                    }
                }
                .boxed()
            })
            .on(Event::Connect, move |_: Payload, _: Client| {
                let restored = restored.clone();
                async move {
                    let _ = restored.send(PushFrame::new(SESSION_RESTORED_EVENT, ""));
                }
                .boxed()
            })
            .on(Event::Close, move |_: Payload, _: Client| {
                let lost = lost.clone();
                async move {
                    let _ = lost.send(PushFrame::new(SESSION_LOST_EVENT, ""));
                }
                .boxed()
            })
            .on(Event::Error, |payload: Payload, _: Client| {
                async move { warn!(error = ?payload, "Socket.IO error") }.boxed()
            });

        if let Some(max) = self.policy.max_attempts {
            builder = builder.max_reconnect_attempts(max.min(u8::MAX as u32) as u8);
        }
        builder
    }
}

/// Frame for one emit. The first argument is the event data; a JSON string
/// argument is passed through as-is.
pub(crate) fn frame_from_payload(event: &str, payload: Payload) -> Option<PushFrame> {
    match payload {
        Payload::Text(values) => values.into_iter().next().map(|value| match value {
            serde_json::Value::String(text) => PushFrame::new(event, text),
            other => PushFrame::new(event, other.to_string()),
        }),
        Payload::Binary(bytes) => Some(PushFrame::new(event, String::from_utf8_lossy(&bytes))),
        other => {
            debug!(payload = ?other, "Unsupported Socket.IO payload");
            None
        }
    }
}

/// Disconnects the session when the frame stream is dropped
struct Session(Option<Client>);

impl Drop for Session {
    fn drop(&mut self) {
        let Some(client) = self.0.take() else {
            return;
        };
        // no runtime left at process exit; the socket closes with it
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = client.disconnect().await {
                    debug!(error = %e, "Socket.IO disconnect failed");
                }
            });
        }
    }
}

#[async_trait]
impl PushTransport for SocketIoTransport {
    async fn connect(&self) -> Result<FrameStream, TransportError> {
        debug!(url = %self.url, "Opening Socket.IO session");

        let (tx, rx) = mpsc::unbounded_channel();
        let client = self
            .builder(tx)
            .connect()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!(url = %self.url, "Socket.IO session opened");

        let frames = futures::stream::unfold(
            (rx, Session(Some(client))),
            |(mut rx, session)| async move {
                rx.recv().await.map(|frame| (Ok(frame), (rx, session)))
            },
        );
        Ok(frames.boxed())
    }

    fn reconnect_policy(&self) -> ReconnectPolicy {
        self.policy
    }

    fn describe(&self) -> String {
        format!("socket.io {}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_payload_becomes_json_frame() {
        let payload = Payload::Text(vec![json!({
            "message": "Device 7 entered Flood Area",
            "location": { "lat": 19.076, "lng": 72.8777 }
        })]);

        let frame = frame_from_payload(ADMIN_ALERT_EVENT, payload).unwrap();
        assert_eq!(frame.event, "admin_alert");

        let data: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(data["message"], "Device 7 entered Flood Area");
        assert_eq!(data["location"]["lng"], 72.8777);
    }

    #[test]
    fn test_string_payload_passes_through() {
        let payload = Payload::Text(vec![json!(r#"{"message":"pre-encoded"}"#)]);
        let frame = frame_from_payload(ADMIN_ALERT_EVENT, payload).unwrap();
        assert_eq!(frame.data, r#"{"message":"pre-encoded"}"#);
    }

    #[test]
    fn test_only_first_argument_is_used() {
        let payload = Payload::Text(vec![json!({ "message": "A" }), json!({ "ack": 1 })]);
        let frame = frame_from_payload(ADMIN_ALERT_EVENT, payload).unwrap();
        assert_eq!(frame.data, r#"{"message":"A"}"#);
    }

    #[test]
    fn test_empty_emit_has_no_frame() {
        assert_eq!(frame_from_payload(ADMIN_ALERT_EVENT, Payload::Text(vec![])), None);
    }

    #[test]
    fn test_binary_payload_is_read_as_text() {
        let payload = Payload::Binary(br#"{"message":"bin"}"#.to_vec().into());
        let frame = frame_from_payload(ADMIN_ALERT_EVENT, payload).unwrap();
        assert_eq!(frame.data, r#"{"message":"bin"}"#);
    }

    #[test]
    fn test_describe_names_protocol() {
        let transport = SocketIoTransport::new("https://geo-guardian-backend.onrender.com");
        assert_eq!(
            transport.describe(),
            "socket.io https://geo-guardian-backend.onrender.com"
        );
        assert_eq!(transport.reconnect_policy(), ReconnectPolicy::default());
    }
}
