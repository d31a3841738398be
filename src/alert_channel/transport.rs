//! Push transports
//!
//! A transport opens one connection at a time and yields the frames the
//! server pushes on it. When a frame stream ends, the channel reconnects
//! using the transport's [`ReconnectPolicy`].

use super::sse::SseDecoder;
use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

/// One server-pushed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFrame {
    pub event: String,
    pub data: String,
}

impl PushFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Frames of one connection. Ends when the connection closes.
pub type FrameStream = BoxStream<'static, Result<PushFrame, TransportError>>;

/// Exponential reconnection backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnection attempt `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Persistent push connection to the alert source
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a connection
    async fn connect(&self) -> Result<FrameStream, TransportError>;

    /// Backoff applied between connections
    fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::default()
    }

    /// Human-readable endpoint for logs
    fn describe(&self) -> String;
}

/// `text/event-stream` transport over HTTP
pub struct EventStreamTransport {
    http: Client,
    url: String,
    policy: ReconnectPolicy,
}

impl EventStreamTransport {
    /// Create transport for the given stream URL
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        // no overall request timeout: the response body is the long-lived stream
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
            policy: ReconnectPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl PushTransport for EventStreamTransport {
    async fn connect(&self) -> Result<FrameStream, TransportError> {
        debug!(url = %self.url, "Opening event stream");

        let resp = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        info!(url = %self.url, "Event stream opened");

        let bytes = Box::pin(resp.bytes_stream());
        let frames = futures::stream::unfold(
            (bytes, SseDecoder::new(), VecDeque::new()),
            |(mut bytes, mut decoder, mut pending)| async move {
                loop {
                    if let Some(frame) = pending.pop_front() {
                        return Some((Ok(frame), (bytes, decoder, pending)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                        Some(Err(e)) => {
                            return Some((
                                Err(TransportError::Stream(e.to_string())),
                                (bytes, decoder, pending),
                            ))
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(frames.boxed())
    }

    fn reconnect_policy(&self) -> ReconnectPolicy {
        self.policy
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
