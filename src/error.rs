//! Error handling for Geo-Guardian
//!
//! Every component error is local-recovery-first: none of them ends the
//! operator session. Each one carries a short `category()` that is shown to
//! the operator next to the human-readable message.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Zone list retrieval failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Zone creation failed
    #[error(transparent)]
    Create(#[from] CreateError),

    /// Zone deletion failed
    #[error(transparent)]
    Delete(#[from] DeleteError),

    /// Device location unavailable
    #[error(transparent)]
    Location(#[from] LocationError),

    /// Geocoding failed
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Push transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Drawn shape refused before submission
    #[error(transparent)]
    Draw(#[from] DrawError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short category string for operator-facing messages
    pub fn category(&self) -> &'static str {
        match self {
            Error::Fetch(e) => e.category(),
            Error::Create(e) => e.category(),
            Error::Delete(e) => e.category(),
            Error::Location(e) => e.category(),
            Error::Search(e) => e.category(),
            Error::Transport(_) => "transport",
            Error::Draw(e) => e.category(),
            Error::Serialization(_) => "protocol",
            Error::Http(_) => "network",
            Error::Io(_) => "io",
        }
    }
}

/// Zone list retrieval failure. The zone set degrades to empty.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("Network error while loading zones: {0}")]
    Network(String),

    #[error("Zone service returned HTTP {0}")]
    Status(u16),

    #[error("Zone service reported failure")]
    Rejected,

    #[error("Unreadable zone list: {0}")]
    Protocol(String),
}

impl FetchError {
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Status(code) if *code >= 500 => "server",
            FetchError::Status(_) => "rejected",
            FetchError::Rejected => "rejected",
            FetchError::Protocol(_) => "protocol",
        }
    }
}

/// Zone creation failure. Local state is left unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CreateError {
    #[error("Network error while saving zone: {0}")]
    Network(String),

    #[error("Zone rejected by service: {0}")]
    Rejected(String),

    #[error("Invalid zone: {0}")]
    Validation(String),

    #[error("Unreadable create response: {0}")]
    Protocol(String),
}

impl CreateError {
    pub fn category(&self) -> &'static str {
        match self {
            CreateError::Network(_) => "network",
            CreateError::Rejected(_) => "rejected",
            CreateError::Validation(_) => "validation",
            CreateError::Protocol(_) => "protocol",
        }
    }
}

/// Zone deletion failure. The zone remains active locally and remotely.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeleteError {
    #[error("Network error while deleting zone: {0}")]
    Network(String),

    #[error("Deletion rejected by service: {0}")]
    Rejected(String),

    #[error("Unreadable delete response: {0}")]
    Protocol(String),
}

impl DeleteError {
    pub fn category(&self) -> &'static str {
        match self {
            DeleteError::Network(_) => "network",
            DeleteError::Rejected(_) => "rejected",
            DeleteError::Protocol(_) => "protocol",
        }
    }
}

/// Device geolocation failure. The camera falls back to the default view.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("Geolocation is not supported on this device")]
    Unsupported,

    #[error("Location permission denied")]
    Denied,

    #[error("Position unavailable: {0}")]
    Unavailable(String),

    #[error("Location request timed out after {0}s")]
    Timeout(u64),
}

impl LocationError {
    pub fn category(&self) -> &'static str {
        match self {
            LocationError::Unsupported => "unsupported",
            LocationError::Denied => "denied",
            LocationError::Unavailable(_) => "unavailable",
            LocationError::Timeout(_) => "timeout",
        }
    }
}

/// Geocoding failure. The camera is left unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    #[error("Search query is empty")]
    EmptyQuery,

    #[error("Location not found. Try a different search.")]
    NoMatch,

    #[error("Search failed: {0}")]
    Request(String),
}

impl SearchError {
    pub fn category(&self) -> &'static str {
        match self {
            SearchError::EmptyQuery => "empty",
            SearchError::NoMatch => "no_match",
            SearchError::Request(_) => "network",
        }
    }
}

/// Push transport failure. Handled by the channel's reconnection loop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Stream returned HTTP {0}")]
    Status(u16),

    #[error("Stream broken: {0}")]
    Stream(String),
}

/// Drawn shape refused before it reaches the zone service
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DrawError {
    #[error("{0} drawing is disabled; only polygons can become zones")]
    UnsupportedShape(crate::drawing_session::ShapeKind),

    #[error("A zone needs at least 3 distinct vertices, got {0}")]
    TooFewVertices(usize),
}

impl DrawError {
    pub fn category(&self) -> &'static str {
        match self {
            DrawError::UnsupportedShape(_) => "unsupported",
            DrawError::TooFewVertices(_) => "validation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_status_category() {
        assert_eq!(FetchError::Status(503).category(), "server");
        assert_eq!(FetchError::Status(404).category(), "rejected");
    }

    #[test]
    fn test_crate_error_forwards_category() {
        let err: Error = CreateError::Network("reset".to_string()).into();
        assert_eq!(err.category(), "network");

        let err: Error = LocationError::Timeout(10).into();
        assert_eq!(err.category(), "timeout");
        assert_eq!(err.to_string(), "Location request timed out after 10s");
    }
}
