/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] pktlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] pktlink_frame::FrameError),

    /// Schema or registry error.
    #[error("schema error: {0}")]
    Schema(#[from] pktlink_schema::SchemaError),

    /// The peer closed the connection.
    #[error("transport closed")]
    Closed,
}

impl PeerError {
    /// Lift a frame error, separating an orderly close from other failures.
    pub(crate) fn from_frame(err: pktlink_frame::FrameError) -> Self {
        match err {
            pktlink_frame::FrameError::TransportClosed => PeerError::Closed,
            other => PeerError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
