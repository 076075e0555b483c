/// Shared error type used across all agentsdk crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("session closed")]
    SessionClosed,

    #[error("event bus sealed")]
    BusSealed,

    #[error("transport closed")]
    TransportClosed,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("resource exceeded: {0}")]
    ResourceExceeded(String),

    #[error("no backend route: {0}")]
    NoBackendRoute(String),

    #[error("unbound channel: {0}")]
    UnboundChannel(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("integrity: {0}")]
    Integrity(String),

    #[error("canceled")]
    Canceled,

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
