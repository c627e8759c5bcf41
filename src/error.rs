use thiserror::Error;

/// Errors that can terminate startup or bubble out of a socket operation.
///
/// Handler-internal failures (malformed payload, missing field, service
/// utility missing) are never represented here — those are reply-then-continue
/// outcomes encoded directly into the wire reply, not control-flow errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}
