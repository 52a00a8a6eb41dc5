//! Error types for the cache core.
//!
//! Operations that can come back as a plain "miss" or "at capacity" keep
//! returning `Option`, never an `Err` — these error enums are reserved for
//! contract violations: malformed keys, protocol framing failures, and I/O
//! failures on the write path.

use thiserror::Error;

/// Errors raised while constructing cache components (keys, config).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("key field {field:?} contains a reserved character ('@' or '/')")]
    InvalidKeyField { field: String },

    #[error("canonical key length {len} exceeds the maximum of {max} bytes")]
    KeyTooLong { len: usize, max: usize },

    #[error("malformed canonical key: {key:?}")]
    MalformedKey { key: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors on the storage-backend data path.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("backend is closed")]
    Closed,

    #[error("remote connection error: {0}")]
    Connection(String),
}

/// Errors decoding or encoding the wire protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unexpected end of stream while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("unknown command code {0}")]
    UnknownCommand(i32),

    #[error("unknown response code {0}")]
    UnknownCode(i32),

    #[error("unknown dtype tag {0}")]
    UnknownDtype(i32),

    #[error("key field is not valid UTF-8")]
    InvalidKeyEncoding,

    #[error("{0}")]
    Key(#[from] ConfigError),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages_are_descriptive() {
        let err = ConfigError::KeyTooLong { len: 200, max: 150 };
        let msg = err.to_string();
        assert!(msg.contains("200"));
        assert!(msg.contains("150"));
    }

    #[test]
    fn protocol_error_wraps_config_error() {
        let inner = ConfigError::MalformedKey {
            key: "bad".to_string(),
        };
        let err: ProtocolError = inner.into();
        assert!(matches!(err, ProtocolError::Key(_)));
    }

    #[test]
    fn cache_error_wraps_protocol_error() {
        let inner = ProtocolError::UnknownCommand(99);
        let err: CacheError = inner.into();
        assert!(matches!(err, CacheError::Protocol(_)));
    }
}
