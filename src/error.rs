//! Error types for chunktable

use std::fmt;

/// Result type alias for chunktable operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for chunktable
#[derive(Debug)]
pub enum Error {
    /// Backing-store call failed; `op` names the client call that failed
    Backend {
        op: &'static str,
        source: tonic::Status,
    },
    /// Chunk could not be encoded
    Encode(String),
    /// Chunk payload could not be decoded
    Decode(String),
    /// Backing store returned a row nobody asked for
    UnknownRow(String),
    /// Fewer rows came back than were requested
    ShortRead { requested: usize, received: usize },
    /// Schema routing failed
    Schema(String),
    /// Malformed external key
    InvalidKey(String),
    /// Shard index or prefix outside the keyspace
    InvalidShard(String),
    /// Operation not supported by this store
    MethodNotImplemented,
    /// Request context was cancelled
    Cancelled,
    /// Request context deadline passed
    DeadlineExceeded,
    /// Configuration errors
    Config(String),
    /// IO errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
    /// Internal error
    Internal(String),
}

impl Error {
    /// Wrap a backing-store status with the name of the call that produced it.
    pub fn backend(op: &'static str, source: tonic::Status) -> Self {
        Error::Backend { op, source }
    }

    /// The gRPC code of a backing-store failure, if this is one.
    pub fn backend_code(&self) -> Option<tonic::Code> {
        match self {
            Error::Backend { source, .. } => Some(source.code()),
            _ => None,
        }
    }

    /// True for request-context errors (cancellation or deadline).
    pub fn is_context(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Backend { source, .. } => Some(source),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Backend { op, source } => {
                write!(f, "{}: {} ({:?})", op, source.message(), source.code())
            }
            Error::Encode(msg) => write!(f, "Encode error: {}", msg),
            Error::Decode(msg) => write!(f, "Decode error: {}", msg),
            Error::UnknownRow(key) => write!(f, "Got row for unknown chunk: {}", key),
            Error::ShortRead {
                requested,
                received,
            } => write!(
                f,
                "Asked for {} chunks from the backing store, received {}",
                requested, received
            ),
            Error::Schema(msg) => write!(f, "Schema error: {}", msg),
            Error::InvalidKey(msg) => write!(f, "Invalid external key: {}", msg),
            Error::InvalidShard(msg) => write!(f, "Invalid shard: {}", msg),
            Error::MethodNotImplemented => write!(f, "method is not implemented"),
            Error::Cancelled => write!(f, "context canceled"),
            Error::DeadlineExceeded => write!(f, "context deadline exceeded"),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
