//! Error types for moorage

use std::fmt;

/// Unified error type for all moorage operations
#[derive(Debug)]
pub enum MoorageError {
    /// I/O error (socket operation, EOF during handshake)
    Io(std::io::Error),

    /// Configuration error (missing host key, unbindable address)
    Config(String),

    /// Protocol error (malformed packet, wrong packet type for state)
    Protocol(String),

    /// Cryptographic error (DH arithmetic, signature, key derivation)
    Crypto(String),

    /// Other error
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for MoorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoorageError::Io(e) => write!(f, "IO error: {}", e),
            MoorageError::Config(msg) => write!(f, "Configuration error: {}", msg),
            MoorageError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            MoorageError::Crypto(msg) => write!(f, "Crypto error: {}", msg),
            MoorageError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for MoorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MoorageError::Io(e) => Some(e),
            MoorageError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MoorageError {
    fn from(err: std::io::Error) -> Self {
        MoorageError::Io(err)
    }
}

/// Result type for moorage operations
pub type MoorageResult<T> = Result<T, MoorageError>;
