//! Error types for the gateway engine.

use plcsync_core::{CoreError, FaultKind};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the gateway engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A remote event does not have a shape the gateway understands.
    #[error("unexpected {event_type} event at {path}: {reason}")]
    UnexpectedEventShape {
        /// Event type as received.
        event_type: String,
        /// Event path.
        path: String,
        /// What was wrong.
        reason: String,
    },

    /// The remote store failed.
    #[error("remote store error at {path}: {message}")]
    Remote {
        /// Path being accessed.
        path: String,
        /// Error message.
        message: String,
    },

    /// A device session failed.
    #[error("session error: {0}")]
    Session(#[from] CoreError),

    /// An event that must carry a provenance marker did not.
    #[error("device {device_id} has no changer_id")]
    MissingProvenance {
        /// Device identity.
        device_id: String,
    },

    /// The gateway is not running.
    #[error("gateway is not running")]
    NotRunning,

    /// The gateway is already running.
    #[error("gateway is already running")]
    AlreadyRunning,

    /// A background thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name.
        name: &'static str,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Creates an unexpected event shape error.
    pub fn unexpected(event_type: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedEventShape {
            event_type: event_type.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a remote store error.
    pub fn remote(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns the fault class of this error.
    pub fn kind(&self) -> FaultKind {
        match self {
            EngineError::Session(e) => e.kind(),
            EngineError::Remote { .. } => FaultKind::RemoteStoreFault,
            EngineError::UnexpectedEventShape { .. }
            | EngineError::MissingProvenance { .. }
            | EngineError::NotRunning
            | EngineError::AlreadyRunning
            | EngineError::Spawn { .. } => FaultKind::ProtocolFault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_kinds() {
        assert_eq!(
            EngineError::remote("dev1", "timeout").kind(),
            FaultKind::RemoteStoreFault
        );
        assert_eq!(
            EngineError::unexpected("put", "/a/b", "null").kind(),
            FaultKind::ProtocolFault
        );
        let err = EngineError::from(CoreError::EmptySnapshot);
        assert_eq!(err.kind(), FaultKind::ShapeFault);
    }

    #[test]
    fn error_display() {
        let err = EngineError::MissingProvenance {
            device_id: "dev1".into(),
        };
        assert_eq!(err.to_string(), "device dev1 has no changer_id");
        assert_eq!(EngineError::NotRunning.to_string(), "gateway is not running");
    }
}
