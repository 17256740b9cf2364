// src/error.rs - Error taxonomy shared by transport, protocol and motion layers
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountError {
    /// Port missing, busy, or the link could not be established.
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),
    #[error("Timeout after {0:?} waiting for reply")]
    Timeout(Duration),
    /// Reply bytes could not be framed. The link may be out of step.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Command error: {0}")]
    CommandError(String),
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("Not connected to mount")]
    NotConnected,
    #[error("Serial port error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl MountError {
    /// True for failures where the mount may have missed or half-read a
    /// command, so its physical state is no longer known.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            MountError::Timeout(_) | MountError::MalformedResponse(_) | MountError::Io(_)
        )
    }
}

pub type MountResult<T> = Result<T, MountError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_failure_classification() {
        assert!(MountError::Timeout(Duration::from_secs(2)).is_link_failure());
        assert!(MountError::MalformedResponse("short".into()).is_link_failure());
        assert!(!MountError::NotConnected.is_link_failure());
        assert!(!MountError::InvalidCoordinate("ra".into()).is_link_failure());
    }

    #[test]
    fn test_timeout_message_names_window() {
        let msg = MountError::Timeout(Duration::from_millis(2000)).to_string();
        assert!(msg.contains("2s"), "{}", msg);
    }
}
