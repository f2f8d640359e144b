use std::path::PathBuf;
use std::process::ExitStatus;

/// Per-request failures of the publish slot. None of them are fatal.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    #[error("someone is already publishing")]
    AlreadyPublishing,
    #[error("no one is publishing")]
    NotFound,
    #[error("stream distributor is closed")]
    DistributorClosed,
}

/// Why a recording attempt ended badly. Only ever logged.
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("failed to start recorder {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for recorder: {0}")]
    Wait(#[source] std::io::Error),
    #[error("recorder exited with {0}")]
    ExitStatus(ExitStatus),
}

/// Outcome of the protocol engine's run loop.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine was closed on request. Not a failure.
    #[error("terminated")]
    Terminated,
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine error: {0}")]
    Protocol(String),
}

impl EngineError {
    #[must_use]
    pub const fn is_clean_termination(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_messages() {
        assert_eq!(
            StreamError::AlreadyPublishing.to_string(),
            "someone is already publishing"
        );
        assert_eq!(StreamError::NotFound.to_string(), "no one is publishing");
    }

    #[test]
    fn test_engine_error_clean_termination() {
        assert!(EngineError::Terminated.is_clean_termination());
        assert!(!EngineError::Protocol("listener died".to_string()).is_clean_termination());
        let io: EngineError = std::io::Error::other("boom").into();
        assert!(!io.is_clean_termination());
    }
}
