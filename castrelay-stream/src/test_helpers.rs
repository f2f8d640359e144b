//! Fixtures shared by the unit tests of this crate.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::errors::RecordingError;
use crate::recording::{Recorder, RecordingJob};

/// Recorder whose jobs finish only when the test releases them.
pub struct ControlledRecorder {
    gate: Semaphore,
    fail: bool,
}

impl ControlledRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            fail: true,
        })
    }

    /// Let `n` pending or future jobs finish.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl Recorder for ControlledRecorder {
    async fn record(&self, _job: &RecordingJob) -> Result<(), RecordingError> {
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        if self.fail {
            Err(RecordingError::Wait(std::io::Error::other("recorder died")))
        } else {
            Ok(())
        }
    }
}
