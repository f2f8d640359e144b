use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::{Recorder, RecordingJob};

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view of the supervisor's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingStats {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Removes a job from the in-flight set when its task ends, panics included.
struct InFlightGuard {
    id: Uuid,
    in_flight: Arc<DashMap<Uuid, RecordingJob>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

/// Starts one task per recording job and keeps them joinable.
///
/// The task set is tracked independently of the broker's slot lock, so a
/// long-running recorder never holds up admission or release.
pub struct RecordingSupervisor {
    recorder: Arc<dyn Recorder>,
    runtime: Handle,
    tracker: TaskTracker,
    in_flight: Arc<DashMap<Uuid, RecordingJob>>,
    counters: Arc<Counters>,
}

impl RecordingSupervisor {
    /// Tasks are spawned on `runtime`, so `start_recording` may be called
    /// from threads that are not part of it.
    pub fn new(recorder: Arc<dyn Recorder>, runtime: Handle) -> Self {
        Self {
            recorder,
            runtime,
            tracker: TaskTracker::new(),
            in_flight: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Register `job` and run it in the background. Never blocks.
    ///
    /// Failures are logged and counted; nothing is returned to the caller
    /// and the job is not retried.
    pub fn start_recording(&self, job: RecordingJob) {
        self.in_flight.insert(job.id, job.clone());
        self.counters.started.fetch_add(1, Ordering::Relaxed);

        let recorder = Arc::clone(&self.recorder);
        let counters = Arc::clone(&self.counters);
        let guard = InFlightGuard {
            id: job.id,
            in_flight: Arc::clone(&self.in_flight),
        };

        self.tracker.spawn_on(
            async move {
                let _guard = guard;
                tracing::info!(
                    job = %job.id,
                    source = %job.source_url,
                    destination = %job.destination.display(),
                    "Recording started"
                );

                match recorder.record(&job).await {
                    Ok(()) => {
                        counters.succeeded.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(job = %job.id, "Recording finished");
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(job = %job.id, error = %e, "Recording failed");
                    }
                }
            },
            &self.runtime,
        );
    }

    /// Wait for every recording, including ones started while waiting.
    ///
    /// Returns immediately if nothing was ever started.
    pub async fn join_all(&self) {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for recordings to finish");
        }
        self.tracker.wait().await;
        tracing::debug!("All recordings finished");
    }

    /// Jobs whose recorder has not exited yet.
    pub fn in_flight(&self) -> Vec<RecordingJob> {
        self.in_flight.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn in_flight_count(&self) -> usize {
        self.tracker.len()
    }

    pub fn stats(&self) -> RecordingStats {
        RecordingStats {
            started: self.counters.started.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}
