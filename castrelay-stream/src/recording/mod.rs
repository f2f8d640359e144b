//! Out-of-process recording of admitted publishes.
//!
//! A [`RecordingJob`] is built once per admission and handed to the
//! [`RecordingSupervisor`], which runs it through a [`Recorder`] on its own
//! task. Jobs outlive the publish slot; the only thing that waits for them
//! is [`RecordingSupervisor::join_all`] at shutdown.

mod recorder;
mod supervisor;

pub use recorder::{FfmpegRecorder, NoopRecorder, Recorder};
pub use supervisor::{RecordingStats, RecordingSupervisor};

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One recording attempt.
#[derive(Debug, Clone)]
pub struct RecordingJob {
    pub id: Uuid,
    /// Where the recorder pulls the live stream from
    pub source_url: String,
    pub destination: PathBuf,
}

impl RecordingJob {
    /// Job for a publish on `stream_path`, reachable through the local end of
    /// the publisher's connection. The output file is named by the job id.
    pub fn for_publish(local_addr: SocketAddr, stream_path: &str, storage_root: &Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            source_url: format!("rtsp://{local_addr}/{}", stream_path.trim_start_matches('/')),
            destination: storage_root.join(id.to_string()),
        }
    }
}
