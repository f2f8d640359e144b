use async_trait::async_trait;
use castrelay_core::config::RecordingConfig;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::RecordingJob;
use crate::errors::RecordingError;

/// Runs a recording job to completion.
#[async_trait]
pub trait Recorder: Send + Sync + 'static {
    async fn record(&self, job: &RecordingJob) -> Result<(), RecordingError>;
}

/// Records by running ffmpeg in stream-copy mode.
#[derive(Debug, Clone)]
pub struct FfmpegRecorder {
    program: PathBuf,
    format: String,
}

impl FfmpegRecorder {
    pub fn new(program: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            format: format.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &RecordingConfig) -> Self {
        Self::new(config.ffmpeg_path.clone(), config.format.clone())
    }

    fn args(&self, job: &RecordingJob) -> Vec<OsString> {
        vec![
            "-i".into(),
            job.source_url.clone().into(),
            "-c".into(),
            "copy".into(),
            "-y".into(),
            "-f".into(),
            self.format.clone().into(),
            job.destination.clone().into_os_string(),
        ]
    }
}

#[async_trait]
impl Recorder for FfmpegRecorder {
    async fn record(&self, job: &RecordingJob) -> Result<(), RecordingError> {
        let mut command = Command::new(&self.program);
        command
            .args(self.args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // Own process group: a Ctrl-C on the relay's terminal must not cut
        // the recording short.
        #[cfg(unix)]
        command.process_group(0);

        tracing::debug!(program = %self.program.display(), args = ?self.args(job), "Spawning recorder");

        let mut child = command.spawn().map_err(|source| RecordingError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let status = child.wait().await.map_err(RecordingError::Wait)?;

        if status.success() {
            Ok(())
        } else {
            Err(RecordingError::ExitStatus(status))
        }
    }
}

/// Used when recording is disabled; completes immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

#[async_trait]
impl Recorder for NoopRecorder {
    async fn record(&self, job: &RecordingJob) -> Result<(), RecordingError> {
        tracing::debug!(job = %job.id, "Recording disabled, skipping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::path::Path;

    fn job() -> RecordingJob {
        let local: SocketAddr = "127.0.0.1:8554".parse().unwrap();
        RecordingJob::for_publish(local, "cam", Path::new("/tmp/rec"))
    }

    #[test]
    fn test_ffmpeg_arguments() {
        let recorder = FfmpegRecorder::new("/usr/bin/ffmpeg", "matroska");
        let job = job();
        let args = recorder.args(&job);

        let expected: Vec<OsString> = vec![
            "-i".into(),
            "rtsp://127.0.0.1:8554/cam".into(),
            "-c".into(),
            "copy".into(),
            "-y".into(),
            "-f".into(),
            "matroska".into(),
            job.destination.clone().into_os_string(),
        ];
        assert_eq!(args, expected);
    }

    #[test]
    fn test_from_config_defaults() {
        let recorder = FfmpegRecorder::from_config(&RecordingConfig::default());
        assert_eq!(recorder.program, Path::new("/usr/bin/ffmpeg"));
        assert_eq!(recorder.format, "flv");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let recorder = FfmpegRecorder::new("/nonexistent/castrelay-ffmpeg", "flv");
        let err = recorder.record(&job()).await.unwrap_err();
        assert!(matches!(err, RecordingError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_is_reported() {
        // `true` and `false` ignore their arguments.
        assert!(FfmpegRecorder::new("true", "flv").record(&job()).await.is_ok());

        let err = FfmpegRecorder::new("false", "flv")
            .record(&job())
            .await
            .unwrap_err();
        assert!(matches!(err, RecordingError::ExitStatus(status) if !status.success()));
    }

    #[tokio::test]
    async fn test_noop_recorder() {
        assert!(NoopRecorder.record(&job()).await.is_ok());
    }
}
