//! Process lifetime around the protocol engine.
//!
//! The engine runs until it fails or is closed. On a shutdown request the
//! relay either closes it right away, or first releases the publisher and
//! waits for the recordings when `graceful_stop` is set. Either way every
//! recording is joined before [`RelayServer::run`] returns.

use async_trait::async_trait;
use castrelay_core::config::{Config, RelayConfig};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info};

use crate::broker::StreamBroker;
use crate::errors::EngineError;
use crate::handler::RelayHandler;
use crate::recording::{FfmpegRecorder, NoopRecorder, Recorder, RecordingSupervisor};

/// The external protocol engine, seen from the relay.
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Resolves once the engine has stopped serving. A stop caused by
    /// [`ProtocolEngine::close`] yields `Ok(())` or [`EngineError::Terminated`].
    async fn wait(&self) -> Result<(), EngineError>;

    /// Ask the engine to stop. Must not block.
    fn close(&self);
}

pub struct RelayServer {
    config: RelayConfig,
    broker: Arc<StreamBroker>,
    handler: Arc<RelayHandler>,
}

impl RelayServer {
    pub fn new(config: &Config, recorder: Arc<dyn Recorder>, runtime: Handle) -> Self {
        let recordings = Arc::new(RecordingSupervisor::new(recorder, runtime));
        let broker = Arc::new(StreamBroker::new(recordings));
        let handler = Arc::new(RelayHandler::new(
            Arc::clone(&broker),
            config.recording.storage_root.clone(),
        ));

        Self {
            config: config.relay.clone(),
            broker,
            handler,
        }
    }

    /// Build from configuration on the current tokio runtime, recording with
    /// ffmpeg unless recording is disabled.
    pub fn from_config(config: &Config) -> Result<Self, tokio::runtime::TryCurrentError> {
        let runtime = Handle::try_current()?;
        let recorder: Arc<dyn Recorder> = if config.recording.enabled {
            Arc::new(FfmpegRecorder::from_config(&config.recording))
        } else {
            info!("Recording disabled");
            Arc::new(NoopRecorder)
        };
        Ok(Self::new(config, recorder, runtime))
    }

    /// Callbacks to register with the protocol engine.
    pub fn handler(&self) -> Arc<RelayHandler> {
        Arc::clone(&self.handler)
    }

    pub fn broker(&self) -> &Arc<StreamBroker> {
        &self.broker
    }

    /// Serve until the engine stops, then wait for all recordings.
    ///
    /// A clean termination returns `Ok`; any other engine error is returned
    /// once the recordings have finished.
    pub async fn run<E, S>(&self, engine: &E, shutdown: S) -> Result<(), EngineError>
    where
        E: ProtocolEngine + ?Sized,
        S: Future<Output = ()> + Send,
    {
        let recordings = self.broker.recordings();
        info!(
            rtsp_address = %self.config.rtsp_address,
            graceful_stop = self.config.graceful_stop,
            "Relay ready"
        );

        let wait = engine.wait();
        tokio::pin!(wait);

        let result = tokio::select! {
            result = &mut wait => result,
            () = shutdown => {
                info!("Shutdown requested");
                if self.config.graceful_stop {
                    if let Some(session) = self.broker.release_current() {
                        info!(session = %session, "Released publisher before stopping");
                    }
                    recordings.join_all().await;
                }
                engine.close();
                wait.await
            }
        };

        let outcome = match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_clean_termination() => Ok(()),
            Err(e) => {
                error!(error = %e, "Protocol engine failed");
                Err(e)
            }
        };

        recordings.join_all().await;
        info!(stats = ?recordings.stats(), "Relay done");
        outcome
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define::{SessionId, Track, TrackKind};
    use crate::recording::RecordingJob;
    use crate::test_helpers::ControlledRecorder;
    use parking_lot::Mutex;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct MockEngine {
        stopped: CancellationToken,
        failure: Mutex<Option<EngineError>>,
        closes: AtomicUsize,
    }

    impl MockEngine {
        fn fail(&self, error: EngineError) {
            *self.failure.lock() = Some(error);
            self.stopped.cancel();
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProtocolEngine for MockEngine {
        async fn wait(&self) -> Result<(), EngineError> {
            self.stopped.cancelled().await;
            match self.failure.lock().take() {
                Some(error) => Err(error),
                None => Err(EngineError::Terminated),
            }
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.stopped.cancel();
        }
    }

    fn server(graceful_stop: bool, recorder: Arc<ControlledRecorder>) -> Arc<RelayServer> {
        let mut config = Config::default();
        config.relay.graceful_stop = graceful_stop;
        Arc::new(RelayServer::new(&config, recorder, Handle::current()))
    }

    fn publish(server: &RelayServer) -> SessionId {
        let session = SessionId::new();
        server
            .broker()
            .try_admit_publisher(
                session,
                vec![Track::new(TrackKind::Video, "H264", 90_000)],
                RecordingJob::for_publish("127.0.0.1:8554".parse().unwrap(), "cam", Path::new(".")),
            )
            .unwrap();
        session
    }

    #[tokio::test]
    async fn test_default_stop_closes_engine_then_joins() {
        let recorder = ControlledRecorder::new();
        let server = server(false, recorder.clone());
        let engine = Arc::new(MockEngine::default());
        let session = publish(&server);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = {
            let (server, engine) = (Arc::clone(&server), Arc::clone(&engine));
            tokio::spawn(async move {
                server
                    .run(engine.as_ref(), async move {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        stop_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Engine is closed at once; the publisher stays until its session ends.
        assert_eq!(engine.closes(), 1);
        assert_eq!(server.broker().publisher(), Some(session));
        assert!(!run.is_finished());

        recorder.release(1);
        let result = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("run should finish")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_graceful_stop_releases_and_joins_before_close() {
        let recorder = ControlledRecorder::new();
        let server = server(true, recorder.clone());
        let engine = Arc::new(MockEngine::default());
        let distributor = {
            publish(&server);
            server.broker().active_distributor().unwrap()
        };

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = {
            let (server, engine) = (Arc::clone(&server), Arc::clone(&engine));
            tokio::spawn(async move {
                server
                    .run(engine.as_ref(), async move {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        stop_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(server.broker().publisher(), None);
        assert!(distributor.is_closed());
        assert_eq!(engine.closes(), 0);

        recorder.release(1);
        let result = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("run should finish")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(engine.closes(), 1);
    }

    #[tokio::test]
    async fn test_engine_failure_is_returned_after_join() {
        let recorder = ControlledRecorder::new();
        let server = server(false, recorder.clone());
        let engine = Arc::new(MockEngine::default());
        publish(&server);

        let run = {
            let (server, engine) = (Arc::clone(&server), Arc::clone(&engine));
            tokio::spawn(async move { server.run(engine.as_ref(), std::future::pending()).await })
        };

        engine.fail(EngineError::Protocol("listener died".to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!run.is_finished());

        recorder.release(1);
        let result = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("run should finish")
            .unwrap();
        assert!(matches!(result, Err(EngineError::Protocol(_))));
        assert_eq!(engine.closes(), 0);
    }

    #[tokio::test]
    async fn test_engine_terminated_without_signal_is_clean() {
        let server = server(false, ControlledRecorder::new());
        let engine = MockEngine::default();
        engine.close();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            server.run(&engine, std::future::pending()),
        )
        .await
        .expect("run should finish");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_from_config_requires_runtime() {
        let mut config = Config::default();
        config.recording.enabled = false;
        let server = RelayServer::from_config(&config).unwrap();
        assert!(server.broker().publisher().is_none());
        assert!(std::thread::spawn(move || RelayServer::from_config(&config).is_err())
            .join()
            .unwrap());
    }
}
