// castrelay-stream - single-publisher relay core
//
// Layout:
// - define       - identifiers, tracks and packets shared by every component
// - distributor  - fan-out of one publisher's packets to its readers
// - broker       - the publish slot: admission, release, routing
// - recording    - out-of-process recorders and the supervisor tracking them
// - handler      - lifecycle callbacks invoked by the protocol engine
// - server       - process lifetime: engine wait, shutdown and final join

pub mod broker;
pub mod define;
pub mod distributor;
pub mod errors;
pub mod handler;
pub mod recording;
pub mod server;

pub use broker::StreamBroker;
pub use define::{ConnectionInfo, DistributedPacket, SessionId, Track, TrackKind};
pub use distributor::{ReaderHandle, StreamDistributor};
pub use errors::{EngineError, RecordingError, StreamError};
pub use handler::{RelayHandler, ServerHandler, StatusCode};
pub use recording::{FfmpegRecorder, NoopRecorder, Recorder, RecordingJob, RecordingSupervisor};
pub use server::{shutdown_signal, ProtocolEngine, RelayServer};

#[cfg(test)]
pub(crate) mod test_helpers;
