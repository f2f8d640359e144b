//! Callbacks the protocol engine invokes for every lifecycle event.
//!
//! The engine owns parsing, transports and session bookkeeping. It asks
//! the relay what to answer and which distributor to serve from, and hands
//! over inbound packets. Callbacks may run concurrently on any thread.

use bytes::Bytes;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::broker::StreamBroker;
use crate::define::{ConnectionInfo, SessionId, Track};
use crate::distributor::StreamDistributor;
use crate::errors::StreamError;
use crate::recording::RecordingJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    NotFound,
}

impl StatusCode {
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Describe,
    Announce,
    Setup,
    Play,
    Record,
    Pause,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Describe => "DESCRIBE",
            Self::Announce => "ANNOUNCE",
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Record => "RECORD",
            Self::Pause => "PAUSE",
        };
        f.write_str(name)
    }
}

/// A parsed request as seen by the relay.
#[derive(Debug, Clone)]
pub struct Request {
    pub conn: ConnectionInfo,
    pub method: Method,
    pub url: String,
    /// Stream path without the leading slash
    pub path: String,
    /// Set once the engine has bound the request to a session
    pub session: Option<SessionId>,
}

/// ANNOUNCE carries the publisher's session and its track list.
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    pub request: Request,
    pub session: SessionId,
    pub tracks: Vec<Track>,
}

/// Answer to DESCRIBE and SETUP.
#[derive(Clone)]
pub struct StreamResponse {
    pub status: StatusCode,
    pub stream: Option<Arc<StreamDistributor>>,
}

/// A refused request: the status to send and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct Rejection {
    pub status: StatusCode,
    pub error: StreamError,
}

pub trait ServerHandler: Send + Sync {
    fn on_conn_open(&self, conn: &ConnectionInfo);
    fn on_conn_close(&self, conn: &ConnectionInfo, reason: Option<&str>);
    fn on_session_open(&self, session: SessionId, conn: &ConnectionInfo);
    fn on_session_close(&self, session: SessionId);
    fn on_describe(&self, request: &Request) -> StreamResponse;
    fn on_announce(&self, announce: AnnounceRequest) -> Result<StatusCode, Rejection>;
    fn on_setup(&self, request: &Request) -> StreamResponse;
    fn on_play(&self, request: &Request) -> StatusCode;
    fn on_record(&self, request: &Request) -> StatusCode;
    fn on_pause(&self, request: &Request) -> StatusCode;
    fn on_packet_rtp(&self, session: SessionId, track_index: usize, payload: Bytes, pts_equals_dts: bool);
}

/// The relay's handler: one publisher, many readers, one recording per publish.
pub struct RelayHandler {
    broker: Arc<StreamBroker>,
    storage_root: PathBuf,
}

impl RelayHandler {
    pub fn new(broker: Arc<StreamBroker>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            broker,
            storage_root: storage_root.into(),
        }
    }

    pub fn broker(&self) -> &Arc<StreamBroker> {
        &self.broker
    }

    fn log_request(request: &Request) {
        info!(
            remote = %request.conn.remote_addr,
            method = %request.method,
            url = %request.url,
            session = ?request.session,
            "Request"
        );
    }

    fn stream_response(&self) -> StreamResponse {
        match self.broker.active_distributor() {
            Ok(stream) => StreamResponse {
                status: StatusCode::Ok,
                stream: Some(stream),
            },
            Err(_) => StreamResponse {
                status: StatusCode::NotFound,
                stream: None,
            },
        }
    }
}

impl ServerHandler for RelayHandler {
    fn on_conn_open(&self, conn: &ConnectionInfo) {
        info!(remote = %conn.remote_addr, local = %conn.local_addr, "Connection opened");
    }

    fn on_conn_close(&self, conn: &ConnectionInfo, reason: Option<&str>) {
        info!(remote = %conn.remote_addr, reason = reason.unwrap_or("none"), "Connection closed");
    }

    fn on_session_open(&self, session: SessionId, conn: &ConnectionInfo) {
        info!(session = %session, remote = %conn.remote_addr, "Session opened");
    }

    fn on_session_close(&self, session: SessionId) {
        info!(session = %session, "Session closed");
        self.broker.release_if_owner(session);
    }

    fn on_describe(&self, request: &Request) -> StreamResponse {
        Self::log_request(request);
        self.stream_response()
    }

    fn on_announce(&self, announce: AnnounceRequest) -> Result<StatusCode, Rejection> {
        let AnnounceRequest {
            request,
            session,
            tracks,
        } = announce;
        Self::log_request(&request);

        let job = RecordingJob::for_publish(request.conn.local_addr, &request.path, &self.storage_root);
        self.broker
            .try_admit_publisher(session, tracks, job)
            .map(|_| StatusCode::Ok)
            .map_err(|error| Rejection {
                status: StatusCode::BadRequest,
                error,
            })
    }

    fn on_setup(&self, request: &Request) -> StreamResponse {
        Self::log_request(request);
        self.stream_response()
    }

    fn on_play(&self, request: &Request) -> StatusCode {
        Self::log_request(request);
        StatusCode::Ok
    }

    fn on_record(&self, request: &Request) -> StatusCode {
        Self::log_request(request);
        StatusCode::Ok
    }

    fn on_pause(&self, request: &Request) -> StatusCode {
        Self::log_request(request);
        StatusCode::Ok
    }

    fn on_packet_rtp(&self, session: SessionId, track_index: usize, payload: Bytes, pts_equals_dts: bool) {
        if !self
            .broker
            .route_if_publisher(session, track_index, payload, pts_equals_dts)
        {
            debug!(session = %session, track_index, "Packet ignored");
        }
    }
}
