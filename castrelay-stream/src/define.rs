use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;

/// Opaque identity of a protocol-engine session.
///
/// The engine allocates one per session; the core only compares them.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addresses of the TCP connection a request arrived on.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TrackKind {
    Video,
    Audio,
    Application,
}

/// One media track of an announced stream.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Track {
    pub kind: TrackKind,
    /// Encoding name from the announcement, e.g. "H264"
    pub codec: String,
    pub clock_rate: u32,
}

impl Track {
    pub fn new(kind: TrackKind, codec: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            kind,
            codec: codec.into(),
            clock_rate,
        }
    }
}

/// A publisher packet as delivered to each reader.
///
/// `Bytes::clone()` only bumps a reference count, so fan-out never copies
/// the payload.
#[derive(Debug, Clone)]
pub struct DistributedPacket {
    pub track_index: usize,
    pub payload: Bytes,
    pub pts_equals_dts: bool,
}

/// Per-reader buffer. A full buffer drops packets for that reader only.
pub const READER_CHANNEL_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id() {
        let id = SessionId::new();
        let s = id.to_string();
        let serialized = serde_json::to_string(&id).unwrap();
        assert!(!s.is_empty());
        assert!(serialized.contains(&s));

        assert_ne!(id, SessionId::new());
        assert_eq!(id, SessionId::from_uuid(id.0));
    }
}
