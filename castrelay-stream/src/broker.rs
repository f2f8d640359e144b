//! The single publish slot.
//!
//! `EMPTY -> OCCUPIED(session)` on admission, back to `EMPTY` when the
//! occupant goes away. The occupant and its distributor live in one
//! `Option` behind one lock, so neither can be observed without the other.

use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::define::{SessionId, Track};
use crate::distributor::StreamDistributor;
use crate::errors::StreamError;
use crate::recording::{RecordingJob, RecordingSupervisor};

struct Publisher {
    session: SessionId,
    distributor: Arc<StreamDistributor>,
}

pub struct StreamBroker {
    slot: RwLock<Option<Publisher>>,
    recordings: Arc<RecordingSupervisor>,
}

impl StreamBroker {
    pub fn new(recordings: Arc<RecordingSupervisor>) -> Self {
        Self {
            slot: RwLock::new(None),
            recordings,
        }
    }

    /// Grant the slot to `session` and start recording it.
    ///
    /// Fails with [`StreamError::AlreadyPublishing`] whenever the slot is
    /// held, even by `session` itself; the occupant is never displaced.
    /// The recording is registered before the slot lock is released, so
    /// anyone who observes the publisher can also join its recording. It is
    /// spawned, never awaited.
    pub fn try_admit_publisher(
        &self,
        session: SessionId,
        tracks: Vec<Track>,
        recording: RecordingJob,
    ) -> Result<Arc<StreamDistributor>, StreamError> {
        let distributor = {
            let mut slot = self.slot.write();
            if let Some(current) = slot.as_ref() {
                warn!(
                    session = %session,
                    publisher = %current.session,
                    "Rejecting publish, slot is taken"
                );
                return Err(StreamError::AlreadyPublishing);
            }

            let distributor = Arc::new(StreamDistributor::new(tracks));
            *slot = Some(Publisher {
                session,
                distributor: Arc::clone(&distributor),
            });
            self.recordings.start_recording(recording);
            distributor
        };

        info!(
            session = %session,
            tracks = distributor.track_count(),
            "Publisher admitted"
        );

        Ok(distributor)
    }

    /// Empty the slot if `session` holds it. Returns whether it did.
    ///
    /// Safe to call any number of times for the same session.
    pub fn release_if_owner(&self, session: SessionId) -> bool {
        let released = {
            let mut slot = self.slot.write();
            match slot.as_ref() {
                Some(current) if current.session == session => slot.take(),
                _ => None,
            }
        };

        match released {
            Some(publisher) => {
                publisher.distributor.close();
                info!(session = %session, "Publisher released");
                true
            }
            None => false,
        }
    }

    /// Empty the slot whoever holds it. Used on graceful shutdown.
    pub fn release_current(&self) -> Option<SessionId> {
        let released = self.slot.write().take()?;
        released.distributor.close();
        info!(session = %released.session, "Publisher released for shutdown");
        Some(released.session)
    }

    /// Distributor of the current publish, for DESCRIBE and SETUP.
    pub fn active_distributor(&self) -> Result<Arc<StreamDistributor>, StreamError> {
        self.slot
            .read()
            .as_ref()
            .map(|publisher| Arc::clone(&publisher.distributor))
            .ok_or(StreamError::NotFound)
    }

    /// Forward a packet if `session` is the publisher; drop it silently
    /// otherwise. Returns whether the packet was forwarded.
    pub fn route_if_publisher(
        &self,
        session: SessionId,
        track_index: usize,
        payload: Bytes,
        pts_equals_dts: bool,
    ) -> bool {
        let slot = self.slot.read();
        match slot.as_ref() {
            Some(publisher) if publisher.session == session => {
                publisher
                    .distributor
                    .write_packet(track_index, payload, pts_equals_dts);
                true
            }
            _ => {
                debug!(session = %session, "Dropping packet from non-publishing session");
                false
            }
        }
    }

    pub fn publisher(&self) -> Option<SessionId> {
        self.slot.read().as_ref().map(|publisher| publisher.session)
    }

    pub fn recordings(&self) -> &Arc<RecordingSupervisor> {
        &self.recordings
    }
}
