//! Fan-out of one publisher's packets to every attached reader.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::define::{DistributedPacket, Track, READER_CHANNEL_CAPACITY};
use crate::errors::StreamError;

/// How often to log per-reader drop warnings (every N drops).
const DROP_LOG_INTERVAL: u64 = 100;

struct ReaderSlot {
    sender: mpsc::Sender<DistributedPacket>,
    drop_count: Arc<AtomicU64>,
}

/// In-memory distributor created for each admitted publish.
///
/// Writes never block: each reader has a bounded buffer and a reader that
/// falls behind loses packets instead of stalling the publisher.
pub struct StreamDistributor {
    tracks: Vec<Track>,
    readers: Mutex<HashMap<Uuid, ReaderSlot>>,
    closed: AtomicBool,
}

impl StreamDistributor {
    #[must_use]
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            readers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Attach a new reader.
    pub fn subscribe(&self) -> Result<ReaderHandle, StreamError> {
        let mut readers = self.readers.lock();
        // Checked under the readers lock so a concurrent close() cannot miss us.
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::DistributorClosed);
        }

        let (sender, receiver) = mpsc::channel(READER_CHANNEL_CAPACITY);
        let id = Uuid::new_v4();
        let drop_count = Arc::new(AtomicU64::new(0));
        readers.insert(
            id,
            ReaderSlot {
                sender,
                drop_count: Arc::clone(&drop_count),
            },
        );
        tracing::debug!(reader = %id, readers = readers.len(), "Reader attached");

        Ok(ReaderHandle {
            id,
            receiver,
            drop_count,
        })
    }

    /// Detach a reader before its handle is dropped.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        self.readers.lock().remove(&id).is_some()
    }

    /// Forward one packet to all readers. Returns how many accepted it.
    pub fn write_packet(&self, track_index: usize, payload: Bytes, pts_equals_dts: bool) -> usize {
        if self.closed.load(Ordering::Acquire) {
            return 0;
        }
        if track_index >= self.tracks.len() {
            tracing::debug!(
                track_index,
                tracks = self.tracks.len(),
                "Dropping packet for unknown track"
            );
            return 0;
        }

        // Snapshot senders under lock, then fan out lock-free.
        let snapshot: Vec<(Uuid, mpsc::Sender<DistributedPacket>, Arc<AtomicU64>)> = {
            let guard = self.readers.lock();
            guard
                .iter()
                .map(|(id, slot)| (*id, slot.sender.clone(), Arc::clone(&slot.drop_count)))
                .collect()
        };
        if snapshot.is_empty() {
            return 0;
        }

        let packet = DistributedPacket {
            track_index,
            payload,
            pts_equals_dts,
        };

        let mut delivered = 0;
        let mut closed_ids = Vec::new();
        for (id, sender, drop_count) in &snapshot {
            match sender.try_send(packet.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let prev = drop_count.fetch_add(1, Ordering::Relaxed);
                    if (prev + 1) % DROP_LOG_INTERVAL == 0 {
                        tracing::warn!(
                            reader = %id,
                            dropped = prev + 1,
                            "Reader is falling behind, packets dropped"
                        );
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed_ids.push(*id),
            }
        }

        if !closed_ids.is_empty() {
            let mut guard = self.readers.lock();
            for id in closed_ids {
                guard.remove(&id);
                tracing::debug!(reader = %id, "Removed closed reader");
            }
        }

        delivered
    }

    /// Detach every reader and refuse further packets. Idempotent.
    pub fn close(&self) {
        let drained: Vec<ReaderSlot> = {
            let mut readers = self.readers.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            readers.drain().map(|(_, slot)| slot).collect()
        };
        tracing::debug!(readers = drained.len(), "Distributor closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn reader_count(&self) -> usize {
        self.readers.lock().len()
    }
}

/// Receiving side held by one reader session.
pub struct ReaderHandle {
    id: Uuid,
    receiver: mpsc::Receiver<DistributedPacket>,
    drop_count: Arc<AtomicU64>,
}

impl ReaderHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next packet, or `None` once the distributor is closed and drained.
    pub async fn recv(&mut self) -> Option<DistributedPacket> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DistributedPacket> {
        self.receiver.try_recv().ok()
    }

    /// Packets lost because this reader's buffer was full.
    pub fn dropped(&self) -> u64 {
        self.drop_count.load(Ordering::Relaxed)
    }
}
