use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::frame::Frame;
use crate::ids::PeerId;

/// Enqueue capability for one connection's outbound queue.
///
/// Cloned into the registry and handed to other connections' readers. The
/// queue itself is drained only by the owning connection's writer task.
#[derive(Clone)]
pub struct Outbound {
    frames: mpsc::Sender<Frame>,
    cancel: CancellationToken,
}

impl Outbound {
    pub(crate) fn new(frames: mpsc::Sender<Frame>, cancel: CancellationToken) -> Self {
        Self { frames, cancel }
    }

    /// Blocking enqueue. Only valid while the queue is known to have room;
    /// the server uses it solely for the identity frame, when the queue is
    /// empty by construction.
    pub(crate) async fn send(&self, frame: Frame) -> bool {
        self.frames.send(frame).await.is_ok()
    }

    /// Non-blocking enqueue. Returns false when the queue is full or the
    /// connection is gone; it never waits.
    pub fn offer(&self, frame: Frame) -> bool {
        self.frames.try_send(frame).is_ok()
    }

    /// Trigger connection teardown. Single-shot; repeated calls are no-ops.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether two handles belong to the same connection.
    pub fn same_connection(&self, other: &Outbound) -> bool {
        self.frames.same_channel(&other.frames)
    }
}

/// Shared map from peer id to the live send side of that peer's connection.
///
/// Lookups vastly outnumber registrations, so the map sits behind a
/// read-write lock and lookups clone the handle out.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    inner: Arc<RwLock<HashMap<PeerId, Outbound>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the handle for `id`. Returns the previous handle
    /// if one was present; the caller is expected to close it.
    pub async fn register(&self, id: PeerId, handle: Outbound) -> Option<Outbound> {
        let mut peers = self.inner.write().await;
        let previous = peers.insert(id, handle);
        tracing::debug!(peer_id = %id, peers = peers.len(), "registry: peer added");
        previous
    }

    pub async fn lookup(&self, id: &PeerId) -> Option<Outbound> {
        self.inner.read().await.get(id).cloned()
    }

    /// Remove `id` only if the current entry belongs to the same connection
    /// as `handle`. Guards an exiting connection against evicting a
    /// successor that was assigned the same id.
    pub async fn unregister(&self, id: &PeerId, handle: &Outbound) -> bool {
        let mut peers = self.inner.write().await;
        match peers.get(id) {
            Some(current) if current.same_connection(handle) => {
                peers.remove(id);
                tracing::debug!(peer_id = %id, peers = peers.len(), "registry: peer removed");
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
