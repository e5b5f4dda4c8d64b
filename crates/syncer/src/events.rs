//! The event surface between the syncer and the watcher
//!
//! Four buffered channels of capacity 1. Producers send without blocking:
//! if an event is already pending, the new one is dropped - a sync that is
//! already scheduled covers the one that just fired.

use tokio::sync::mpsc;

/// Channel capacity; one pending event of each kind is enough
const EVENT_CAPACITY: usize = 1;

/// Receiving side of the syncer's events, consumed by the watcher
#[derive(Debug)]
pub struct SyncEvents {
    /// Full reconciliation against the cluster state
    pub sync: mpsc::Receiver<()>,

    /// Full re-emit of the current table
    pub emit: mpsc::Receiver<()>,

    /// Internal-routes sibling of `sync`
    pub internal_sync: mpsc::Receiver<()>,

    /// Internal-routes sibling of `emit`
    pub internal_emit: mpsc::Receiver<()>,
}

/// Sending side, owned by the syncer
#[derive(Debug, Clone)]
pub(crate) struct EventSenders {
    sync: mpsc::Sender<()>,
    emit: mpsc::Sender<()>,
    internal_sync: mpsc::Sender<()>,
    internal_emit: mpsc::Sender<()>,
}

/// Build the four channel pairs
pub(crate) fn event_channels() -> (EventSenders, SyncEvents) {
    let (sync_tx, sync_rx) = mpsc::channel(EVENT_CAPACITY);
    let (emit_tx, emit_rx) = mpsc::channel(EVENT_CAPACITY);
    let (internal_sync_tx, internal_sync_rx) = mpsc::channel(EVENT_CAPACITY);
    let (internal_emit_tx, internal_emit_rx) = mpsc::channel(EVENT_CAPACITY);

    (
        EventSenders {
            sync: sync_tx,
            emit: emit_tx,
            internal_sync: internal_sync_tx,
            internal_emit: internal_emit_tx,
        },
        SyncEvents {
            sync: sync_rx,
            emit: emit_rx,
            internal_sync: internal_sync_rx,
            internal_emit: internal_emit_rx,
        },
    )
}

impl EventSenders {
    pub(crate) fn fire_sync(&self) {
        Self::signal(&self.sync, "sync-already-in-progress");
    }

    pub(crate) fn fire_emit(&self) {
        Self::signal(&self.emit, "emit-already-in-progress");
    }

    pub(crate) fn fire_internal_sync(&self) {
        Self::signal(&self.internal_sync, "internal-sync-already-in-progress");
    }

    pub(crate) fn fire_internal_emit(&self) {
        Self::signal(&self.internal_emit, "internal-emit-already-in-progress");
    }

    fn signal(sender: &mpsc::Sender<()>, busy: &'static str) {
        if sender.try_send(()).is_err() {
            tracing::debug!("{busy}");
        }
    }
}
