//! Delta Sync Engine: moves buffer changes between the editor and both channels.
//!
//! Local edits fan out to the Storage and Container channels independently.
//! Remote deltas from the Storage Channel are applied with [`Origin::Remote`]
//! and relayed only to the container mirror, never back to storage.

use serde::Serialize;

use workbench_core::{Delta, Origin};

use crate::channel::{Channels, ContainerOutbound, PathDeltas, StorageOutbound};
use crate::error::SyncError;
use crate::tree_store::{AppliedChange, TreeStore};

/// Which channels accepted an emitted change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Emission {
    pub storage: bool,
    pub container: bool,
}

/// Running counters, reported in workspace snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub local_edits: u64,
    pub sent_storage: u64,
    pub sent_container: u64,
    pub received: u64,
    /// Remote changes that were applied without being re-broadcast.
    pub suppressed: u64,
    /// Remote batches that could not be applied.
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub struct DeltaSyncEngine {
    stats: SyncStats,
}

impl DeltaSyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Apply a local edit and emit it on whichever channels are open.
    ///
    /// With no file selected the edit stays local. A failed apply leaves the
    /// buffer untouched and emits nothing.
    pub fn local_edit(
        &mut self,
        store: &mut TreeStore,
        channels: &mut Channels,
        deltas: Vec<Delta>,
    ) -> Result<Emission, SyncError> {
        let change = store.apply_change(Origin::Local, deltas)?;
        self.stats.local_edits += 1;
        Ok(self.emit(&change, channels))
    }

    /// Apply a `receive-delta` batch from the Storage Channel.
    ///
    /// The batch is dropped when no file is open or when it does not fit the
    /// buffer. Otherwise it is mirrored to the container so the sandbox copy
    /// keeps up. Returns whether the buffer changed.
    pub fn remote_deltas(
        &mut self,
        store: &mut TreeStore,
        channels: &mut Channels,
        deltas: Vec<Delta>,
    ) -> bool {
        self.stats.received += 1;
        if store.buffer().owner.is_none() {
            tracing::debug!(count = deltas.len(), "dropping remote deltas: no file open");
            self.stats.dropped += 1;
            return false;
        }

        let change = match store.apply_change(Origin::Remote, deltas) {
            Ok(change) => change,
            Err(err) => {
                tracing::warn!(error = %err, "dropping remote deltas that do not fit the buffer");
                self.stats.dropped += 1;
                return false;
            }
        };

        self.emit(&change, channels);
        if let Some(path) = change.path {
            let relay = ContainerOutbound::EditorSendDelta(PathDeltas {
                path,
                content: change.deltas,
            });
            match channels.send_container(relay) {
                Ok(()) => self.stats.sent_container += 1,
                Err(err) => tracing::debug!(error = %err, "container mirror skipped"),
            }
        }
        true
    }

    /// Outbound listener. Remote changes are suppressed; local changes go to
    /// each open channel independently.
    pub fn emit(&mut self, change: &AppliedChange, channels: &mut Channels) -> Emission {
        if change.origin == Origin::Remote {
            self.stats.suppressed += 1;
            return Emission::default();
        }
        let Some(path) = change.path.clone() else {
            return Emission::default();
        };
        let payload = PathDeltas {
            path,
            content: change.deltas.clone(),
        };

        let mut emission = Emission::default();
        match channels.send_storage(StorageOutbound::SendDelta(payload.clone())) {
            Ok(()) => {
                emission.storage = true;
                self.stats.sent_storage += 1;
            }
            Err(err) => tracing::debug!(error = %err, "storage emit skipped"),
        }
        match channels.send_container(ContainerOutbound::EditorSendDelta(payload)) {
            Ok(()) => {
                emission.container = true;
                self.stats.sent_container += 1;
            }
            Err(err) => tracing::debug!(error = %err, "container emit skipped"),
        }
        emission
    }
}
