//! Effect log kept while optimistic actions are unresolved, and the
//! rollback-by-replay that undoes a failed optimistic effect.

use std::sync::Arc;

use serde::Serialize;

use crate::action::{ArgsOf, Model, StateOf};

/// Re-applies one committed effect to a state.
pub type Replay<M> = Arc<dyn Fn(&StateOf<M>) -> StateOf<M> + Send + Sync>;

/// Produces the snapshot stored before an optimistic effect.
///
/// Must return a value equal to its input that later commits cannot
/// change. Snapshots are immutable `Arc`s, so sharing the `Arc` satisfies
/// this; supply a deep copy only when the state holds interior mutability.
pub type SnapshotFn<M> = Arc<dyn Fn(&Arc<StateOf<M>>) -> Arc<StateOf<M>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Sync,
    Pre,
    Optimistic,
    Success,
    Error,
}

pub struct HistoryEntry<M: Model> {
    pub action: String,
    pub instance: String,
    /// Resolver call that committed the effect; `None` for sync actions.
    pub call_id: Option<u64>,
    pub kind: EffectKind,
    pub args: ArgsOf<M>,
    replay: Replay<M>,
    /// Set only on unresolved optimistic entries.
    snapshot_before: Option<Arc<StateOf<M>>>,
}

impl<M: Model> HistoryEntry<M> {
    pub fn new(
        action: &str,
        instance: &str,
        call_id: Option<u64>,
        kind: EffectKind,
        args: ArgsOf<M>,
        replay: Replay<M>,
    ) -> Self {
        Self {
            action: action.to_string(),
            instance: instance.to_string(),
            call_id,
            kind,
            args,
            replay,
            snapshot_before: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.kind == EffectKind::Optimistic && self.snapshot_before.is_some()
    }

    fn owned_by(&self, call_id: u64) -> bool {
        self.is_pending() && self.call_id == Some(call_id)
    }
}

/// Result of a rollback.
pub struct Rollback<M: Model> {
    pub state: Arc<StateOf<M>>,
    pub replayed: usize,
}

pub struct OptimisticHistory<M: Model> {
    entries: Vec<HistoryEntry<M>>,
    recording: bool,
    snapshot: SnapshotFn<M>,
}

impl<M: Model> OptimisticHistory<M> {
    pub fn new(snapshot: SnapshotFn<M>) -> Self {
        Self {
            entries: Vec::new(),
            recording: false,
            snapshot,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry<M>> {
        self.entries.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    /// Records a committed effect. `before` is the state the effect was
    /// applied to; it is kept for optimistic entries only.
    ///
    /// An optimistic effect starts recording; other effects are dropped
    /// unless recording is already active.
    pub fn record(&mut self, mut entry: HistoryEntry<M>, before: &Arc<StateOf<M>>) {
        if entry.kind == EffectKind::Optimistic {
            entry.snapshot_before = Some((self.snapshot)(before));
            self.recording = true;
        } else if !self.recording {
            return;
        }
        self.entries.push(entry);
    }

    /// The optimistic call succeeded; its snapshot is no longer needed.
    pub fn resolve(&mut self, call_id: u64) -> bool {
        let Some(index) = self.position(call_id) else {
            return false;
        };
        self.entries[index].snapshot_before = None;
        self.clean_up(index);
        true
    }

    /// Undoes the optimistic effect committed by `call_id`.
    ///
    /// Starts from the state stored before that effect and replays every
    /// later entry in commit order. Optimistic entries met on the way get
    /// their stored snapshot moved to the replayed state so they can still
    /// be rolled back themselves.
    pub fn rollback(&mut self, call_id: u64) -> Option<Rollback<M>> {
        let index = self.position(call_id)?;
        let removed = self.entries.remove(index);
        let mut running = removed.snapshot_before?;

        let mut replayed = 0;
        for entry in &mut self.entries[index..] {
            if entry.is_pending() {
                entry.snapshot_before = Some((self.snapshot)(&running));
            }
            running = Arc::new((entry.replay)(&running));
            replayed += 1;
        }

        self.clean_up(index);
        Some(Rollback {
            state: running,
            replayed,
        })
    }

    fn position(&self, call_id: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.owned_by(call_id))
    }

    /// Stops recording once nothing is pending. When the oldest entry was
    /// resolved, drops the prefix no remaining rollback can reach.
    fn clean_up(&mut self, index: usize) {
        match self.entries.iter().position(HistoryEntry::is_pending) {
            None => {
                self.entries.clear();
                self.recording = false;
            }
            Some(next_pending) if index == 0 => {
                self.entries.drain(..next_pending);
            }
            Some(_) => {}
        }
    }
}
