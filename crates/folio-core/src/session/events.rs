//! Change notifications and the pending-operation ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a [`super::DocumentSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The live block sequence changed.
    Changed,
    /// A mutation wants the document saved; hosts feed this into the
    /// save coordinator's debounce.
    SaveRequested,
    /// The whole sequence was replaced from outside (load or save ack).
    Reset,
    /// Optimistic edits were discarded in favour of the server copy.
    RolledBack { ops: usize },
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&SessionEvent) + Send>;

#[derive(Default)]
pub struct Listeners {
    next: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub fn add(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.entries.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn emit(&mut self, event: &SessionEvent) {
        for (_, listener) in &mut self.entries {
            listener(event);
        }
    }

    pub const fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Pending operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpState {
    /// Applied locally, not yet acknowledged by the server.
    Pending,
    /// Included in a save the server acknowledged.
    Confirmed,
    /// Discarded when the session adopted the server copy.
    RolledBack,
}

/// One optimistic mutation awaiting a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingOp {
    pub id: OpId,
    /// Name of the session method that opened it.
    pub action: &'static str,
    pub state: OpState,
}

/// Settled ops kept for inspection once the ledger is this long.
const SETTLED_HISTORY: usize = 256;

#[derive(Debug, Default)]
pub struct Ledger {
    next: u64,
    ops: Vec<PendingOp>,
}

impl Ledger {
    pub fn open(&mut self, action: &'static str) -> OpId {
        let id = OpId(self.next);
        self.next += 1;
        self.ops.push(PendingOp {
            id,
            action,
            state: OpState::Pending,
        });
        self.prune();
        id
    }

    /// Move every pending op to `state`, returning how many moved.
    pub fn settle(&mut self, state: OpState) -> usize {
        let mut moved = 0;
        for op in &mut self.ops {
            if op.state == OpState::Pending {
                op.state = state;
                moved += 1;
            }
        }
        self.prune();
        moved
    }

    pub fn ops(&self) -> &[PendingOp] {
        &self.ops
    }

    pub fn pending(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| op.state == OpState::Pending)
            .count()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    fn prune(&mut self) {
        let settled = self.ops.len() - self.pending();
        if settled <= SETTLED_HISTORY {
            return;
        }
        let mut excess = settled - SETTLED_HISTORY;
        self.ops.retain(|op| {
            if excess > 0 && op.state != OpState::Pending {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn listeners_receive_events_until_removed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::default();
        let sink = Arc::clone(&seen);
        let id = listeners.add(Box::new(move |e| sink.lock().expect("lock").push(*e)));

        listeners.emit(&SessionEvent::Changed);
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.emit(&SessionEvent::Reset);

        assert_eq!(*seen.lock().expect("lock"), vec![SessionEvent::Changed]);
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn ledger_settles_only_pending_ops() {
        let mut ledger = Ledger::default();
        ledger.open("add_block");
        ledger.open("update_text");
        assert_eq!(ledger.settle(OpState::Confirmed), 2);
        ledger.open("remove_single_block");
        assert_eq!(ledger.settle(OpState::RolledBack), 1);

        let states: Vec<_> = ledger.ops().iter().map(|op| op.state).collect();
        assert_eq!(
            states,
            vec![OpState::Confirmed, OpState::Confirmed, OpState::RolledBack]
        );
        assert_eq!(ledger.pending(), 0);
    }

    #[test]
    fn ledger_drops_oldest_settled_history() {
        let mut ledger = Ledger::default();
        for _ in 0..SETTLED_HISTORY + 10 {
            ledger.open("update_text");
            ledger.settle(OpState::Confirmed);
        }
        ledger.open("update_text");
        assert_eq!(ledger.ops().len(), SETTLED_HISTORY + 1);
        assert_eq!(ledger.pending(), 1);
        assert_eq!(ledger.ops()[0].id, OpId(10));
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let json = serde_json::to_string(&SessionEvent::RolledBack { ops: 2 }).expect("json");
        assert_eq!(json, r#"{"event":"rolled_back","ops":2}"#);
    }
}
