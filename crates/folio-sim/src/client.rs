use std::sync::Arc;
use std::time::Instant;

use folio_core::clock::Clock;
use folio_core::config::SaveConfig;
use folio_core::error::ErrorCode;
use folio_core::merge::MergeError;
use folio_core::model::payload::TurnInto;
use folio_core::save::{MemoryBackend, RoundOutcome, SaveCoordinator, SaveError};
use folio_core::session::{InsertWhere, SessionError};
use folio_core::{Block, BlockType, DocumentSession, Uid, run_save_round};
use serde::Serialize;
use tracing::debug;

use crate::rng::DeterministicRng;

/// Stable identifier for a simulated client.
pub type ClientId = usize;

/// Types a client adds or converts blocks into.
static TEXT_KINDS: [BlockType; 5] = [
    BlockType::Section,
    BlockType::Subtitle,
    BlockType::Paragraph,
    BlockType::OrderedItem,
    BlockType::UnorderedItem,
];

/// One edit a client makes to its own copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    Add { after: Uid, kind: BlockType, text: String },
    EditText { uid: Uid, text: String },
    Remove { uid: Uid },
    TurnInto { uid: Uid, kind: BlockType },
    Move { uid: Uid, target: Uid, below: bool },
}

impl EditOp {
    /// A random edit of `blocks`. `protected` is never removed, which keeps
    /// the document from ever being empty.
    pub fn random(
        rng: &mut DeterministicRng,
        blocks: &[Block],
        protected: &Uid,
        label: &str,
    ) -> Option<Self> {
        let uid = rng.pick(blocks)?.uid.clone();
        let op = match rng.next_bounded(5) {
            0 => Self::Add {
                after: uid,
                kind: rng.pick(&TEXT_KINDS)?.clone(),
                text: format!("{label} added"),
            },
            1 => Self::EditText {
                uid,
                text: format!("{label} edited"),
            },
            2 => {
                let removable: Vec<&Block> = blocks.iter().filter(|b| &b.uid != protected).collect();
                match rng.pick(&removable) {
                    Some(block) => Self::Remove {
                        uid: block.uid.clone(),
                    },
                    None => Self::EditText {
                        uid,
                        text: format!("{label} edited"),
                    },
                }
            }
            3 => Self::TurnInto {
                uid,
                kind: rng.pick(&TEXT_KINDS)?.clone(),
            },
            _ => Self::Move {
                uid,
                target: rng.pick(blocks)?.uid.clone(),
                below: rng.hit_rate_percent(50),
            },
        };
        Some(op)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::EditText { .. } => "edit_text",
            Self::Remove { .. } => "remove",
            Self::TurnInto { .. } => "turn_into",
            Self::Move { .. } => "move",
        }
    }
}

/// Which backend call an injected failure hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailPoint {
    Fetch,
    Store,
}

/// What a client did when time advanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// No save was due.
    Idle,
    Saved(RoundOutcome),
    Failed(ErrorCode),
}

/// A document session plus the coordinator that decides when it saves.
#[derive(Debug)]
pub struct SimulatedClient {
    id: ClientId,
    session: DocumentSession,
    coordinator: SaveCoordinator,
}

impl SimulatedClient {
    #[must_use]
    pub fn new(
        id: ClientId,
        proposal_id: i64,
        clock: Arc<dyn Clock>,
        initial: Vec<Block>,
        seed: u64,
    ) -> Self {
        let mut session = DocumentSession::new(proposal_id, clock).with_uid_prefix(format!("c{id}"));
        session.set_blocks(initial, None);
        let coordinator = SaveCoordinator::seeded(SaveConfig::default(), seed ^ u64::try_from(id).unwrap_or(0));
        Self {
            id,
            session,
            coordinator,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        self.session.blocks()
    }

    #[must_use]
    pub const fn session(&self) -> &DocumentSession {
        &self.session
    }

    /// Apply `op` to the session and restart the save debounce.
    ///
    /// # Errors
    ///
    /// Propagates session errors; ops generated from the client's own
    /// blocks never produce one.
    pub fn apply(&mut self, op: &EditOp, now: Instant) -> Result<(), SessionError> {
        match op {
            EditOp::Add { after, kind, text } => {
                self.session.add_block(after, kind.clone(), text)?;
            }
            EditOp::EditText { uid, text } => self.session.update_text(uid, text, false)?,
            EditOp::Remove { uid } => self.session.remove_single_block(uid)?,
            EditOp::TurnInto { uid, kind } => {
                self.session.turn_into(uid, kind.clone(), &TurnInto::default())?;
            }
            EditOp::Move { uid, target, below } => {
                let place = if *below {
                    InsertWhere::Below
                } else {
                    InsertWhere::Above
                };
                self.session.move_block(uid, target, place)?;
            }
        }
        self.coordinator.mark_dirty(now);
        Ok(())
    }

    /// Let the coordinator decide whether to save at `now`, and run the
    /// round if so. `fail` arms a one-shot backend failure for that round.
    ///
    /// # Errors
    ///
    /// Merge errors; backend failures are reported as [`Tick::Failed`].
    pub fn tick(
        &mut self,
        now: Instant,
        backend: &mut MemoryBackend,
        fail: Option<FailPoint>,
    ) -> Result<Tick, MergeError> {
        let Some(ticket) = self.coordinator.poll(now) else {
            return Ok(Tick::Idle);
        };
        match fail {
            Some(FailPoint::Fetch) => backend.fail_next_fetches(1),
            Some(FailPoint::Store) => backend.fail_next_stores(1),
            None => {}
        }
        match run_save_round(&mut self.session, &mut *backend) {
            Ok(outcome) => {
                self.coordinator.succeeded(ticket, now);
                Ok(Tick::Saved(outcome))
            }
            Err(SaveError::Merge(err)) => Err(err),
            Err(err) => {
                debug!(client = self.id, error = %err, "save failed");
                self.coordinator.failed(ticket, now);
                Ok(Tick::Failed(err.code()))
            }
        }
    }

    /// Save right away, outside the coordinator's schedule.
    ///
    /// # Errors
    ///
    /// Any save error.
    pub fn sync(&mut self, backend: &mut MemoryBackend) -> Result<RoundOutcome, SaveError> {
        let outcome = run_save_round(&mut self.session, backend)?;
        self.coordinator.reset();
        Ok(outcome)
    }
}
