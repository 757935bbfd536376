//! An owned editing session over one document.
//!
//! [`DocumentSession`] holds the live block sequence, the merge base used by
//! autosave, an undo snapshot for destructive removals and a ledger of
//! optimistic mutations. All mutation goes through its methods, and
//! subscribed listeners receive a [`SessionEvent`] after each change.
//!
//! Mutations apply immediately and open a [`PendingOp`]. A successful save
//! round confirms them; a round that has to give up on the local copy rolls
//! them back and adopts the server blocks.

mod events;

pub use events::{ListenerId, OpId, OpState, PendingOp, SessionEvent};

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::ErrorCode;
use crate::merge::{MergeError, MergeOptions, merge_with_options};
use crate::model::block::{Block, BlockType, UNASSIGNED_PROPOSAL, Uid};
use crate::model::missing_fillers;
use crate::model::payload::{
    self, CostTableData, CostTableLabel, CostTableSection, MoveDirection, TableData, TableEdit, TurnInto,
};
use events::{Ledger, Listeners};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("block {uid} not found")]
    BlockNotFound { uid: Uid },
    #[error("block {uid} is a {kind} block, expected {expected}")]
    WrongBlockType {
        uid: Uid,
        kind: BlockType,
        expected: &'static str,
    },
    #[error("block {uid} has a malformed payload: {reason}")]
    InvalidPayload { uid: Uid, reason: String },
    #[error("block {uid} has no entry {index}")]
    IndexOutOfRange { uid: Uid, index: usize },
    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl SessionError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::BlockNotFound { .. } => ErrorCode::BlockNotFound,
            Self::WrongBlockType { .. } => ErrorCode::WrongBlockType,
            Self::InvalidPayload { .. } => ErrorCode::InvalidPayload,
            Self::IndexOutOfRange { .. } => ErrorCode::IndexOutOfRange,
            Self::Merge(err) => err.code(),
        }
    }
}

/// Where a dragged block lands relative to its drop target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertWhere {
    Above,
    Below,
}

#[derive(Debug, Clone)]
struct UndoSnapshot {
    blocks: Vec<Block>,
    focus: Uid,
}

/// How the session names blocks it creates itself.
#[derive(Debug, Clone)]
enum UidSource {
    Random,
    Sequential { prefix: String, next: u64 },
}

impl UidSource {
    fn next(&mut self) -> Uid {
        match self {
            Self::Random => Uid::generate(),
            Self::Sequential { prefix, next } => {
                let uid = Uid::new(format!("{prefix}-{next}"));
                *next += 1;
                uid
            }
        }
    }
}

pub struct DocumentSession {
    proposal_id: i64,
    blocks: Vec<Block>,
    blocks_for_merge: Vec<Block>,
    undo: Option<UndoSnapshot>,
    listeners: Listeners,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    merge_options: MergeOptions,
    uids: UidSource,
}

impl fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSession")
            .field("proposal_id", &self.proposal_id)
            .field("blocks", &self.blocks.len())
            .field("blocks_for_merge", &self.blocks_for_merge.len())
            .field("pending", &self.ledger.pending())
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl DocumentSession {
    /// Empty session for `proposal_id`. Pass [`UNASSIGNED_PROPOSAL`] when the
    /// document has not been created on the server yet.
    #[must_use]
    pub fn new(proposal_id: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            proposal_id,
            blocks: Vec::new(),
            blocks_for_merge: Vec::new(),
            undo: None,
            listeners: Listeners::default(),
            ledger: Ledger::default(),
            clock,
            merge_options: MergeOptions::default(),
            uids: UidSource::Random,
        }
    }

    #[must_use]
    pub const fn with_merge_options(mut self, options: MergeOptions) -> Self {
        self.merge_options = options;
        self
    }

    /// Name blocks created by the session `{prefix}-0`, `{prefix}-1`, ...
    /// instead of random uuids, for reproducible runs.
    #[must_use]
    pub fn with_uid_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.uids = UidSource::Sequential {
            prefix: prefix.into(),
            next: 0,
        };
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The last sequence the server acknowledged.
    #[must_use]
    pub fn blocks_for_merge(&self) -> &[Block] {
        &self.blocks_for_merge
    }

    /// Proposal id of the loaded blocks, falling back to the session's own.
    #[must_use]
    pub fn current_proposal_id(&self) -> i64 {
        self.blocks
            .first()
            .map(|b| b.proposal_id)
            .filter(|&id| id != UNASSIGNED_PROPOSAL)
            .unwrap_or(self.proposal_id)
    }

    #[must_use]
    pub fn find_index(&self, uid: &Uid) -> Option<usize> {
        self.blocks.iter().position(|b| &b.uid == uid)
    }

    #[must_use]
    pub fn find_block(&self, uid: &Uid) -> Option<(usize, &Block)> {
        self.find_index(uid).map(|ix| (ix, &self.blocks[ix]))
    }

    fn index_of(&self, uid: &Uid) -> Result<usize, SessionError> {
        self.find_index(uid)
            .ok_or_else(|| SessionError::BlockNotFound { uid: uid.clone() })
    }

    fn expect_kind(&self, ix: usize, kind: &BlockType) -> Result<(), SessionError> {
        let block = &self.blocks[ix];
        if &block.kind == kind {
            Ok(())
        } else {
            Err(SessionError::WrongBlockType {
                uid: block.uid.clone(),
                kind: block.kind.clone(),
                expected: match kind {
                    BlockType::Payment => "payment",
                    BlockType::CostTable => "cost_table",
                    BlockType::Table => "table",
                    BlockType::Embed => "embed",
                    BlockType::Quote => "quote",
                    _ => "other",
                },
            })
        }
    }

    // -----------------------------------------------------------------------
    // Listeners and the pending-op ledger
    // -----------------------------------------------------------------------

    pub fn subscribe(&mut self, listener: impl FnMut(&SessionEvent) + Send + 'static) -> ListenerId {
        self.listeners.add(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    #[must_use]
    pub const fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn pending_ops(&self) -> &[PendingOp] {
        self.ledger.ops()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.ledger.pending()
    }

    /// Mark every pending op as acknowledged by the server.
    pub fn confirm_pending(&mut self) -> usize {
        self.ledger.settle(OpState::Confirmed)
    }

    /// Give up on local edits: pending ops become rolled back and the
    /// session adopts `server` as both live blocks and merge base.
    pub fn roll_back_pending(&mut self, server: Vec<Block>) -> usize {
        let ops = self.ledger.settle(OpState::RolledBack);
        warn!(ops, proposal_id = self.proposal_id, "rolling back unsaved edits");
        self.undo = None;
        self.set_blocks(server.clone(), Some(server));
        self.listeners.emit(&SessionEvent::RolledBack { ops });
        ops
    }

    fn request_save(&mut self, action: &'static str) -> OpId {
        let op = self.ledger.open(action);
        debug!(op = op.0, action, "save requested");
        self.listeners.emit(&SessionEvent::Changed);
        self.listeners.emit(&SessionEvent::SaveRequested);
        op
    }

    fn mark_for_saving(&mut self, action: &'static str) -> OpId {
        self.fill();
        self.request_save(action)
    }

    fn stamp(&mut self, ix: usize) {
        self.blocks[ix].version = self.clock.now_version();
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Replace the live blocks with `data`.
    ///
    /// Blocks without a proposal id get the current one. `blocks_for_merge`
    /// is the server's acknowledgement when there is one, otherwise a copy
    /// of `data`. A document is never left empty: an empty `data` yields one
    /// empty paragraph.
    pub fn set_blocks(&mut self, data: Vec<Block>, blocks_for_merge: Option<Vec<Block>>) {
        let proposal_id = self.current_proposal_id();
        let mut blocks = data;
        for block in &mut blocks {
            if block.proposal_id == UNASSIGNED_PROPOSAL {
                block.proposal_id = proposal_id;
            }
        }
        self.blocks_for_merge = blocks_for_merge.unwrap_or_else(|| blocks.clone());

        if blocks.is_empty() {
            blocks.push(self.filler(proposal_id));
        }
        self.blocks = blocks;
        self.listeners.emit(&SessionEvent::Reset);
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.blocks_for_merge.clear();
        self.undo = None;
        self.ledger.clear();
        self.listeners.emit(&SessionEvent::Reset);
    }

    fn filler(&mut self, proposal_id: i64) -> Block {
        let mut block = Block::text(BlockType::Paragraph, "")
            .with_uid(self.uids.next())
            .with_proposal(proposal_id);
        block.version = self.clock.now_version();
        block
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Stamp a fresh version on `block`, store it at `index` and request a
    /// save. With `filler` set, empty paragraphs are inserted where needed.
    ///
    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] when `index` is past the end.
    pub fn save_block(&mut self, block: Block, index: usize, filler: bool) -> Result<OpId, SessionError> {
        if index >= self.blocks.len() {
            return Err(SessionError::BlockNotFound { uid: block.uid });
        }
        self.blocks[index] = block;
        self.stamp(index);
        Ok(if filler {
            self.mark_for_saving("save_block")
        } else {
            self.request_save("save_block")
        })
    }

    /// Insert an empty paragraph after every block that cannot hold a caret
    /// and is not already followed by a text block. Does nothing until the
    /// document has a proposal id. Returns the number of fillers inserted.
    pub fn insert_filler_blocks(&mut self) -> usize {
        let inserted = self.fill();
        if inserted > 0 {
            self.listeners.emit(&SessionEvent::Changed);
        }
        inserted
    }

    fn fill(&mut self) -> usize {
        let proposal_id = self.current_proposal_id();
        if proposal_id == UNASSIGNED_PROPOSAL {
            return 0;
        }
        for block in &mut self.blocks {
            if block.proposal_id == UNASSIGNED_PROPOSAL {
                block.proposal_id = proposal_id;
            }
        }
        if self.blocks.is_empty() {
            let filler = self.filler(proposal_id);
            self.blocks.push(filler);
            return 1;
        }
        let missing = missing_fillers(&self.blocks);
        for &ix in missing.iter().rev() {
            let filler = self.filler(proposal_id);
            self.blocks.insert(ix + 1, filler);
        }
        missing.len()
    }

    /// Insert a new text block after `after` and return its uid.
    ///
    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] when `after` is not in the document.
    pub fn add_block(&mut self, after: &Uid, kind: BlockType, value: &str) -> Result<Uid, SessionError> {
        let ix = self.index_of(after)?;
        let uid = self.uids.next();
        let mut block = Block::text(kind, value)
            .with_uid(uid.clone())
            .with_proposal(self.current_proposal_id());
        block.version = self.clock.now_version();
        self.blocks.insert(ix + 1, block);
        self.mark_for_saving("add_block");
        Ok(uid)
    }

    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] when `uid` is not in the document.
    pub fn remove_single_block(&mut self, uid: &Uid) -> Result<(), SessionError> {
        let ix = self.index_of(uid)?;
        self.blocks.remove(ix);
        self.mark_for_saving("remove_single_block");
        Ok(())
    }

    /// Number of blocks a removal or move starting at `ix` takes along: a
    /// heading owns everything up to the next heading of equal or higher
    /// level.
    fn span(&self, ix: usize) -> usize {
        let kind = &self.blocks[ix].kind;
        if !kind.is_heading() {
            return 1;
        }
        let level = kind.heading_level();
        let end = self.blocks[ix + 1..]
            .iter()
            .position(|b| b.kind.is_heading() && b.kind.heading_level() <= level)
            .map_or(self.blocks.len(), |offset| ix + 1 + offset);
        end - ix
    }

    /// Remove a heading and its section, keeping an undo snapshot. Returns
    /// the number of blocks removed.
    ///
    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] when `uid` is not in the document.
    pub fn remove_container(&mut self, uid: &Uid) -> Result<usize, SessionError> {
        let ix = self.index_of(uid)?;
        let count = self.span(ix);
        self.undo = Some(UndoSnapshot {
            blocks: self.blocks.clone(),
            focus: uid.clone(),
        });
        self.blocks.drain(ix..ix + count);
        self.mark_for_saving("remove_container");
        Ok(count)
    }

    /// Remove `uid` (with its section when it is a heading) so that
    /// [`Self::undo`] can bring it back.
    ///
    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] when `uid` is not in the document.
    pub fn remove_with_undo(&mut self, uid: &Uid) -> Result<usize, SessionError> {
        let ix = self.index_of(uid)?;
        if self.blocks[ix].kind.is_heading() {
            return self.remove_container(uid);
        }
        self.undo = Some(UndoSnapshot {
            blocks: self.blocks.clone(),
            focus: uid.clone(),
        });
        self.remove_single_block(uid)?;
        Ok(1)
    }

    /// Restore the blocks from before the last undoable removal. Returns the
    /// uid to refocus, or `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<Uid> {
        let snapshot = self.undo.take()?;
        self.blocks = snapshot.blocks;
        self.request_save("undo");
        Some(snapshot.focus)
    }

    #[must_use]
    pub const fn can_undo(&self) -> bool {
        self.undo.is_some()
    }

    /// Set the text (or caption) of a block.
    ///
    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] when `uid` is not in the document.
    pub fn update_text(&mut self, uid: &Uid, value: &str, is_caption: bool) -> Result<(), SessionError> {
        let ix = self.index_of(uid)?;
        let block = &mut self.blocks[ix];
        if is_caption {
            block.set_field("caption", Value::String(value.to_string()));
        } else {
            block.set_text_value(value);
        }
        self.stamp(ix);
        self.mark_for_saving("update_text");
        Ok(())
    }

    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] for an unknown uid and
    /// [`SessionError::WrongBlockType`] unless the block is an embed.
    pub fn set_embed_url(&mut self, uid: &Uid, url: &str) -> Result<(), SessionError> {
        let ix = self.index_of(uid)?;
        self.expect_kind(ix, &BlockType::Embed)?;
        let block = &mut self.blocks[ix];
        block.set_field("url", Value::String(url.to_string()));
        block.set_field("caption", Value::String(String::new()));
        self.stamp(ix);
        self.mark_for_saving("set_embed_url");
        Ok(())
    }

    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] for an unknown uid and
    /// [`SessionError::WrongBlockType`] unless the block is a quote.
    pub fn update_quote(&mut self, uid: &Uid, quote: &str, source: &str) -> Result<(), SessionError> {
        let ix = self.index_of(uid)?;
        self.expect_kind(ix, &BlockType::Quote)?;
        let block = &mut self.blocks[ix];
        block.set_field("quote", Value::String(quote.to_string()));
        block.set_field("source", Value::String(source.to_string()));
        self.stamp(ix);
        self.mark_for_saving("update_quote");
        Ok(())
    }

    /// Convert a block to `kind`. See [`payload::turn_into`].
    ///
    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] when `uid` is not in the document.
    pub fn turn_into(&mut self, uid: &Uid, kind: BlockType, options: &TurnInto) -> Result<(), SessionError> {
        let ix = self.index_of(uid)?;
        let is_payment = kind == BlockType::Payment;
        payload::turn_into(&mut self.blocks[ix], kind, options);
        self.stamp(ix);
        if is_payment {
            self.refresh_payment_amount();
        }
        self.mark_for_saving("turn_into");
        Ok(())
    }

    /// Append the text of `uid` to the previous block and remove `uid`.
    /// Returns `false` when `uid` is first or either block is not text.
    ///
    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] when `uid` is not in the document.
    pub fn merge_with_previous(&mut self, uid: &Uid) -> Result<bool, SessionError> {
        let ix = self.index_of(uid)?;
        if ix == 0 {
            return Ok(false);
        }
        let (prev, curr) = (&self.blocks[ix - 1], &self.blocks[ix]);
        if !prev.kind.is_text() || !curr.kind.is_text() {
            return Ok(false);
        }
        let joined = format!(
            "{}{}",
            prev.text_value().unwrap_or_default(),
            curr.text_value().unwrap_or_default()
        );
        self.blocks[ix - 1].set_text_value(joined);
        self.stamp(ix - 1);
        self.blocks.remove(ix);
        self.mark_for_saving("merge_with_previous");
        Ok(true)
    }

    /// Insert `blocks` after `uid`, or in its place with `replace_current`.
    /// Every inserted block gets the current proposal id and a fresh
    /// version. Returns the uid of the last inserted block.
    ///
    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] when `uid` is not in the document.
    pub fn batch_add(
        &mut self,
        uid: &Uid,
        blocks: Vec<Block>,
        replace_current: bool,
    ) -> Result<Option<Uid>, SessionError> {
        let ix = self.index_of(uid)?;
        let proposal_id = self.current_proposal_id();
        let version = self.clock.now_version();
        let blocks: Vec<Block> = blocks
            .into_iter()
            .map(|mut b| {
                b.proposal_id = proposal_id;
                b.version = version;
                b
            })
            .collect();
        let last = blocks.last().map(|b| b.uid.clone());
        let at = if replace_current { ix } else { ix + 1 };
        let remove = usize::from(replace_current);
        self.blocks.splice(at..at + remove, blocks);
        self.mark_for_saving("batch_add");
        Ok(last)
    }

    /// Drag `uid` above or below `target`. A heading brings its section
    /// along; every block whose position changed gets a fresh version.
    ///
    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] when `uid` or `target` is missing.
    pub fn move_block(&mut self, uid: &Uid, target: &Uid, place: InsertWhere) -> Result<(), SessionError> {
        let from = self.index_of(uid)?;
        let target_ix = self.index_of(target)?;
        if from == target_ix {
            return Ok(());
        }
        let offset = match place {
            InsertWhere::Above => 0,
            InsertWhere::Below => 1,
        };
        let version = self.clock.now_version();

        if !self.blocks[from].kind.is_heading() {
            let mut block = self.blocks.remove(from);
            block.version = version;
            let at = target_ix + offset - usize::from(from < target_ix);
            self.blocks.insert(at, block);
            self.mark_for_saving("move_block");
            return Ok(());
        }

        let count = self.span(from);
        // dropping a section inside itself
        if (from..from + count).contains(&target_ix) {
            return Ok(());
        }
        let before: Vec<Uid> = self.blocks.iter().map(|b| b.uid.clone()).collect();
        let moved: Vec<Block> = self.blocks.drain(from..from + count).collect();
        let at = target_ix + offset - if from < target_ix { count } else { 0 };
        self.blocks.splice(at..at, moved);
        for (block, old) in self.blocks.iter_mut().zip(&before) {
            if &block.uid != old {
                block.version = version;
            }
        }
        self.mark_for_saving("move_block");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cost tables and payments
    // -----------------------------------------------------------------------

    /// Decode the cost table at `uid`, let `edit` change it and write it back
    /// with fresh totals. A payload that does not decode is left alone.
    /// Nothing is saved when `edit` reports no change.
    fn edit_cost_table(
        &mut self,
        uid: &Uid,
        action: &'static str,
        edit: impl FnOnce(&mut CostTableData) -> Result<bool, SessionError>,
    ) -> Result<bool, SessionError> {
        let ix = self.index_of(uid)?;
        self.expect_kind(ix, &BlockType::CostTable)?;
        let mut table = CostTableData::decode(&self.blocks[ix]).map_err(|err| {
            warn!(%uid, error = %err, "cost table payload does not decode");
            SessionError::InvalidPayload {
                uid: uid.clone(),
                reason: err.to_string(),
            }
        })?;
        if !edit(&mut table)? {
            return Ok(false);
        }
        table.recompute();
        table.write_to(&mut self.blocks[ix]);
        self.stamp(ix);
        self.refresh_payment_amount();
        self.mark_for_saving(action);
        Ok(true)
    }

    /// # Errors
    ///
    /// As [`Self::set_cost_table_discount`].
    pub fn set_cost_table_currency(&mut self, uid: &Uid, currency: &str) -> Result<(), SessionError> {
        self.edit_cost_table(uid, "set_cost_table_currency", |table| {
            currency.clone_into(&mut table.currency);
            table.version += 1;
            Ok(true)
        })
        .map(drop)
    }

    /// # Errors
    ///
    /// As [`Self::set_cost_table_discount`].
    pub fn set_cost_table_headers(
        &mut self,
        uid: &Uid,
        headers: Vec<Option<String>>,
    ) -> Result<(), SessionError> {
        self.edit_cost_table(uid, "set_cost_table_headers", |table| {
            table.headers = headers;
            Ok(true)
        })
        .map(drop)
    }

    /// # Errors
    ///
    /// As [`Self::set_cost_table_discount`].
    pub fn set_cost_table_label(
        &mut self,
        uid: &Uid,
        label: CostTableLabel,
        value: &str,
    ) -> Result<(), SessionError> {
        self.edit_cost_table(uid, "set_cost_table_label", |table| {
            table.set_label(label, value);
            Ok(true)
        })
        .map(drop)
    }

    /// Set the discount of a cost table and recompute its totals.
    ///
    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`], [`SessionError::WrongBlockType`] for
    /// anything but a cost table, and [`SessionError::InvalidPayload`] when the
    /// stored table does not decode. The block is unchanged on error.
    pub fn set_cost_table_discount(&mut self, uid: &Uid, discount: &str) -> Result<(), SessionError> {
        self.edit_cost_table(uid, "set_cost_table_discount", |table| {
            discount.clone_into(&mut table.discount);
            table.version += 1;
            Ok(true)
        })
        .map(drop)
    }

    /// Replace section `index` of a cost table.
    ///
    /// # Errors
    ///
    /// As [`Self::set_cost_table_discount`], plus
    /// [`SessionError::IndexOutOfRange`] when there is no section `index`.
    pub fn save_cost_table_section(
        &mut self,
        uid: &Uid,
        index: usize,
        section: CostTableSection,
    ) -> Result<(), SessionError> {
        self.edit_cost_table(uid, "save_cost_table_section", |table| {
            let slot = table.sections.get_mut(index).ok_or_else(|| SessionError::IndexOutOfRange {
                uid: uid.clone(),
                index,
            })?;
            *slot = section;
            Ok(true)
        })
        .map(drop)
    }

    /// Insert an empty section after section `index`.
    ///
    /// # Errors
    ///
    /// As [`Self::set_cost_table_discount`].
    pub fn add_cost_table_section(&mut self, uid: &Uid, index: usize) -> Result<(), SessionError> {
        self.edit_cost_table(uid, "add_cost_table_section", |table| {
            table.add_section(index);
            table.version += 1;
            Ok(true)
        })
        .map(drop)
    }

    /// # Errors
    ///
    /// As [`Self::set_cost_table_discount`], plus
    /// [`SessionError::IndexOutOfRange`] when there is no section `index`.
    pub fn remove_cost_table_section(&mut self, uid: &Uid, index: usize) -> Result<(), SessionError> {
        self.edit_cost_table(uid, "remove_cost_table_section", |table| {
            if !table.remove_section(index) {
                return Err(SessionError::IndexOutOfRange {
                    uid: uid.clone(),
                    index,
                });
            }
            table.version += 1;
            Ok(true)
        })
        .map(drop)
    }

    /// Swap section `index` with its neighbour. Returns `false`, without
    /// saving, when the section is already at that edge.
    ///
    /// # Errors
    ///
    /// As [`Self::set_cost_table_discount`], plus
    /// [`SessionError::IndexOutOfRange`] when there is no section `index`.
    pub fn move_cost_table_section(
        &mut self,
        uid: &Uid,
        index: usize,
        direction: MoveDirection,
    ) -> Result<bool, SessionError> {
        self.edit_cost_table(uid, "move_cost_table_section", |table| {
            if index >= table.sections.len() {
                return Err(SessionError::IndexOutOfRange {
                    uid: uid.clone(),
                    index,
                });
            }
            let moved = table.move_section(index, direction);
            if moved {
                table.version += 1;
            }
            Ok(moved)
        })
    }

    /// Apply one row, column or cell edit to a plain table.
    ///
    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`], [`SessionError::WrongBlockType`] for
    /// anything but a table, and [`SessionError::InvalidPayload`] when the stored
    /// table does not decode.
    pub fn edit_table(&mut self, uid: &Uid, edit: TableEdit) -> Result<(), SessionError> {
        let ix = self.index_of(uid)?;
        self.expect_kind(ix, &BlockType::Table)?;
        let mut table =
            TableData::decode(&self.blocks[ix]).map_err(|err| SessionError::InvalidPayload {
                uid: uid.clone(),
                reason: err.to_string(),
            })?;
        table.apply(edit);
        table.write_to(&mut self.blocks[ix]);
        self.stamp(ix);
        self.mark_for_saving("edit_table");
        Ok(())
    }

    /// Copy the document total into the first payment block unless its
    /// amount was set by hand. Returns whether a block was updated.
    pub fn update_payment_amount(&mut self) -> bool {
        let updated = self.refresh_payment_amount();
        if updated {
            self.request_save("update_payment_amount");
        }
        updated
    }

    fn refresh_payment_amount(&mut self) -> bool {
        let Some(ix) = self.blocks.iter().position(|b| b.kind == BlockType::Payment) else {
            return false;
        };
        let forced = self.blocks[ix]
            .data
            .get("amountIsForced")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if forced {
            return false;
        }
        let amount = self.total_amount();
        self.blocks[ix].set_field("amount", json!(amount));
        self.stamp(ix);
        true
    }

    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] for an unknown uid and
    /// [`SessionError::WrongBlockType`] unless the block is a payment.
    pub fn force_payment_amount(&mut self, uid: &Uid, amount: f64) -> Result<(), SessionError> {
        let ix = self.index_of(uid)?;
        self.expect_kind(ix, &BlockType::Payment)?;
        self.blocks[ix].set_field("amount", json!(amount));
        self.blocks[ix].set_field("amountIsForced", Value::Bool(true));
        self.stamp(ix);
        self.mark_for_saving("force_payment_amount");
        Ok(())
    }

    /// # Errors
    ///
    /// [`SessionError::BlockNotFound`] for an unknown uid and
    /// [`SessionError::WrongBlockType`] unless the block is a payment.
    pub fn change_payment_percentage(&mut self, uid: &Uid, percentage: f64) -> Result<(), SessionError> {
        let ix = self.index_of(uid)?;
        self.expect_kind(ix, &BlockType::Payment)?;
        self.blocks[ix].set_field("percentage", json!(percentage));
        self.stamp(ix);
        self.mark_for_saving("change_payment_percentage");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn has_signature(&self) -> bool {
        self.blocks.iter().any(|b| b.kind == BlockType::Signature)
    }

    #[must_use]
    pub fn has_payment(&self) -> bool {
        self.blocks.iter().any(|b| b.kind == BlockType::Payment)
    }

    /// Sum of every cost table's total.
    #[must_use]
    pub fn total_amount(&self) -> f64 {
        self.blocks
            .iter()
            .filter(|b| b.kind == BlockType::CostTable)
            .filter_map(|b| b.data.get("total").and_then(Value::as_f64))
            .sum()
    }

    /// Currency of the last cost table, if any.
    #[must_use]
    pub fn currency(&self) -> Option<&str> {
        self.blocks
            .iter()
            .rev()
            .find(|b| b.kind == BlockType::CostTable)
            .and_then(|b| b.data.get("currency"))
            .and_then(Value::as_str)
    }

    /// Three-way merge of the merge base, the live blocks and `server`.
    /// The session is not modified.
    ///
    /// # Errors
    ///
    /// Whatever [`merge_with_options`] reports, most often
    /// [`MergeError::UidCollision`].
    pub fn reconcile(&self, server: &[Block]) -> Result<Vec<Block>, MergeError> {
        merge_with_options(&self.blocks_for_merge, &self.blocks, server, &self.merge_options)
            .map(|outcome| outcome.blocks)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
