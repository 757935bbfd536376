//! Three-way merge of ordered block sequences.
//!
//! Autosave reconciles three copies of the same document:
//!
//! - `common`: the last sequence the server acknowledged (the merge base),
//! - `local`: the live in-memory sequence, possibly edited since `common`,
//! - `server`: a fresh fetch, possibly edited by another client since `common`.
//!
//! # Per-uid decisions
//!
//! Every uid in the union of the three inputs gets one decision:
//!
//! | present in | decision |
//! |---|---|
//! | server only | insert at the server position |
//! | local only | insert at the local position |
//! | local + server, not common | [`MergeError::UidCollision`] |
//! | common, missing from local or server | remove |
//! | all three | keep; the higher `version` wins content |
//!
//! When local wins a keep (`local.version >= server.version`) it still takes
//! the server position if the server moved the block and local did not.
//!
//! # Ordering
//!
//! Decisions are replayed in version order. Each insert at position `P`
//! pushes back every decision whose current position is `>= P`, itself
//! included, so concurrent inserts at the same spot interleave by version.
//! The final order is a stable sort by the resulting positions.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ErrorCode;
use crate::model::block::{Block, Uid, Version};
use crate::model::first_duplicate_uid;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Which of the three inputs a block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Common,
    Local,
    Server,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Common => "common",
            Self::Local => "local",
            Self::Server => "server",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// Independent inserts on both sides produced the same uid.
    #[error("uid {uid} was inserted independently on both sides")]
    UidCollision { uid: Uid },
    /// One input lists the same uid twice.
    #[error("uid {uid} appears more than once in the {side} sequence")]
    DuplicateUid { side: Side, uid: Uid },
    /// A uid from the union was found in none of the inputs.
    #[error("uid {uid} vanished from every input during merge")]
    Unreachable { uid: Uid },
}

impl MergeError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UidCollision { .. } => ErrorCode::UidCollision,
            Self::DuplicateUid { .. } => ErrorCode::DuplicateUid,
            Self::Unreachable { .. } => ErrorCode::InternalUnexpected,
        }
    }

    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// How decisions with equal versions are ordered before the insertion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Keep first-seen order (common, then server, then local).
    #[default]
    FirstSeen,
    /// Order by uid, independent of input order.
    Uid,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-seen" | "first_seen" | "firstseen" => Ok(Self::FirstSeen),
            "uid" => Ok(Self::Uid),
            other => Err(format!("unknown tie-break '{other}' (expected first-seen or uid)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    pub tie_break: TieBreak,
}

/// What the merge did, for logs and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Blocks only present locally.
    pub inserted_local: usize,
    /// Blocks only present on the server.
    pub inserted_server: usize,
    /// Blocks deleted on either side (or both).
    pub removed: usize,
    /// Blocks in all three inputs where local content won.
    pub kept_local: usize,
    /// Blocks in all three inputs where server content won.
    pub kept_server: usize,
    /// Local-content keeps placed at the server's position because only
    /// the server reordered them.
    pub kept_at_server_position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub blocks: Vec<Block>,
    pub report: MergeReport,
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Insert,
    Keep,
}

#[derive(Debug, Clone, Copy)]
struct Decision<'a> {
    action: Action,
    version: Version,
    block: &'a Block,
    pos: usize,
}

/// uid → (position, block) for one input.
struct Indexed<'a> {
    by_uid: HashMap<&'a Uid, (usize, &'a Block)>,
}

impl<'a> Indexed<'a> {
    fn build(side: Side, blocks: &'a [Block]) -> Result<Self, MergeError> {
        if let Some(uid) = first_duplicate_uid(blocks) {
            return Err(MergeError::DuplicateUid {
                side,
                uid: uid.clone(),
            });
        }
        let by_uid = blocks
            .iter()
            .enumerate()
            .map(|(pos, block)| (&block.uid, (pos, block)))
            .collect();
        Ok(Self { by_uid })
    }

    fn get(&self, uid: &Uid) -> Option<(usize, &'a Block)> {
        self.by_uid.get(uid).copied()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Merge `local` and `server` against their common ancestor with default
/// options.
///
/// # Errors
///
/// [`MergeError::UidCollision`] when a uid is new on both sides, and
/// [`MergeError::DuplicateUid`] when an input repeats a uid.
///
/// # Examples
///
/// ```
/// use folio_core::{Block, BlockType, merge_blocks};
///
/// let a = Block::text(BlockType::Paragraph, "a").with_uid("a");
/// let merged = merge_blocks(&[a.clone()], &[a.clone()], &[a.clone()]).unwrap();
/// assert_eq!(merged, vec![a]);
/// ```
pub fn merge_blocks(
    common: &[Block],
    local: &[Block],
    server: &[Block],
) -> Result<Vec<Block>, MergeError> {
    merge_with_options(common, local, server, &MergeOptions::default()).map(|o| o.blocks)
}

/// Merge with explicit options, returning the blocks and a [`MergeReport`].
///
/// Inputs are only borrowed; the output holds fresh clones.
///
/// # Errors
///
/// See [`merge_blocks`].
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(common = common.len(), local = local.len(), server = server.len())
)]
pub fn merge_with_options(
    common: &[Block],
    local: &[Block],
    server: &[Block],
    options: &MergeOptions,
) -> Result<MergeOutcome, MergeError> {
    let common_ix = Indexed::build(Side::Common, common)?;
    let local_ix = Indexed::build(Side::Local, local)?;
    let server_ix = Indexed::build(Side::Server, server)?;

    let mut seen: HashSet<&Uid> = HashSet::with_capacity(common.len() + local.len());
    let union: Vec<&Uid> = common
        .iter()
        .chain(server)
        .chain(local)
        .map(|b| &b.uid)
        .filter(|uid| seen.insert(*uid))
        .collect();

    let mut report = MergeReport::default();
    let mut decisions: Vec<Decision<'_>> = Vec::with_capacity(union.len());

    for uid in union {
        let c = common_ix.get(uid);
        let l = local_ix.get(uid);
        let s = server_ix.get(uid);

        let decision = match (c, l, s) {
            (None, None, Some((pos, block))) => {
                report.inserted_server += 1;
                Decision {
                    action: Action::Insert,
                    version: block.version,
                    block,
                    pos,
                }
            }
            (None, Some((pos, block)), None) => {
                report.inserted_local += 1;
                Decision {
                    action: Action::Insert,
                    version: block.version,
                    block,
                    pos,
                }
            }
            (None, Some(_), Some(_)) => {
                return Err(MergeError::UidCollision { uid: uid.clone() });
            }
            (Some(_), None, _) | (Some(_), _, None) => {
                // Removes neither move nor get moved; they only drop out.
                report.removed += 1;
                continue;
            }
            (Some((common_pos, _)), Some((local_pos, l)), Some((server_pos, s))) => {
                if l.version >= s.version {
                    report.kept_local += 1;
                    let server_moved = server_pos != common_pos;
                    let local_moved = local_pos != common_pos;
                    let pos = if server_moved && !local_moved {
                        report.kept_at_server_position += 1;
                        server_pos
                    } else {
                        local_pos
                    };
                    Decision {
                        action: Action::Keep,
                        version: l.version,
                        block: l,
                        pos,
                    }
                } else {
                    report.kept_server += 1;
                    Decision {
                        action: Action::Keep,
                        version: s.version,
                        block: s,
                        pos: server_pos,
                    }
                }
            }
            (None, None, None) => {
                return Err(MergeError::Unreachable { uid: uid.clone() });
            }
        };
        decisions.push(decision);
    }

    match options.tie_break {
        TieBreak::FirstSeen => decisions.sort_by_key(|d| d.version),
        TieBreak::Uid => decisions.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.block.uid.cmp(&b.block.uid))
        }),
    }

    apply_insert_shifts(&mut decisions);

    decisions.sort_by_key(|d| d.pos);

    let blocks: Vec<Block> = decisions.into_iter().map(|d| d.block.clone()).collect();

    debug!(
        inserted_local = report.inserted_local,
        inserted_server = report.inserted_server,
        removed = report.removed,
        kept_local = report.kept_local,
        kept_server = report.kept_server,
        kept_at_server_position = report.kept_at_server_position,
        merged = blocks.len(),
        "merged block sequences"
    );

    Ok(MergeOutcome { blocks, report })
}

/// Replay inserts in the current (version) order. The threshold is re-read
/// for every comparison: once the inserting decision shifts itself, later
/// decisions compare against `P + 1`.
fn apply_insert_shifts(decisions: &mut [Decision<'_>]) {
    for i in 0..decisions.len() {
        if decisions[i].action != Action::Insert {
            continue;
        }
        for j in 0..decisions.len() {
            if decisions[j].pos >= decisions[i].pos {
                decisions[j].pos += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::block::BlockType;

    fn blk(uid: &str, version: i64) -> Block {
        Block::text(BlockType::Paragraph, uid)
            .with_uid(uid)
            .with_version(version)
    }

    fn edited(uid: &str, version: i64, value: &str) -> Block {
        Block::text(BlockType::Paragraph, value)
            .with_uid(uid)
            .with_version(version)
    }

    fn uids(blocks: &[Block]) -> Vec<&str> {
        blocks.iter().map(|b| b.uid.as_str()).collect()
    }

    fn merge(common: &[Block], local: &[Block], server: &[Block]) -> Vec<Block> {
        merge_blocks(common, local, server).expect("merge")
    }

    fn doc_a() -> Vec<Block> {
        vec![blk("uid_1", 0), blk("uid_2", 1)]
    }

    fn doc_a_flipped() -> Vec<Block> {
        vec![blk("uid_2", 2), blk("uid_1", 1)]
    }

    fn doc_b() -> Vec<Block> {
        vec![blk("uid_1", 1), blk("uid_3", 2)]
    }

    fn doc_c() -> Vec<Block> {
        vec![blk("uid_1", 1), blk("uid_2", 1)]
    }

    // === Basic cases ===

    #[test]
    fn all_empty() {
        assert!(merge(&[], &[], &[]).is_empty());
    }

    #[test]
    fn identical_inputs_are_returned_unchanged() {
        let doc = vec![blk("a", 3), blk("b", 1), blk("c", 2)];
        assert_eq!(merge(&doc, &doc, &doc), doc);
    }

    #[test]
    fn unchanged_side_yields_the_other_side() {
        assert_eq!(merge(&doc_a(), &doc_a(), &doc_b()), doc_b());
        assert_eq!(merge(&doc_a(), &doc_b(), &doc_a()), doc_b());
        assert_eq!(merge(&doc_b(), &doc_b(), &doc_a()), doc_c());
        assert_eq!(merge(&doc_b(), &doc_a(), &doc_b()), doc_c());
    }

    #[test]
    fn concurrent_inserts_interleave_by_version() {
        let common = vec![blk("uid_2", 0)];
        let local = doc_a();
        let server = vec![blk("uid_3", 1), blk("uid_2", 1)];
        let expected = vec![blk("uid_3", 1), blk("uid_1", 0), blk("uid_2", 1)];
        assert_eq!(merge(&common, &local, &server), expected);
    }

    #[test]
    fn server_reorder_is_adopted() {
        assert_eq!(merge(&doc_a(), &doc_a(), &doc_a_flipped()), doc_a_flipped());
    }

    #[test]
    fn local_edit_and_remote_insert() {
        let common = vec![edited("A", 0, "old")];
        let local = vec![edited("A", 1, "new")];
        let server = vec![edited("A", 0, "old"), blk("B", 2)];
        let merged = merge(&common, &local, &server);
        assert_eq!(merged, vec![edited("A", 1, "new"), blk("B", 2)]);
    }

    // === Deletions ===

    #[test]
    fn deletion_on_either_side_propagates() {
        let common = vec![blk("a", 0), blk("b", 0), blk("c", 0)];
        let local = vec![blk("a", 0), blk("c", 0)];
        let server = vec![blk("a", 0), blk("b", 0)];
        assert_eq!(uids(&merge(&common, &local, &server)), vec!["a"]);
    }

    #[test]
    fn deletion_wins_over_concurrent_edit() {
        let common = vec![blk("a", 0)];
        let local = vec![edited("a", 9, "edited")];
        assert!(merge(&common, &local, &[]).is_empty());
    }

    #[test]
    fn deleted_on_both_sides() {
        let common = vec![blk("a", 0), blk("b", 0)];
        let rest = vec![blk("b", 0)];
        assert_eq!(uids(&merge(&common, &rest, &rest)), vec!["b"]);
    }

    // === Content resolution ===

    #[test]
    fn higher_version_wins_content() {
        let common = vec![edited("a", 1, "base")];
        let local = vec![edited("a", 5, "mine")];
        let server = vec![edited("a", 7, "theirs")];
        assert_eq!(merge(&common, &local, &server)[0].text_value(), Some("theirs"));

        let server = vec![edited("a", 3, "theirs")];
        assert_eq!(merge(&common, &local, &server)[0].text_value(), Some("mine"));
    }

    #[test]
    fn local_wins_equal_versions() {
        let common = vec![edited("a", 1, "base")];
        let local = vec![edited("a", 4, "mine")];
        let server = vec![edited("a", 4, "theirs")];
        assert_eq!(merge(&common, &local, &server)[0].text_value(), Some("mine"));
    }

    #[test]
    fn local_content_keeps_server_move() {
        // Server moved `a` to the end; local only edited `a`.
        let common = vec![blk("a", 1), blk("b", 1), blk("c", 1)];
        let local = vec![edited("a", 9, "edited"), blk("b", 1), blk("c", 1)];
        let server = vec![blk("b", 1), blk("c", 1), blk("a", 2)];
        let merged = merge_with_options(&common, &local, &server, &MergeOptions::default())
            .expect("merge");
        assert_eq!(uids(&merged.blocks), vec!["b", "c", "a"]);
        assert_eq!(merged.blocks[2].text_value(), Some("edited"));
        // b and c shifted up on the server only, so they follow it too.
        assert_eq!(merged.report.kept_at_server_position, 3);
    }

    #[test]
    fn local_reorder_is_kept() {
        let common = vec![blk("a", 1), blk("b", 1), blk("c", 1)];
        let local = vec![blk("b", 1), blk("a", 5), blk("c", 1)];
        assert_eq!(uids(&merge(&common, &local, &common)), vec!["b", "a", "c"]);
    }

    #[test]
    fn moves_on_both_sides_settle_by_position_then_version() {
        // Local moved `a` to the middle, server moved it to the end. Local
        // wins `a` (newer) but `c` follows the server up one slot, so `a`
        // and `c` tie on position 1 and version order puts `c` first.
        let common = vec![blk("a", 1), blk("b", 1), blk("c", 1)];
        let local = vec![blk("b", 1), blk("a", 5), blk("c", 1)];
        let server = vec![blk("b", 1), blk("c", 1), blk("a", 2)];
        assert_eq!(uids(&merge(&common, &local, &server)), vec!["b", "c", "a"]);
    }

    // === Errors ===

    #[test]
    fn independent_inserts_with_same_uid_collide() {
        let err = merge_blocks(&[], &[blk("x", 1)], &[blk("x", 2)]).expect_err("collision");
        assert_eq!(err, MergeError::UidCollision { uid: Uid::from("x") });
        assert_eq!(err.code(), ErrorCode::UidCollision);
        assert!(err.hint().is_some());
    }

    #[test]
    fn duplicate_uid_in_one_input_is_rejected() {
        let err = merge_blocks(&[], &[blk("x", 1), blk("x", 2)], &[]).expect_err("duplicate");
        assert_eq!(
            err,
            MergeError::DuplicateUid {
                side: Side::Local,
                uid: Uid::from("x")
            }
        );
        assert_eq!(err.to_string(), "uid x appears more than once in the local sequence");
    }

    // === Report ===

    #[test]
    fn report_counts_every_decision() {
        let common = vec![blk("keep", 1), blk("gone", 1), blk("theirs", 1)];
        let local = vec![blk("keep", 2), blk("theirs", 1), blk("mine", 3)];
        let server = vec![blk("keep", 1), blk("gone", 1), blk("theirs", 4), blk("new", 5)];
        let outcome =
            merge_with_options(&common, &local, &server, &MergeOptions::default()).expect("merge");
        assert_eq!(
            outcome.report,
            MergeReport {
                inserted_local: 1,
                inserted_server: 1,
                removed: 1,
                kept_local: 1,
                kept_server: 1,
                kept_at_server_position: 0,
            }
        );
        assert_eq!(outcome.blocks.len(), 4);
    }

    // === Tie-break ===

    #[test]
    fn tie_break_mode_orders_equal_versions() {
        let local = vec![blk("a", 1)];
        let server = vec![blk("b", 1)];

        let first_seen = merge_blocks(&[], &local, &server).expect("merge");
        assert_eq!(uids(&first_seen), vec!["a", "b"]);

        let by_uid = merge_with_options(
            &[],
            &local,
            &server,
            &MergeOptions {
                tie_break: TieBreak::Uid,
            },
        )
        .expect("merge");
        assert_eq!(uids(&by_uid.blocks), vec!["b", "a"]);
    }

    #[test]
    fn uid_tie_break_ignores_input_order() {
        let options = MergeOptions {
            tie_break: TieBreak::Uid,
        };
        let one = merge_with_options(&[], &[blk("a", 1)], &[blk("b", 1)], &options)
            .expect("merge")
            .blocks;
        let two = merge_with_options(&[], &[blk("b", 1)], &[blk("a", 1)], &options)
            .expect("merge")
            .blocks;
        assert_eq!(uids(&one), uids(&two));
    }

    #[test]
    fn tie_break_parses() {
        assert_eq!("uid".parse::<TieBreak>(), Ok(TieBreak::Uid));
        assert_eq!("First-Seen".parse::<TieBreak>(), Ok(TieBreak::FirstSeen));
        assert!("random".parse::<TieBreak>().is_err());
    }

    #[test]
    fn inputs_are_not_mutated() {
        let common = doc_a();
        let local = doc_b();
        let server = doc_a_flipped();
        let _ = merge(&common, &local, &server);
        assert_eq!(common, doc_a());
        assert_eq!(local, doc_b());
        assert_eq!(server, doc_a_flipped());
    }
}
