pub mod block;
pub mod payload;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::block::{Block, Uid};

/// A stored block sequence, either bare or wrapped the way the document API
/// returns it (`{"blocks": [...]}`, other fields ignored).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Snapshot {
    Bare(Vec<Block>),
    Wrapped { blocks: Vec<Block> },
}

impl Snapshot {
    #[must_use]
    pub fn into_blocks(self) -> Vec<Block> {
        match self {
            Self::Bare(blocks) | Self::Wrapped { blocks } => blocks,
        }
    }
}

/// Parse a JSON block snapshot in either accepted shape.
///
/// # Errors
///
/// Returns the `serde_json` error when the text is neither shape.
pub fn parse_snapshot(raw: &str) -> serde_json::Result<Vec<Block>> {
    serde_json::from_str::<Snapshot>(raw).map(Snapshot::into_blocks)
}

/// First uid that appears more than once in `blocks`, if any.
#[must_use]
pub fn first_duplicate_uid(blocks: &[Block]) -> Option<&Uid> {
    let mut seen: HashSet<&Uid> = HashSet::with_capacity(blocks.len());
    blocks.iter().map(|b| &b.uid).find(|uid| !seen.insert(*uid))
}

/// Indices `i` where `blocks[i]` needs a filler block after it but the
/// next block is not a text block (or there is no next block).
#[must_use]
pub fn missing_fillers(blocks: &[Block]) -> Vec<usize> {
    blocks
        .iter()
        .enumerate()
        .filter(|(i, block)| {
            block.kind.needs_filler()
                && blocks.get(i + 1).is_none_or(|next| !next.kind.is_text())
        })
        .map(|(i, _)| i)
        .collect()
}
