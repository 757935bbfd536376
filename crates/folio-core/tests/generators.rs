#![allow(dead_code)]

use folio_core::{Block, BlockType};
use proptest::prelude::*;

pub fn arb_kind() -> impl Strategy<Value = BlockType> {
    prop::sample::select(vec![
        BlockType::Section,
        BlockType::Subtitle,
        BlockType::H3,
        BlockType::Paragraph,
        BlockType::Paragraph,
        BlockType::OrderedItem,
        BlockType::UnorderedItem,
        BlockType::Divider,
    ])
}

/// A document with uids `c0..cN` and small versions.
pub fn arb_document(max_len: usize) -> impl Strategy<Value = Vec<Block>> {
    prop::collection::vec((arb_kind(), "[a-z]{0,6}", 0_i64..50), 0..=max_len).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (kind, text, version))| {
                Block::text(kind, text)
                    .with_uid(format!("c{i}"))
                    .with_version(version)
            })
            .collect()
    })
}

/// One change a replica makes to its copy of the document.
#[derive(Debug, Clone)]
pub enum Edit {
    /// Delete the block at `index % len`.
    Delete(usize),
    /// Rewrite the text of the block at `index % len` with a newer version.
    Rewrite(usize, String),
    /// Insert a fresh block at `index % (len + 1)`.
    Insert(usize, String),
    /// Move the block at `from % len` to `to % len`.
    Move(usize, usize),
}

pub fn arb_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        any::<usize>().prop_map(Edit::Delete),
        (any::<usize>(), "[A-Z]{1,4}").prop_map(|(i, s)| Edit::Rewrite(i, s)),
        (any::<usize>(), "[A-Z]{1,4}").prop_map(|(i, s)| Edit::Insert(i, s)),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Edit::Move(a, b)),
    ]
}

/// Apply `edits` to a copy of `base`. New uids are `{prefix}{n}`; every
/// touched block gets a version above `version_floor`, increasing per edit.
pub fn apply_edits(base: &[Block], edits: &[Edit], prefix: &str, version_floor: i64) -> Vec<Block> {
    let mut doc = base.to_vec();
    let mut version = version_floor;
    let mut fresh = 0;
    for edit in edits {
        version += 1;
        match edit {
            Edit::Delete(i) if !doc.is_empty() => {
                let at = i % doc.len();
                doc.remove(at);
            }
            Edit::Rewrite(i, text) if !doc.is_empty() => {
                let at = i % doc.len();
                doc[at].set_text_value(text.clone());
                doc[at].version = folio_core::Version(version);
            }
            Edit::Insert(i, text) => {
                let at = i % (doc.len() + 1);
                let block = Block::text(BlockType::Paragraph, text.clone())
                    .with_uid(format!("{prefix}{fresh}"))
                    .with_version(version);
                fresh += 1;
                doc.insert(at, block);
            }
            Edit::Move(from, to) if !doc.is_empty() => {
                let from = from % doc.len();
                let mut block = doc.remove(from);
                block.version = folio_core::Version(version);
                let to = to % (doc.len() + 1);
                doc.insert(to, block);
            }
            _ => {}
        }
    }
    doc
}
