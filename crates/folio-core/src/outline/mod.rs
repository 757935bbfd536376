//! Flat block sequence → nested section tree.
//!
//! The block list is parsed with a small recursive descent parser over a
//! shared cursor. Headings open a section that runs until the next heading of
//! equal or stronger level; runs of list items of one kind become a single
//! list node; everything else is a leaf.
//!
//! The tree borrows from the block slice and is rebuilt for every render.

pub mod render;

use serde::Serialize;

use crate::model::block::{Block, BlockType, HeadingLevel, Uid};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Ordered,
    Unordered,
}

impl ListKind {
    #[must_use]
    pub const fn of(kind: &BlockType) -> Option<Self> {
        match kind {
            BlockType::OrderedItem => Some(Self::Ordered),
            BlockType::UnorderedItem => Some(Self::Unordered),
            _ => None,
        }
    }
}

/// A block in its place in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placed<'a> {
    pub block: &'a Block,
    /// The block is being dragged, or sits inside a dragged section.
    pub being_dragged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum Node<'a> {
    Section {
        heading: Placed<'a>,
        children: Vec<Node<'a>>,
    },
    List {
        kind: ListKind,
        items: Vec<Placed<'a>>,
    },
    Leaf(Placed<'a>),
}

impl<'a> Node<'a> {
    /// Every block under this node, in document order.
    #[must_use]
    pub fn blocks(&self) -> Vec<&'a Block> {
        let mut out = Vec::new();
        self.collect_blocks(&mut out);
        out
    }

    fn collect_blocks(&self, out: &mut Vec<&'a Block>) {
        match self {
            Self::Section { heading, children } => {
                out.push(heading.block);
                for child in children {
                    child.collect_blocks(out);
                }
            }
            Self::List { items, .. } => out.extend(items.iter().map(|p| p.block)),
            Self::Leaf(placed) => out.push(placed.block),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse `blocks` into a section tree. `dragged` marks the block currently
/// being dragged; a dragged heading marks its whole section.
#[must_use]
pub fn parse_blocks<'a>(blocks: &'a [Block], dragged: Option<&Uid>) -> Vec<Node<'a>> {
    let mut cursor = Cursor {
        blocks,
        ix: 0,
        dragged,
    };
    cursor.parse_level(None, false)
}

struct Cursor<'a, 'd> {
    blocks: &'a [Block],
    ix: usize,
    dragged: Option<&'d Uid>,
}

impl<'a> Cursor<'a, '_> {
    fn is_dragged(&self, block: &Block) -> bool {
        self.dragged.is_some_and(|uid| *uid == block.uid)
    }

    fn place(&self, block: &'a Block, inherited: bool) -> Placed<'a> {
        Placed {
            block,
            being_dragged: inherited || self.is_dragged(block),
        }
    }

    /// Parse siblings until a heading at or above `enclosing` (or the end).
    fn parse_level(&mut self, enclosing: Option<HeadingLevel>, inherited: bool) -> Vec<Node<'a>> {
        let mut nodes = Vec::new();

        while let Some(block) = self.blocks.get(self.ix) {
            let level = block.kind.heading_level();
            if enclosing.is_some_and(|open| level <= open) {
                break;
            }

            if block.kind.is_heading() {
                self.ix += 1;
                let heading = self.place(block, inherited);
                let children = self.parse_level(Some(level), heading.being_dragged);
                nodes.push(Node::Section { heading, children });
            } else if let Some(kind) = ListKind::of(&block.kind) {
                nodes.push(Node::List {
                    kind,
                    items: self.parse_list(kind, inherited),
                });
            } else {
                self.ix += 1;
                nodes.push(Node::Leaf(self.place(block, inherited)));
            }
        }

        nodes
    }

    fn parse_list(&mut self, kind: ListKind, inherited: bool) -> Vec<Placed<'a>> {
        let mut items = Vec::new();
        while let Some(block) = self.blocks.get(self.ix) {
            if ListKind::of(&block.kind) != Some(kind) {
                break;
            }
            items.push(self.place(block, inherited));
            self.ix += 1;
        }
        items
    }
}

// ---------------------------------------------------------------------------
// Table of contents
// ---------------------------------------------------------------------------

/// One heading in the document outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineEntry {
    /// Nesting depth, 0 for top-level sections.
    pub depth: usize,
    pub uid: Uid,
    pub title: String,
    /// Anchor id used by the renderer.
    pub slug: String,
}

/// Headings in document order with their nesting depth.
#[must_use]
pub fn table_of_contents(nodes: &[Node<'_>]) -> Vec<OutlineEntry> {
    let mut out = Vec::new();
    collect_toc(nodes, 0, &mut out);
    out
}

fn collect_toc(nodes: &[Node<'_>], depth: usize, out: &mut Vec<OutlineEntry>) {
    for node in nodes {
        if let Node::Section { heading, children } = node {
            let title = heading.block.text_value().unwrap_or_default().to_string();
            out.push(OutlineEntry {
                depth,
                uid: heading.block.uid.clone(),
                slug: slug(&title),
                title,
            });
            collect_toc(children, depth + 1, out);
        }
    }
}

/// Anchor slug for a heading: lower-cased, spaces replaced with `_`.
#[must_use]
pub fn slug(title: &str) -> String {
    title.to_lowercase().replace(' ', "_")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
