use std::collections::{BTreeMap, BTreeSet};

use folio_core::{Block, Uid};

/// Everything the simulation has seen happen to blocks, across all
/// clients and the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    known: BTreeSet<Uid>,
    deleted: BTreeSet<Uid>,
    latest: BTreeMap<Uid, Block>,
}

impl History {
    /// Note every block in `blocks`, keeping the highest-version copy of each.
    pub fn observe(&mut self, blocks: &[Block]) {
        for block in blocks {
            self.known.insert(block.uid.clone());
            match self.latest.get(&block.uid) {
                Some(seen) if seen.version >= block.version => {}
                _ => {
                    self.latest.insert(block.uid.clone(), block.clone());
                }
            }
        }
    }

    /// A client explicitly deleted `uid`.
    pub fn record_delete(&mut self, uid: Uid) {
        self.deleted.insert(uid);
    }

    #[must_use]
    pub const fn known(&self) -> &BTreeSet<Uid> {
        &self.known
    }

    #[must_use]
    pub const fn deleted(&self) -> &BTreeSet<Uid> {
        &self.deleted
    }

    /// Highest-version copy of `uid` ever observed.
    #[must_use]
    pub fn latest(&self, uid: &Uid) -> Option<&Block> {
        self.latest.get(uid)
    }

    /// Blocks that were seen and never deleted.
    pub fn live(&self) -> impl Iterator<Item = &Uid> {
        self.known.difference(&self.deleted)
    }
}
