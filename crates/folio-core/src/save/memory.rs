use std::collections::HashMap;
use std::fmt;

use crate::model::block::Block;
use crate::save::round::{BackendError, SaveBackend};

/// In-process document store with fault injection, for tests and the
/// simulator.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    documents: HashMap<i64, Vec<Block>>,
    fail_fetches: u32,
    fail_stores: u32,
    fetches: u64,
    stores: u64,
}

#[derive(Debug)]
pub struct InjectedFailure {
    operation: &'static str,
}

impl fmt::Display for InjectedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "injected {} failure", self.operation)
    }
}

impl std::error::Error for InjectedFailure {}

impl MemoryBackend {
    pub fn insert(&mut self, proposal_id: i64, blocks: Vec<Block>) {
        self.documents.insert(proposal_id, blocks);
    }

    /// Stored blocks; empty for an unknown proposal.
    #[must_use]
    pub fn document(&self, proposal_id: i64) -> &[Block] {
        self.documents.get(&proposal_id).map_or(&[], Vec::as_slice)
    }

    pub const fn fail_next_fetches(&mut self, count: u32) {
        self.fail_fetches = count;
    }

    pub const fn fail_next_stores(&mut self, count: u32) {
        self.fail_stores = count;
    }

    #[must_use]
    pub const fn fetches(&self) -> u64 {
        self.fetches
    }

    #[must_use]
    pub const fn stores(&self) -> u64 {
        self.stores
    }
}

impl SaveBackend for MemoryBackend {
    fn fetch(&mut self, proposal_id: i64) -> Result<Vec<Block>, BackendError> {
        if self.fail_fetches > 0 {
            self.fail_fetches -= 1;
            return Err(Box::new(InjectedFailure { operation: "fetch" }));
        }
        self.fetches += 1;
        Ok(self.document(proposal_id).to_vec())
    }

    fn store(&mut self, proposal_id: i64, blocks: &[Block]) -> Result<Vec<Block>, BackendError> {
        if self.fail_stores > 0 {
            self.fail_stores -= 1;
            return Err(Box::new(InjectedFailure { operation: "store" }));
        }
        self.stores += 1;
        self.documents.insert(proposal_id, blocks.to_vec());
        Ok(blocks.to_vec())
    }
}
