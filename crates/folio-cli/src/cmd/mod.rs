pub mod check;
pub mod merge;
pub mod outline;
pub mod render;

use anyhow::{Context, Result};
use folio_core::Block;
use folio_core::model::parse_snapshot;
use std::path::Path;

/// Read a block snapshot: a JSON array of blocks or `{"blocks": [...]}`.
pub fn read_snapshot(path: &Path) -> Result<Vec<Block>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_snapshot(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}
