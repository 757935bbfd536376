#![no_main]

use std::collections::HashSet;

use folio_core::merge::{MergeOptions, TieBreak, merge_with_options};
use folio_core::{Block, BlockType};
use libfuzzer_sys::fuzz_target;

/// Three small sequences drawn from a shared pool of uids, with versions
/// taken from the input bytes.
fn sequences(data: &[u8]) -> [Vec<Block>; 3] {
    let mut out: [Vec<Block>; 3] = Default::default();
    let mut seen: [HashSet<u8>; 3] = Default::default();
    for pair in data.chunks_exact(2) {
        let side = usize::from(pair[0] % 3);
        let uid = pair[0] / 3 % 24;
        if !seen[side].insert(uid) {
            continue;
        }
        out[side].push(
            Block::text(BlockType::Paragraph, format!("{side}"))
                .with_uid(format!("u{uid}"))
                .with_version(i64::from(pair[1])),
        );
    }
    out
}

fuzz_target!(|data: &[u8]| {
    let Some((&flag, rest)) = data.split_first() else {
        return;
    };
    let [common, local, server] = sequences(rest);
    let options = MergeOptions {
        tie_break: if flag % 2 == 0 { TieBreak::FirstSeen } else { TieBreak::Uid },
    };

    let Ok(outcome) = merge_with_options(&common, &local, &server, &options) else {
        return;
    };
    let mut uids = HashSet::new();
    for block in &outcome.blocks {
        assert!(uids.insert(&block.uid), "duplicate uid {}", block.uid);
    }
});
