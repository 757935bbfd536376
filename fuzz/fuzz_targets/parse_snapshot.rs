#![no_main]

use folio_core::model::parse_snapshot;
use folio_core::outline::render::{RenderContext, render_html};
use folio_core::parse_blocks;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(blocks) = parse_snapshot(raw) else {
        return;
    };

    let tree = parse_blocks(&blocks, blocks.first().map(|b| &b.uid));
    let placed: usize = tree.iter().map(|node| node.blocks().len()).sum();
    assert_eq!(placed, blocks.len(), "parse must place every block exactly once");

    let rendered = render_html(&tree, &RenderContext::Editor);
    assert!(rendered.skipped.len() <= blocks.len());

});
