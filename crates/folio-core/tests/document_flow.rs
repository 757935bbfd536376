//! End-to-end flows through the public API: load a stored document, edit it
//! in a session, render it, and autosave it against an in-memory server.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use folio_core::clock::{Clock, ManualClock};
use folio_core::config::SaveConfig;
use folio_core::model::parse_snapshot;
use folio_core::outline::render::{RenderContext, render_html};
use folio_core::outline::{Node, table_of_contents};
use folio_core::save::{MemoryBackend, RoundOutcome, SaveCoordinator, SaveStatus, run_save_round};
use folio_core::session::SessionEvent;
use folio_core::{BlockType, DocumentSession, Uid, parse_blocks};

const PROPOSAL: i64 = 12;

const STORED: &str = r#"{
  "proposal": {"id": 12, "title": "Website rebuild"},
  "blocks": [
    {"uid": "s1", "type": "section", "proposalId": 12, "version": 1, "data": {"value": "Overview"}},
    {"uid": "p1", "type": "paragraph", "proposalId": 12, "version": 1, "data": {"value": "We <b>build</b> things."}},
    {"uid": "t1", "type": "subtitle", "proposalId": 12, "version": 1, "data": {"value": "Scope"}},
    {"uid": "l1", "type": "uli", "proposalId": 12, "version": 1, "data": {"value": "Design"}},
    {"uid": "l2", "type": "uli", "proposalId": 12, "version": 1, "data": {"value": "Build"}},
    {"uid": "v1", "type": "hologram", "proposalId": 12, "version": 1, "data": {}},
    {"uid": "s2", "type": "section", "proposalId": 12, "version": 1, "data": {"value": "Price"}},
    {"uid": "d1", "type": "divider", "proposalId": 12, "version": 1}
  ]
}"#;

fn clock() -> Arc<dyn Clock> {
    Arc::new(ManualClock::starting_at(1_000))
}

#[test]
fn stored_document_parses_into_sections() {
    let blocks = parse_snapshot(STORED).expect("stored document");
    assert_eq!(blocks.len(), 8);
    assert_eq!(blocks[5].kind, BlockType::Unknown("hologram".into()));

    let tree = parse_blocks(&blocks, None);
    assert_eq!(tree.len(), 2);
    let Node::Section { children, .. } = &tree[0] else {
        panic!("expected the overview section");
    };
    let Node::Section { children: scope, .. } = &children[1] else {
        panic!("expected the scope subsection");
    };
    assert!(matches!(&scope[0], Node::List { items, .. } if items.len() == 2));

    let toc = table_of_contents(&tree);
    let titles: Vec<(usize, &str)> = toc.iter().map(|e| (e.depth, e.title.as_str())).collect();
    assert_eq!(titles, vec![(0, "Overview"), (1, "Scope"), (0, "Price")]);
}

#[test]
fn render_skips_unknown_blocks_and_keeps_the_rest() {
    let blocks = parse_snapshot(STORED).expect("stored document");
    let rendered = render_html(&parse_blocks(&blocks, None), &RenderContext::Preview);

    assert_eq!(rendered.skipped, vec![Uid::from("v1")]);
    assert!(rendered.html.contains("<h2>Overview</h2>"));
    assert!(rendered.html.contains("<p>We <b>build</b> things.</p>"));
    assert!(rendered.html.contains("<ul><li>Design</li><li>Build</li></ul>"));
    assert!(rendered.html.contains("<div id=\"container-s2\"><a id=\"price\"></a>"));
    assert!(rendered.html.ends_with("<hr></div></div>"));
}

#[test]
fn editing_a_loaded_document_adds_fillers() {
    let mut session = DocumentSession::new(PROPOSAL, clock()).with_uid_prefix("f");
    session.set_blocks(parse_snapshot(STORED).expect("stored"), None);

    session
        .update_text(&Uid::from("p1"), "We build <i>better</i> things.", false)
        .expect("edit");
    let last = session.blocks().last().expect("non-empty");
    assert_eq!(last.kind, BlockType::Paragraph);
    assert_eq!(last.uid.as_str(), "f-0");
    assert_eq!(session.blocks().len(), 9);
}

#[test]
fn autosave_driven_by_the_coordinator() {
    let mut server = MemoryBackend::default();
    server.insert(PROPOSAL, parse_snapshot(STORED).expect("stored"));

    let mut session = DocumentSession::new(PROPOSAL, clock()).with_uid_prefix("a");
    session.set_blocks(server.document(PROPOSAL).to_vec(), None);

    let requests = Arc::new(Mutex::new(0_usize));
    let sink = Arc::clone(&requests);
    session.subscribe(move |event| {
        if *event == SessionEvent::SaveRequested {
            *sink.lock().expect("lock") += 1;
        }
    });

    let mut coordinator = SaveCoordinator::seeded(SaveConfig::default(), 1);
    let t0 = Instant::now();
    let mut now = t0;

    for (i, text) in ["a", "ab", "abc"].into_iter().enumerate() {
        now = t0 + Duration::from_millis(500 * i as u64);
        session.update_text(&Uid::from("p1"), text, false).expect("edit");
        coordinator.mark_dirty(now);
        assert_eq!(coordinator.poll(now), None, "typing keeps the debounce open");
    }
    assert_eq!(*requests.lock().expect("lock"), 3);

    let due = coordinator.next_deadline().expect("debounce deadline");
    assert_eq!(due, now + Duration::from_secs(3));
    let ticket = coordinator.poll(due).expect("save starts");

    server.fail_next_stores(1);
    run_save_round(&mut session, &mut server).expect_err("store fails once");
    assert!(coordinator.failed(ticket, due));
    assert_eq!(coordinator.status(), SaveStatus::Failed);

    let retry_at = due + Duration::from_secs(3);
    let ticket = coordinator.poll(retry_at).expect("re-armed debounce");
    let outcome = run_save_round(&mut session, &mut server).expect("second attempt");
    assert!(matches!(outcome, RoundOutcome::Saved { confirmed: 3, .. }));
    assert!(coordinator.succeeded(ticket, retry_at));

    assert_eq!(server.document(PROPOSAL)[1].text_value(), Some("abc"));
    assert_eq!(session.pending_count(), 0);
    assert_eq!(
        coordinator.status_at(retry_at + Duration::from_secs(2)),
        SaveStatus::Standby
    );
}
