//! Invariant checks over a finished simulation.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use folio_core::{Block, Uid, Version};

use crate::SimulationResult;
use crate::client::ClientId;
use crate::history::History;

// ── Core result types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The server copy lists a uid twice.
    DuplicateUid { uid: Uid },
    /// A block was created and never deleted, but is not on the server.
    LostBlock { uid: Uid },
    /// A deleted block is back on the server.
    Resurrected { uid: Uid },
    /// The server holds an older copy than the newest one ever written.
    StaleContent {
        uid: Uid,
        expected: Version,
        found: Version,
    },
    /// After the final saves a client disagrees with the server.
    Diverged {
        client: ClientId,
        only_on_client: Vec<Uid>,
        only_on_server: Vec<Uid>,
        different_version: Vec<Uid>,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateUid { uid } => write!(f, "DuplicateUid: {uid} appears twice on the server"),
            Self::LostBlock { uid } => write!(f, "LostBlock: {uid} was never deleted but is gone"),
            Self::Resurrected { uid } => write!(f, "Resurrected: deleted block {uid} is back"),
            Self::StaleContent {
                uid,
                expected,
                found,
            } => write!(f, "StaleContent: {uid} is at {found}, newest write was {expected}"),
            Self::Diverged {
                client,
                only_on_client,
                only_on_server,
                different_version,
            } => write!(
                f,
                "Diverged: client {client} (only_on_client={only_on_client:?}, \
                 only_on_server={only_on_server:?}, different_version={different_version:?})"
            ),
        }
    }
}

// ── Oracle ───────────────────────────────────────────────────────────────────

pub struct Oracle;

impl Oracle {
    /// Run every check against a finished simulation.
    #[must_use]
    pub fn check_all(result: &SimulationResult) -> OracleResult {
        Self::check_no_duplicates(&result.server)
            .merge(Self::check_no_lost_blocks(&result.server, &result.history))
            .merge(Self::check_no_resurrection(&result.server, &result.history))
            .merge(Self::check_latest_writer(&result.server, &result.history))
            .merge(Self::check_convergence(&result.server, &result.clients))
    }

    #[must_use]
    pub fn check_no_duplicates(server: &[Block]) -> OracleResult {
        let mut seen: HashSet<&Uid> = HashSet::with_capacity(server.len());
        let violations = server
            .iter()
            .filter(|&b| !seen.insert(&b.uid))
            .map(|b| InvariantViolation::DuplicateUid { uid: b.uid.clone() })
            .collect();
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_no_lost_blocks(server: &[Block], history: &History) -> OracleResult {
        let on_server: HashSet<&Uid> = server.iter().map(|b| &b.uid).collect();
        let violations = history
            .live()
            .filter(|uid| !on_server.contains(uid))
            .map(|uid| InvariantViolation::LostBlock { uid: uid.clone() })
            .collect();
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_no_resurrection(server: &[Block], history: &History) -> OracleResult {
        let violations = server
            .iter()
            .filter(|b| history.deleted().contains(&b.uid))
            .map(|b| InvariantViolation::Resurrected { uid: b.uid.clone() })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Every server block is the highest-version copy ever observed.
    #[must_use]
    pub fn check_latest_writer(server: &[Block], history: &History) -> OracleResult {
        let violations = server
            .iter()
            .filter_map(|block| {
                let latest = history.latest(&block.uid)?;
                (latest != block).then(|| InvariantViolation::StaleContent {
                    uid: block.uid.clone(),
                    expected: latest.version,
                    found: block.version,
                })
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Every client holds the same blocks at the same versions as the
    /// server. Order is not compared: the last client to save decides it.
    #[must_use]
    pub fn check_convergence(server: &[Block], clients: &[Vec<Block>]) -> OracleResult {
        let versions = |blocks: &[Block]| -> BTreeMap<Uid, Version> {
            blocks.iter().map(|b| (b.uid.clone(), b.version)).collect()
        };
        let on_server = versions(server);

        let violations = clients
            .iter()
            .enumerate()
            .filter_map(|(client, blocks)| {
                let local = versions(blocks);
                let only_on_client: Vec<Uid> = local
                    .keys()
                    .filter(|uid| !on_server.contains_key(*uid))
                    .cloned()
                    .collect();
                let only_on_server: Vec<Uid> = on_server
                    .keys()
                    .filter(|uid| !local.contains_key(*uid))
                    .cloned()
                    .collect();
                let different_version: Vec<Uid> = local
                    .iter()
                    .filter(|(uid, v)| on_server.get(*uid).is_some_and(|s| s != *v))
                    .map(|(uid, _)| uid.clone())
                    .collect();
                let agree =
                    only_on_client.is_empty() && only_on_server.is_empty() && different_version.is_empty();
                (!agree).then_some(InvariantViolation::Diverged {
                    client,
                    only_on_client,
                    only_on_server,
                    different_version,
                })
            })
            .collect();
        OracleResult::from_violations(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::BlockType;

    fn para(uid: &str, text: &str, version: i64) -> Block {
        Block::text(BlockType::Paragraph, text)
            .with_uid(uid)
            .with_version(version)
    }

    #[test]
    fn duplicates_are_reported_once_per_extra_copy() {
        let server = vec![para("a", "", 1), para("a", "", 1), para("b", "", 1)];
        let result = Oracle::check_no_duplicates(&server);
        assert!(!result.passed);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::DuplicateUid { uid: Uid::from("a") }]
        );
    }

    #[test]
    fn lost_and_resurrected_blocks() {
        let mut history = History::default();
        history.observe(&[para("a", "", 1), para("b", "", 1), para("c", "", 1)]);
        history.record_delete(Uid::from("c"));

        let server = vec![para("a", "", 1), para("c", "", 1)];
        let lost = Oracle::check_no_lost_blocks(&server, &history);
        assert_eq!(lost.violations, vec![InvariantViolation::LostBlock { uid: Uid::from("b") }]);
        let back = Oracle::check_no_resurrection(&server, &history);
        assert_eq!(back.violations, vec![InvariantViolation::Resurrected { uid: Uid::from("c") }]);
    }

    #[test]
    fn stale_server_copy_is_reported() {
        let mut history = History::default();
        history.observe(&[para("a", "new", 5)]);
        let result = Oracle::check_latest_writer(&[para("a", "old", 2)], &history);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::StaleContent {
                uid: Uid::from("a"),
                expected: Version(5),
                found: Version(2),
            }]
        );
        assert!(Oracle::check_latest_writer(&[para("a", "new", 5)], &history).passed);
    }

    #[test]
    fn convergence_ignores_order_but_not_versions() {
        let server = vec![para("a", "", 1), para("b", "", 2)];
        let reordered = vec![para("b", "", 2), para("a", "", 1)];
        let behind = vec![para("a", "", 1), para("b", "", 1), para("x", "", 1)];
        let result = Oracle::check_convergence(&server, &[reordered, behind]);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::Diverged {
                client: 1,
                only_on_client: vec![Uid::from("x")],
                only_on_server: vec![],
                different_version: vec![Uid::from("b")],
            }]
        );
    }

    #[test]
    fn violations_render_readably() {
        let v = InvariantViolation::StaleContent {
            uid: Uid::from("a"),
            expected: Version(5),
            found: Version(2),
        };
        assert_eq!(v.to_string(), "StaleContent: a is at v2, newest write was v5");
    }
}
