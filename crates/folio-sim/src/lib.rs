//! folio-sim library.
//!
//! Deterministic simulation of several clients editing one document. Each
//! client owns a [`DocumentSession`](folio_core::DocumentSession) and a
//! [`SaveCoordinator`](folio_core::SaveCoordinator) running on virtual time;
//! all of them save against one in-memory server. After the random phase
//! every client saves twice, and the [`oracle`] checks the outcome.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

#![forbid(unsafe_code)]

pub mod campaign;
pub mod client;
pub mod history;
pub mod oracle;
pub mod rng;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use folio_core::clock::{Clock, ManualClock};
use folio_core::save::{MemoryBackend, RoundOutcome};
use folio_core::{Block, BlockType, Uid};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{ClientId, EditOp, FailPoint, SimulatedClient, Tick};
use crate::history::History;
use crate::rng::DeterministicRng;

pub use campaign::{CampaignConfig, CampaignReport, run_campaign};
pub use oracle::{Oracle, OracleResult};

/// Proposal every simulated client edits.
pub const PROPOSAL_ID: i64 = 1;

/// Uid of the opening section. Clients never delete it.
pub const TITLE_UID: &str = "title";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub clients: usize,
    /// Steps in the random phase.
    pub rounds: u64,
    /// Blocks in the starting document, title included.
    pub initial_blocks: usize,
    /// Chance per step that virtual time advances instead of an edit.
    pub advance_percent: u8,
    /// Longest single advance of virtual time.
    pub max_advance_ms: u64,
    /// Chance that a save started in the random phase hits a backend failure.
    pub fail_percent: u8,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            clients: 3,
            rounds: 120,
            initial_blocks: 6,
            advance_percent: 35,
            max_advance_ms: 4_000,
            fail_percent: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    Edit { client: ClientId, op: EditOp },
    Advance { ms: u64 },
    Saved { client: ClientId, outcome: RoundOutcome },
    SaveFailed { client: ClientId, code: String },
    Synced { client: ClientId, outcome: RoundOutcome },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub step: u64,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub config: SimulationConfig,
    /// Final server copy.
    pub server: Vec<Block>,
    /// Final live blocks of every client, by client id.
    pub clients: Vec<Vec<Block>>,
    pub history: History,
    pub trace: Vec<TraceEvent>,
    pub stores: u64,
    pub failed_saves: usize,
}

#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    backend: MemoryBackend,
    clients: Vec<SimulatedClient>,
    history: History,
    trace: Vec<TraceEvent>,
    epoch: Instant,
    elapsed: Duration,
    failed_saves: usize,
}

impl Simulator {
    /// Set up the server document and one loaded session per client.
    ///
    /// # Errors
    ///
    /// Returns an error when the config has no clients.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.clients == 0 {
            bail!("clients must be > 0");
        }
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_at(1));
        let initial = initial_document(config.initial_blocks);

        let mut backend = MemoryBackend::default();
        backend.insert(PROPOSAL_ID, initial.clone());

        let clients: Vec<SimulatedClient> = (0..config.clients)
            .map(|id| {
                SimulatedClient::new(id, PROPOSAL_ID, Arc::clone(&clock), initial.clone(), config.seed)
            })
            .collect();

        let mut history = History::default();
        history.observe(&initial);

        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            config,
            backend,
            clients,
            history,
            trace: Vec::new(),
            epoch: Instant::now(),
            elapsed: Duration::ZERO,
            failed_saves: 0,
        })
    }

    /// Run the random phase, then save every client twice.
    ///
    /// # Errors
    ///
    /// Session or merge errors, which mean a bug rather than an invariant
    /// violation.
    pub fn run(mut self) -> Result<SimulationResult> {
        for step in 0..self.config.rounds {
            self.step(step)
                .with_context(|| format!("seed {} step {step}", self.config.seed))?;
        }
        self.quiesce()?;

        info!(
            seed = self.config.seed,
            steps = self.trace.len(),
            stores = self.backend.stores(),
            failed_saves = self.failed_saves,
            "simulation complete"
        );
        Ok(SimulationResult {
            server: self.backend.document(PROPOSAL_ID).to_vec(),
            clients: self.clients.iter().map(|c| c.blocks().to_vec()).collect(),
            stores: self.backend.stores(),
            config: self.config,
            history: self.history,
            trace: self.trace,
            failed_saves: self.failed_saves,
        })
    }

    fn now(&self) -> Instant {
        self.epoch + self.elapsed
    }

    fn step(&mut self, step: u64) -> Result<()> {
        if self.rng.hit_rate_percent(self.config.advance_percent) {
            self.advance(step)?;
        } else {
            self.edit(step)?;
        }
        self.observe();
        Ok(())
    }

    fn advance(&mut self, step: u64) -> Result<()> {
        let ms = self.rng.next_bounded(self.config.max_advance_ms) + 1;
        self.elapsed += Duration::from_millis(ms);
        self.trace.push(TraceEvent {
            step,
            kind: TraceEventKind::Advance { ms },
        });

        let now = self.now();
        for client in &mut self.clients {
            let fail = self
                .rng
                .hit_rate_percent(self.config.fail_percent)
                .then(|| {
                    if self.rng.hit_rate_percent(50) {
                        FailPoint::Fetch
                    } else {
                        FailPoint::Store
                    }
                });
            let kind = match client.tick(now, &mut self.backend, fail)? {
                Tick::Idle => continue,
                Tick::Saved(outcome) => TraceEventKind::Saved {
                    client: client.id(),
                    outcome,
                },
                Tick::Failed(code) => {
                    self.failed_saves += 1;
                    TraceEventKind::SaveFailed {
                        client: client.id(),
                        code: code.code().to_string(),
                    }
                }
            };
            self.trace.push(TraceEvent { step, kind });
        }
        Ok(())
    }

    fn edit(&mut self, step: u64) -> Result<()> {
        let ix = self.rng.next_index(self.clients.len());
        let title = Uid::from(TITLE_UID);
        let label = format!("c{ix}s{step}");
        let Some(op) = EditOp::random(&mut self.rng, self.clients[ix].blocks(), &title, &label)
        else {
            return Ok(());
        };
        if let EditOp::Remove { uid } = &op {
            self.history.record_delete(uid.clone());
        }
        debug!(client = ix, op = op.name(), "edit");
        let now = self.now();
        self.clients[ix].apply(&op, now)?;
        self.trace.push(TraceEvent {
            step,
            kind: TraceEventKind::Edit { client: ix, op },
        });
        Ok(())
    }

    fn quiesce(&mut self) -> Result<()> {
        for pass in 0..2 {
            let step = self.config.rounds + pass;
            for client in &mut self.clients {
                let outcome = client
                    .sync(&mut self.backend)
                    .with_context(|| format!("seed {} final sync of client {}", self.config.seed, client.id()))?;
                self.trace.push(TraceEvent {
                    step,
                    kind: TraceEventKind::Synced {
                        client: client.id(),
                        outcome,
                    },
                });
            }
            self.observe();
        }
        Ok(())
    }

    fn observe(&mut self) {
        for client in &self.clients {
            self.history.observe(client.blocks());
        }
        self.history.observe(self.backend.document(PROPOSAL_ID));
    }
}

/// The starting document: the title section followed by a mix of
/// subtitles, paragraphs and list items.
#[must_use]
pub fn initial_document(len: usize) -> Vec<Block> {
    let title = Block::text(BlockType::Section, "Proposal")
        .with_uid(TITLE_UID)
        .with_proposal(PROPOSAL_ID)
        .with_version(1);
    std::iter::once(title)
        .chain((1..len).map(|i| {
            let kind = match i % 5 {
                0 => BlockType::Subtitle,
                3 | 4 => BlockType::UnorderedItem,
                _ => BlockType::Paragraph,
            };
            Block::text(kind, format!("block {i}"))
                .with_uid(format!("init-{i}"))
                .with_proposal(PROPOSAL_ID)
                .with_version(1)
        }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_document_starts_with_the_title() {
        let doc = initial_document(6);
        assert_eq!(doc.len(), 6);
        assert_eq!(doc[0].uid.as_str(), TITLE_UID);
        assert_eq!(doc[5].kind, BlockType::Subtitle);
        assert_eq!(initial_document(0).len(), 1);
    }

    #[test]
    fn zero_clients_rejected() {
        let config = SimulationConfig {
            clients: 0,
            ..SimulationConfig::default()
        };
        assert!(Simulator::new(config).is_err());
    }

    #[test]
    fn same_seed_same_run() {
        let run = |seed| {
            let config = SimulationConfig {
                seed,
                rounds: 60,
                ..SimulationConfig::default()
            };
            Simulator::new(config).expect("config").run().expect("run")
        };
        let a = run(9);
        let b = run(9);
        assert_eq!(a.server, b.server);
        assert_eq!(a.trace, b.trace);
    }

    #[test]
    fn trace_serializes_flat() {
        let event = TraceEvent {
            step: 4,
            kind: TraceEventKind::Advance { ms: 250 },
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json, serde_json::json!({"step": 4, "kind": "advance", "ms": 250}));
    }
}
