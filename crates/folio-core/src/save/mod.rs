//! Autosave: the timing state machine and the fetch-merge-store round.

mod coordinator;
mod memory;
mod round;

pub use coordinator::{SaveCoordinator, SaveStatus, SaveTicket};
pub use memory::{InjectedFailure, MemoryBackend};
pub use round::{BackendError, RoundOutcome, SaveBackend, SaveError, run_save_round};
