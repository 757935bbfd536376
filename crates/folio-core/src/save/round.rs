//! One autosave round: fetch, merge, store, merge again, adopt.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::ErrorCode;
use crate::merge::MergeError;
use crate::model::block::{Block, Uid};
use crate::session::DocumentSession;

/// Error type backends report; the round only passes it along.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Where documents are stored.
pub trait SaveBackend {
    /// Current server copy of the document's blocks.
    fn fetch(&mut self, proposal_id: i64) -> Result<Vec<Block>, BackendError>;

    /// Replace the document's blocks, returning what the server now holds.
    fn store(&mut self, proposal_id: i64, blocks: &[Block]) -> Result<Vec<Block>, BackendError>;
}

impl<B: SaveBackend + ?Sized> SaveBackend for &mut B {
    fn fetch(&mut self, proposal_id: i64) -> Result<Vec<Block>, BackendError> {
        (**self).fetch(proposal_id)
    }

    fn store(&mut self, proposal_id: i64, blocks: &[Block]) -> Result<Vec<Block>, BackendError> {
        (**self).store(proposal_id, blocks)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("fetching proposal {proposal_id} failed")]
    Fetch {
        proposal_id: i64,
        #[source]
        source: BackendError,
    },
    #[error("storing proposal {proposal_id} failed")]
    Store {
        proposal_id: i64,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl SaveError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Fetch { .. } => ErrorCode::SaveFetchFailed,
            Self::Store { .. } => ErrorCode::SaveStoreFailed,
            Self::Merge(err) => err.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// The merged document was stored and adopted.
    Saved { blocks: usize, confirmed: usize },
    /// A uid collision made the local copy unmergeable; the session now
    /// holds the server copy.
    RolledBack { uid: Uid, ops: usize },
}

/// Run one save round for `session` against `backend`.
///
/// The second merge runs against the same server snapshot as the first so
/// that edits made while the store was in flight survive.
///
/// # Errors
///
/// Backend failures, and merge errors other than a uid collision. The
/// session is left untouched on error.
#[tracing::instrument(level = "debug", skip_all, fields(proposal_id = session.current_proposal_id()))]
pub fn run_save_round(
    session: &mut DocumentSession,
    mut backend: impl SaveBackend,
) -> Result<RoundOutcome, SaveError> {
    let proposal_id = session.current_proposal_id();
    let server = backend
        .fetch(proposal_id)
        .map_err(|source| SaveError::Fetch { proposal_id, source })?;

    let merged = match session.reconcile(&server) {
        Ok(merged) => merged,
        Err(MergeError::UidCollision { uid }) => return Ok(roll_back(session, server, uid)),
        Err(err) => return Err(err.into()),
    };

    let ack = backend
        .store(proposal_id, &merged)
        .map_err(|source| SaveError::Store { proposal_id, source })?;

    let merged = match session.reconcile(&server) {
        Ok(merged) => merged,
        Err(MergeError::UidCollision { uid }) => return Ok(roll_back(session, ack, uid)),
        Err(err) => return Err(err.into()),
    };
    let blocks = merged.len();
    session.set_blocks(merged, Some(ack));
    let confirmed = session.confirm_pending();
    info!(proposal_id, blocks, confirmed, "saved");
    Ok(RoundOutcome::Saved { blocks, confirmed })
}

fn roll_back(session: &mut DocumentSession, server: Vec<Block>, uid: Uid) -> RoundOutcome {
    warn!(%uid, "uid collision, adopting the server copy");
    let ops = session.roll_back_pending(server);
    RoundOutcome::RolledBack { uid, ops }
}
