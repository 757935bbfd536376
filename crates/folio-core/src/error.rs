use std::fmt;

/// Machine-readable error codes for callers that branch on failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    SnapshotParseError,
    BlockNotFound,
    DuplicateUid,
    WrongBlockType,
    InvalidPayload,
    IndexOutOfRange,
    UidCollision,
    UnknownBlockType,
    SaveFetchFailed,
    SaveStoreFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::SnapshotParseError => "E1002",
            Self::BlockNotFound => "E2001",
            Self::DuplicateUid => "E2002",
            Self::WrongBlockType => "E2003",
            Self::InvalidPayload => "E2004",
            Self::IndexOutOfRange => "E2005",
            Self::UidCollision => "E3001",
            Self::UnknownBlockType => "E3002",
            Self::SaveFetchFailed => "E5001",
            Self::SaveStoreFailed => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::SnapshotParseError => "Block snapshot parse error",
            Self::BlockNotFound => "Block not found",
            Self::DuplicateUid => "Duplicate block uid in one sequence",
            Self::WrongBlockType => "Operation does not apply to this block type",
            Self::InvalidPayload => "Block payload cannot be decoded",
            Self::IndexOutOfRange => "Index out of range for this block",
            Self::UidCollision => "Block uid collision across replicas",
            Self::UnknownBlockType => "Unknown block type",
            Self::SaveFetchFailed => "Fetching the remote document failed",
            Self::SaveStoreFailed => "Storing the merged document failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .folio/config.toml and retry."),
            Self::SnapshotParseError => {
                Some("Pass a JSON array of blocks or an object with a `blocks` array.")
            }
            Self::BlockNotFound | Self::WrongBlockType | Self::IndexOutOfRange => None,
            Self::InvalidPayload => Some("The block was left unchanged; repair its data before editing it."),
            Self::DuplicateUid => Some("Deduplicate the sequence before merging."),
            Self::UidCollision => {
                Some("Discard the unsynced local edit and reload the server version.")
            }
            Self::UnknownBlockType => Some("The block is skipped; upgrade to render it."),
            Self::SaveFetchFailed | Self::SaveStoreFailed => {
                Some("The save is retried with backoff; check connectivity.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
