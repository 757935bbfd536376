use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

use crate::model::payload;

/// Proposal id carried by blocks that have not been attached to a document yet.
pub const UNASSIGNED_PROPOSAL: i64 = -1;

// ---------------------------------------------------------------------------
// Uid
// ---------------------------------------------------------------------------

/// Stable block identifier, unique within one document's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Fresh random uid (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Last-writer marker. Bumped on every local mutation; compared only to
/// decide which of two concurrent copies of a block wins.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(pub i64);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BlockType
// ---------------------------------------------------------------------------

/// The closed set of block types, plus a catch-all for names this build does
/// not know. Unknown names round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockType {
    Section,
    Subtitle,
    H3,
    Paragraph,
    OrderedItem,
    UnorderedItem,
    Image,
    Table,
    CostTable,
    Signature,
    Quote,
    Embed,
    Divider,
    Payment,
    Unknown(String),
}

impl BlockType {
    /// Every known type, in wire-name order of the editor's type menu.
    pub const KNOWN: [Self; 14] = [
        Self::Section,
        Self::Subtitle,
        Self::H3,
        Self::Paragraph,
        Self::OrderedItem,
        Self::UnorderedItem,
        Self::Image,
        Self::Table,
        Self::CostTable,
        Self::Signature,
        Self::Quote,
        Self::Embed,
        Self::Divider,
        Self::Payment,
    ];

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Section => "section",
            Self::Subtitle => "subtitle",
            Self::H3 => "h3",
            Self::Paragraph => "paragraph",
            Self::OrderedItem => "oli",
            Self::UnorderedItem => "uli",
            Self::Image => "image",
            Self::Table => "table",
            Self::CostTable => "cost_table",
            Self::Signature => "signature",
            Self::Quote => "quote",
            Self::Embed => "embed",
            Self::Divider => "divider",
            Self::Payment => "payment",
            Self::Unknown(name) => name,
        }
    }

    /// Nesting rank used by the outline parser.
    #[must_use]
    pub const fn heading_level(&self) -> HeadingLevel {
        match self {
            Self::Section => HeadingLevel::Section,
            Self::Subtitle => HeadingLevel::Subtitle,
            Self::H3 => HeadingLevel::SubSubtitle,
            _ => HeadingLevel::Body,
        }
    }

    #[must_use]
    pub const fn is_heading(&self) -> bool {
        matches!(self, Self::Section | Self::Subtitle | Self::H3)
    }

    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::OrderedItem | Self::UnorderedItem)
    }

    /// Types whose payload is a single `value` string.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(
            self,
            Self::Section
                | Self::Subtitle
                | Self::H3
                | Self::Paragraph
                | Self::OrderedItem
                | Self::UnorderedItem
        )
    }

    /// Types that cannot hold a caret and must be followed by a text block.
    #[must_use]
    pub const fn needs_filler(&self) -> bool {
        matches!(
            self,
            Self::Signature | Self::CostTable | Self::Divider | Self::Table | Self::Payment
        )
    }

    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<String> for BlockType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "section" => Self::Section,
            "subtitle" => Self::Subtitle,
            "h3" => Self::H3,
            "paragraph" => Self::Paragraph,
            "oli" => Self::OrderedItem,
            "uli" => Self::UnorderedItem,
            "image" => Self::Image,
            "table" => Self::Table,
            "cost_table" => Self::CostTable,
            "signature" => Self::Signature,
            "quote" => Self::Quote,
            "embed" => Self::Embed,
            "divider" => Self::Divider,
            "payment" => Self::Payment,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<BlockType> for String {
    fn from(kind: BlockType) -> Self {
        match kind {
            BlockType::Unknown(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl FromStr for BlockType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HeadingLevel
// ---------------------------------------------------------------------------

/// Heading rank. Lower variants are stronger: a `Section` closes any open
/// `Subtitle`, and everything that is not a heading ranks as `Body`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeadingLevel {
    Section,
    Subtitle,
    SubSubtitle,
    Body,
}

impl HeadingLevel {
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Section => 0,
            Self::Subtitle => 1,
            Self::SubSubtitle => 2,
            Self::Body => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// One content unit of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub uid: Uid,
    #[serde(rename = "type")]
    pub kind: BlockType,
    #[serde(default = "unassigned_proposal")]
    pub proposal_id: i64,
    #[serde(default)]
    pub version: Version,
    #[serde(default = "empty_object")]
    pub data: Value,
}

const fn unassigned_proposal() -> i64 {
    UNASSIGNED_PROPOSAL
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Block {
    /// New block of `kind` with a fresh uid and the type's default payload.
    #[must_use]
    pub fn new(kind: BlockType) -> Self {
        let data = payload::default_payload(&kind);
        Self {
            uid: Uid::generate(),
            kind,
            proposal_id: UNASSIGNED_PROPOSAL,
            version: Version::default(),
            data,
        }
    }

    /// New text block holding `value`.
    #[must_use]
    pub fn text(kind: BlockType, value: impl Into<String>) -> Self {
        let mut block = Self::new(kind);
        block.set_text_value(value);
        block
    }

    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<Uid>) -> Self {
        self.uid = uid.into();
        self
    }

    #[must_use]
    pub const fn with_version(mut self, version: i64) -> Self {
        self.version = Version(version);
        self
    }

    #[must_use]
    pub const fn with_proposal(mut self, proposal_id: i64) -> Self {
        self.proposal_id = proposal_id;
        self
    }

    /// The `value` string of a text payload, if present.
    #[must_use]
    pub fn text_value(&self) -> Option<&str> {
        self.data.get("value").and_then(Value::as_str)
    }

    pub fn set_text_value(&mut self, value: impl Into<String>) {
        self.set_field("value", Value::String(value.into()));
    }

    #[must_use]
    pub fn caption(&self) -> Option<&str> {
        self.data.get("caption").and_then(Value::as_str)
    }

    /// Set a top-level payload field, turning a non-object payload into an
    /// object first.
    pub fn set_field(&mut self, key: &str, value: Value) {
        if !self.data.is_object() {
            self.data = empty_object();
        }
        if let Value::Object(map) = &mut self.data {
            map.insert(key.to_string(), value);
        }
    }
}

impl From<String> for Uid {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
