use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use folio_core::error::ErrorCode;
use folio_core::model::missing_fillers;
use folio_core::{Block, Uid};
use serde::Serialize;

use super::read_snapshot;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Block snapshot to check.
    pub file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    DuplicateUid,
    UnknownType,
    MissingFiller,
}

impl FindingKind {
    const fn code(self) -> Option<ErrorCode> {
        match self {
            Self::DuplicateUid => Some(ErrorCode::DuplicateUid),
            Self::UnknownType => Some(ErrorCode::UnknownBlockType),
            Self::MissingFiller => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub index: usize,
    pub uid: Uid,
    pub detail: String,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    blocks: usize,
    findings: Vec<Finding>,
}

/// The check found problems. Carries the code of the first coded finding.
#[derive(Debug)]
pub struct CheckFailed {
    pub code: Option<ErrorCode>,
    pub issues: usize,
}

impl fmt::Display for CheckFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "check: {} issue(s) found", self.issues)
    }
}

impl std::error::Error for CheckFailed {}

/// Structural problems in `blocks`, in document order per kind.
pub fn findings(blocks: &[Block]) -> Vec<Finding> {
    let mut out = Vec::new();

    let mut seen: HashSet<&Uid> = HashSet::with_capacity(blocks.len());
    for (index, block) in blocks.iter().enumerate() {
        if !seen.insert(&block.uid) {
            out.push(Finding {
                kind: FindingKind::DuplicateUid,
                index,
                uid: block.uid.clone(),
                detail: format!("uid {} already used earlier", block.uid),
            });
        }
    }

    for (index, block) in blocks.iter().enumerate() {
        if !block.kind.is_known() {
            out.push(Finding {
                kind: FindingKind::UnknownType,
                index,
                uid: block.uid.clone(),
                detail: format!("unknown block type '{}'", block.kind.as_str()),
            });
        }
    }

    for index in missing_fillers(blocks) {
        let block = &blocks[index];
        out.push(Finding {
            kind: FindingKind::MissingFiller,
            index,
            uid: block.uid.clone(),
            detail: format!("{} is not followed by a text block", block.kind.as_str()),
        });
    }

    out
}

/// Check a snapshot and print the findings. Fails when there are any.
///
/// # Errors
///
/// Unreadable snapshot, or [`CheckFailed`] when problems were found.
pub fn run_check(args: &CheckArgs, output: OutputMode) -> Result<()> {
    let blocks = read_snapshot(&args.file)?;
    let report = CheckReport {
        blocks: blocks.len(),
        findings: findings(&blocks),
    };

    render_mode(
        output,
        &report,
        |r, w| {
            for f in &r.findings {
                let code = f.kind.code().map_or("-", ErrorCode::code);
                writeln!(w, "{code}\t{}\t{}\t{}", f.index, f.uid, f.detail)?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, &format!("Check: {}", args.file.display()))?;
            pretty_kv(w, "blocks", r.blocks.to_string())?;
            pretty_kv(w, "issues", r.findings.len().to_string())?;
            for f in &r.findings {
                writeln!(w, "  #{:<4} {:<10} {}", f.index, f.uid.as_str(), f.detail)?;
            }
            Ok(())
        },
    )?;

    if report.findings.is_empty() {
        return Ok(());
    }
    Err(CheckFailed {
        code: report.findings.iter().find_map(|f| f.kind.code()),
        issues: report.findings.len(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::BlockType;

    fn block(kind: BlockType, uid: &str) -> Block {
        Block::text(kind, "x").with_uid(uid)
    }

    #[test]
    fn clean_document_has_no_findings() {
        let blocks = vec![
            block(BlockType::Section, "s"),
            block(BlockType::Divider, "d"),
            block(BlockType::Paragraph, "p"),
        ];
        assert!(findings(&blocks).is_empty());
    }

    #[test]
    fn every_kind_of_problem_is_reported() {
        let blocks = vec![
            block(BlockType::Paragraph, "a"),
            block(BlockType::Unknown("hologram".into()), "h"),
            block(BlockType::Paragraph, "a"),
            block(BlockType::Divider, "d"),
        ];
        let kinds: Vec<(FindingKind, usize)> =
            findings(&blocks).iter().map(|f| (f.kind, f.index)).collect();
        assert_eq!(
            kinds,
            vec![
                (FindingKind::DuplicateUid, 2),
                (FindingKind::UnknownType, 1),
                (FindingKind::MissingFiller, 3),
            ]
        );
    }

    #[test]
    fn failure_carries_the_first_coded_finding() {
        let err = anyhow::Error::from(CheckFailed {
            code: Some(ErrorCode::UnknownBlockType),
            issues: 2,
        });
        assert_eq!(crate::output::error_code(&err), Some(ErrorCode::UnknownBlockType));
        assert_eq!(err.to_string(), "check: 2 issue(s) found");
    }
}
