use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use folio_core::config::FolioConfig;
use folio_core::merge::{MergeReport, TieBreak, merge_with_options};
use folio_core::Block;
use serde::Serialize;
use tracing::info;

use super::read_snapshot;
use crate::output::{OutputMode, pretty_kv, pretty_section};

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Last snapshot both sides agreed on.
    #[arg(long, value_name = "FILE")]
    pub common: PathBuf,

    /// Snapshot with the local edits.
    #[arg(long, value_name = "FILE")]
    pub local: PathBuf,

    /// Snapshot currently on the server.
    #[arg(long, value_name = "FILE")]
    pub server: PathBuf,

    /// Also print what the merge did.
    #[arg(long)]
    pub report: bool,

    /// Order for blocks that end up at the same position.
    #[arg(long, value_name = "first-seen|uid")]
    pub tie_break: Option<TieBreak>,
}

#[derive(Debug, Serialize)]
struct MergeOutput<'a> {
    blocks: &'a [Block],
    report: MergeReport,
}

/// Merge the three snapshots and print the result.
///
/// Without `--json` the merged blocks go to stdout as a JSON array so the
/// output is itself a valid snapshot; the report, if asked for, goes to
/// stderr.
///
/// # Errors
///
/// Unreadable inputs, and merge errors (uid collision, duplicate uid).
pub fn run_merge(args: &MergeArgs, config: &FolioConfig, output: OutputMode) -> Result<()> {
    let common = read_snapshot(&args.common)?;
    let local = read_snapshot(&args.local)?;
    let server = read_snapshot(&args.server)?;

    let mut options = config.merge.options();
    if let Some(tie_break) = args.tie_break {
        options.tie_break = tie_break;
    }

    let outcome = merge_with_options(&common, &local, &server, &options)
        .context("Failed to merge snapshots")?;
    info!(blocks = outcome.blocks.len(), "merged");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if output.is_json() && args.report {
        let value = MergeOutput {
            blocks: &outcome.blocks,
            report: outcome.report,
        };
        serde_json::to_writer_pretty(&mut out, &value)?;
    } else {
        serde_json::to_writer_pretty(&mut out, &outcome.blocks)?;
    }
    writeln!(out)?;

    if args.report && !output.is_json() {
        let stderr = std::io::stderr();
        let mut err = stderr.lock();
        write_report(&mut err, &outcome.report, output)?;
    }
    Ok(())
}

fn write_report(w: &mut dyn Write, report: &MergeReport, output: OutputMode) -> std::io::Result<()> {
    let rows = [
        ("local+", report.inserted_local),
        ("server+", report.inserted_server),
        ("removed", report.removed),
        ("kept local", report.kept_local),
        ("kept server", report.kept_server),
        ("moved", report.kept_at_server_position),
    ];
    if output == OutputMode::Pretty {
        pretty_section(w, "Merge report")?;
        for (key, value) in rows {
            pretty_kv(w, key, value.to_string())?;
        }
    } else {
        let line: Vec<String> = rows
            .iter()
            .map(|(key, value)| format!("{}={value}", key.replace(' ', "_")))
            .collect();
        writeln!(w, "{}", line.join(" "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_report_is_one_line_of_pairs() {
        let report = MergeReport {
            inserted_local: 1,
            removed: 2,
            ..MergeReport::default()
        };
        let mut buf = Vec::new();
        write_report(&mut buf, &report, OutputMode::Text).expect("write");
        let line = String::from_utf8(buf).expect("utf8");
        assert_eq!(
            line,
            "local+=1 server+=0 removed=2 kept_local=0 kept_server=0 moved=0\n"
        );
    }

    #[test]
    fn pretty_report_has_a_heading() {
        let mut buf = Vec::new();
        write_report(&mut buf, &MergeReport::default(), OutputMode::Pretty).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("Merge report\n"));
        assert!(text.contains("removed:"));
    }
}
