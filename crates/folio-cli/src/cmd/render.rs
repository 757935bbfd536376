use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use folio_core::config::FolioConfig;
use folio_core::outline::render::{RenderMode, render_html};
use folio_core::{Uid, parse_blocks};
use serde::Serialize;

use super::read_snapshot;
use crate::output::{OutputMode, render};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContextArg {
    Editor,
    Preview,
    Shared,
}

impl From<ContextArg> for RenderMode {
    fn from(arg: ContextArg) -> Self {
        match arg {
            ContextArg::Editor => Self::Editor,
            ContextArg::Preview => Self::Preview,
            ContextArg::Shared => Self::Shared,
        }
    }
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Block snapshot to render.
    pub file: PathBuf,

    /// Where the markup will be shown. Defaults to `render.context` from
    /// the project config.
    #[arg(long, value_enum)]
    pub context: Option<ContextArg>,

    /// Share uid embedded in signature and payment blocks.
    #[arg(long, value_name = "UID")]
    pub share_uid: Option<String>,
}

#[derive(Debug, Serialize)]
struct RenderOutput {
    html: String,
    skipped: Vec<Uid>,
}

/// Render a snapshot to HTML on stdout.
///
/// # Errors
///
/// Unreadable snapshot, or the shared context without a share uid.
pub fn run_render(args: &RenderArgs, config: &FolioConfig, output: OutputMode) -> Result<()> {
    let mode = args.context.map_or(config.render.context, RenderMode::from);
    if mode == RenderMode::Shared && args.share_uid.is_none() {
        bail!("--share-uid is required for the shared context");
    }

    let blocks = read_snapshot(&args.file)?;
    let tree = parse_blocks(&blocks, None);
    let rendered = render_html(&tree, &mode.context(args.share_uid.as_deref()));
    let value = RenderOutput {
        html: rendered.html,
        skipped: rendered.skipped,
    };

    render(output, &value, |v, w| {
        writeln!(w, "{}", v.html)?;
        if !v.skipped.is_empty() {
            let uids: Vec<&str> = v.skipped.iter().map(Uid::as_str).collect();
            eprintln!("skipped {} block(s): {}", uids.len(), uids.join(", "));
        }
        Ok(())
    })
}
