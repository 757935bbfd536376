#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use folio_core::config::{EffectiveConfig, resolve_config};
use output::{CliError, OutputMode};
use std::env;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "folio: merge, outline and render block documents",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self, config: Option<&EffectiveConfig>) -> OutputMode {
        output::resolve_output_mode(
            self.format,
            self.json,
            config.map(|c| c.resolved_output.as_str()),
        )
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Three-way merge of block snapshots",
        long_about = "Merge a local and a server block snapshot against their common ancestor.",
        after_help = "EXAMPLES:\n    # Merge and write the result\n    folio merge --common base.json --local mine.json --server theirs.json > merged.json\n\n    # Include what the merge did\n    folio merge --common base.json --local mine.json --server theirs.json --report --json"
    )]
    Merge(cmd::merge::MergeArgs),

    #[command(
        about = "Print the section tree of a snapshot",
        long_about = "Group a flat block snapshot into nested sections and lists.",
        after_help = "EXAMPLES:\n    # Show the outline\n    folio outline doc.json\n\n    # Mark a block as being dragged\n    folio outline doc.json --dragged s1"
    )]
    Outline(cmd::outline::OutlineArgs),

    #[command(
        about = "Render a snapshot to HTML",
        long_about = "Render a block snapshot to HTML for the editor, preview or a shared link.",
        after_help = "EXAMPLES:\n    # Preview markup\n    folio render doc.json\n\n    # Shared link markup\n    folio render doc.json --context shared --share-uid 6f1c"
    )]
    Render(cmd::render::RenderArgs),

    #[command(
        about = "Check a snapshot for structural problems",
        long_about = "Report duplicate uids, unknown block types and missing filler blocks.",
        after_help = "EXAMPLES:\n    # Check a document\n    folio check doc.json\n\n    # Emit machine-readable output\n    folio check doc.json --json"
    )]
    Check(cmd::check::CheckArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("FOLIO_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "folio=debug,info"
        } else {
            "folio=info,warn"
        })
    });

    let format = env::var("FOLIO_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, config: &EffectiveConfig, output: OutputMode) -> anyhow::Result<()> {
    let project = &config.project;
    match &cli.command {
        Commands::Merge(args) => cmd::merge::run_merge(args, project, output),
        Commands::Outline(args) => cmd::outline::run_outline(args, output),
        Commands::Render(args) => cmd::render::run_render(args, project, output),
        Commands::Check(args) => cmd::check::run_check(args, output),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let config = env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|root| resolve_config(&root, cli.json));

    let (output, result) = match config {
        Ok(config) => {
            debug!(output = %config.resolved_output, "resolved config");
            let output = cli.output_mode(Some(&config));
            (output, run(&cli, &config, output))
        }
        Err(err) => (cli.output_mode(None), Err(err)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if output::render_error(output, &CliError::from_anyhow(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
