#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use folio_sim::campaign::replay_seed;
use folio_sim::{CampaignConfig, run_campaign};

/// Run a seed campaign of the multi-client autosave simulation.
#[derive(Parser, Debug)]
#[command(name = "folio-sim", version)]
struct Args {
    /// First seed.
    #[arg(long, default_value_t = 0)]
    from: u64,

    /// Number of seeds.
    #[arg(long, default_value_t = 50)]
    seeds: u64,

    /// Clients per simulation.
    #[arg(long, default_value_t = 3)]
    clients: usize,

    /// Random steps per simulation.
    #[arg(long, default_value_t = 120)]
    rounds: u64,

    /// Chance that a save hits a backend failure (percent).
    #[arg(long, default_value_t = 10)]
    fail_percent: u8,

    /// Print the trace of a single seed as JSON instead of running a campaign.
    #[arg(long, value_name = "SEED")]
    replay: Option<u64>,

    /// Emit the campaign report as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = CampaignConfig {
        seed_range: args.from..args.from.saturating_add(args.seeds),
        clients: args.clients,
        rounds: args.rounds,
        fail_percent: args.fail_percent,
        ..CampaignConfig::default()
    };

    if let Some(seed) = args.replay {
        let trace = replay_seed(seed, &config)?;
        println!("{}", serde_json::to_string_pretty(&trace.result.trace)?);
        for violation in &trace.oracle.violations {
            eprintln!("{violation}");
        }
        return Ok(());
    }

    let report = run_campaign(&config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "campaign complete: seeds_run={} seeds_passed={} failed_saves={} first_failure={}",
            report.seeds_run,
            report.seeds_passed,
            report.failed_saves,
            report.first_failure.map_or_else(|| "none".to_string(), |s| s.to_string())
        );
        for failure in &report.failures {
            for violation in &failure.violations {
                println!("  seed {}: {violation}", failure.seed);
            }
        }
    }

    if report.all_passed() {
        Ok(())
    } else {
        anyhow::bail!("campaign failed")
    }
}
