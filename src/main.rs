use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use strata_fit_stats::client::{self, RunArgs};
use strata_fit_stats::config::Settings;
use strata_fit_stats::core::task::TaskRecord;
use strata_fit_stats::report::{render_boxplot, BoxSummary};
use strata_fit_stats::web::server::start_web_server;

#[derive(Parser)]
#[command(name = "strata-fit-stats", version, about = "Mock federation for STRATA-FIT statistics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a task on the simulated organizations and print the results
    Run(RunArgs),
    /// Serve the mock federation HTTP API
    Serve {
        /// Settings file layered over settings/strata.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn print_results(record: &TaskRecord) -> Result<()> {
    for run in &record.runs {
        println!(
            "--- organization {} ({:?}, {:.2} ms) ---",
            run.organization_id, run.status, run.duration_ms
        );
        match (&run.result, &run.log) {
            (Some(result), _) => println!("{}", serde_json::to_string_pretty(result)?),
            (None, Some(log)) => println!("error: {}", log),
            (None, None) => println!("no result"),
        }
    }
    Ok(())
}

fn plot_first_result(record: &TaskRecord, path: &Path, threshold: usize) -> Result<()> {
    let result = record
        .runs
        .iter()
        .find_map(|run| run.result.as_ref())
        .context("no successful run to plot")?;
    let (boxes, total_patients) = BoxSummary::from_partial_stats(result)?;
    render_boxplot(path, &boxes, total_patients, threshold)?;
    info!("Box plot written to {}", path.display());
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;
    let outcome = client::run(&args, &settings).await?;
    print_results(&outcome.record)?;

    if let Some(path) = &args.plot {
        if args.method == "partial_stats" {
            plot_first_result(&outcome.record, path, settings.privacy_threshold)?;
        } else {
            warn!("--plot only applies to partial_stats; skipping");
        }
    }

    if outcome.failed > 0 {
        bail!("{} of {} runs failed", outcome.failed, outcome.record.runs.len());
    }
    Ok(())
}

async fn serve(config: Option<PathBuf>) -> Result<()> {
    let settings = Settings::load(config.as_deref()).context("failed to load settings")?;
    let orchestrator = Arc::new(
        settings
            .build_orchestrator()
            .context("failed to register organizations")?,
    );
    info!(
        "Mock federation ready with {} organizations",
        orchestrator.organizations().len()
    );

    start_web_server(orchestrator, settings.server.bind_address())
        .await
        .context("web server failed")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("Starting STRATA-FIT mock federation...");

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Serve { config } => serve(config).await,
    }
}
