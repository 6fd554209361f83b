//! Clinrag CLI
//!
//! Differential diagnosis suggestions grounded in similar historical cases.

use anyhow::Result;
use clap::Parser;
use clinrag_core::error::exit_codes;
use clinrag_core::{CaseRecord, ClinragError};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod context;
mod output;

use app::{Cli, Commands, KbAction};
use context::AppContext;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<ClinragError>()
                .map(ClinragError::exit_code)
                .unwrap_or(exit_codes::GENERAL_ERROR)
        }
    };

    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    // Logs go to stderr so JSON output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str())),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    let ctx = AppContext::load(cli.config.as_deref(), cli.format)?;

    match cli.command {
        Commands::Kb(args) => match args.action {
            KbAction::Load { file, sample } => commands::kb::load(&ctx, file, sample).await?,
            KbAction::Add {
                id,
                diagnosis,
                outcome,
                narrative,
            } => {
                let record = CaseRecord {
                    id,
                    narrative: narrative.join(" "),
                    diagnosis,
                    outcome,
                };
                commands::kb::add(&ctx, record).await?
            }
            KbAction::List => commands::kb::list(&ctx)?,
            KbAction::Show { id } => commands::kb::show(&ctx, &id)?,
        },
        Commands::Retrieve(args) => commands::retrieve::run(args, &ctx).await?,
        Commands::Diagnose(args) => return commands::diagnose::run(args, &ctx).await,
        Commands::Jobs(args) => return commands::jobs::run(args.action, &ctx).await,
        Commands::Summary(args) => commands::summary::run(args, &ctx)?,
        Commands::Quota => commands::quota::run(&ctx)?,
    }

    Ok(exit_codes::SUCCESS)
}
