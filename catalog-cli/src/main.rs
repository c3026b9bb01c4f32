mod cli;
mod config;
mod output;

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use channel_catalog::CatalogPipeline;
use channel_catalog::catalog::{ReferenceSource, SqliteChannelStore};
use clap::Parser;
use colored::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::{Args, Commands};
use crate::config::AppConfig;

const DEFAULT_LOG_FILTER: &str = "channel_catalog=info,catalog=info,sqlx=warn";

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    let config = AppConfig::load(args.config.as_deref())?;
    let database_url = config.database_url(args.database.as_deref())?;
    let store = SqliteChannelStore::connect(&database_url)
        .await
        .with_context(|| format!("Failed to open channel store at {database_url}"))?;
    let pipeline = CatalogPipeline::from_config(config.catalog.clone(), Arc::new(store))
        .context("Failed to set up catalog pipeline")?;

    match args.command {
        Commands::Build { json } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling catalog build");
                    on_signal.cancel();
                }
            });

            info!(namespace = %config.instance.namespace(), "Building catalog");
            let catalog = pipeline.build_catalog(&config.instance, &cancel).await;
            if json {
                println!("{}", serde_json::to_string_pretty(catalog.as_slice())?);
            } else {
                output::print_catalog(&catalog);
            }
        }
        Commands::Resolve { channel_id } => {
            match pipeline
                .resolve_playable_uri(&config.instance, &channel_id)
                .await
            {
                Some(uri) => println!("{uri}"),
                None => anyhow::bail!("Channel {channel_id} could not be resolved"),
            }
        }
        Commands::References => {
            let entries = pipeline
                .references()
                .load_reference_list()
                .await
                .context("Failed to load reference list")?;
            if entries.is_empty() {
                println!("{}", "No reference list configured".yellow());
            } else {
                output::print_references(&entries);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .init();
}
