use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use aw_server::commands::{buckets, events, export, heartbeat, import, info, sync};
use aw_server::{Cli, Commands, Config, open_api};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let mut config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    if cli.testing {
        config.testing = true;
    }
    tracing::debug!(?config, "loaded configuration");

    let api = open_api(&config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Info => info::run(&mut out, &api)?,
        Commands::Buckets(args) => buckets::list(&mut out, &api, args)?,
        Commands::CreateBucket(args) => buckets::create(&mut out, &api, args)?,
        Commands::RenameBucket(args) => buckets::rename(&mut out, &api, args)?,
        Commands::DeleteBucket(args) => buckets::delete(&mut out, &api, args)?,
        Commands::Events(args) => events::list(&mut out, &api, args)?,
        Commands::Insert(args) => events::insert(io::stdin().lock(), &mut out, &api, args)?,
        Commands::Heartbeat(args) => heartbeat::run(io::stdin().lock(), &mut out, &api, args)?,
        Commands::Count(args) => events::count(&mut out, &api, args)?,
        Commands::DeleteEvent(args) => events::delete(&mut out, &api, args)?,
        Commands::Export(args) => export::run(&mut out, &api, args)?,
        Commands::Import(args) => import::run(io::stdin().lock(), &mut out, &api, args)?,
        Commands::Sync(args) => {
            let report = sync::run(&mut out, &api, args, config.storage)?;
            tracing::debug!(synced = report.synced.len(), "sync complete");
        }
    }

    out.flush()?;
    Ok(())
}
