//! apicache - Fetch HTTP resources through a local disk cache
//!
//! A small front end over the library: derive cache keys, inspect cached
//! files, and fetch resources with stale fallback.

use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use apicache::cache::{self, CacheManager, FetchOutcome, Freshness, NonEmpty};
use apicache::cli::{log_level, Cli, Command};

/// Installs the stderr log subscriber, honouring `RUST_LOG` over `-v`
fn setup_logging(verbose: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
}

fn print_freshness(freshness: &Freshness) {
    println!("state: {}", freshness.state.as_str());
    println!("expires_at: {}", format_time(freshness.expires_at));
    if let Some(err) = &freshness.error {
        println!("note: {}", err);
    }
}

fn print_outcome(outcome: &FetchOutcome) {
    match outcome.path() {
        Some(path) => println!("path: {}", path.display()),
        None => println!("path: -"),
    }
    println!("updated: {}", outcome.updated);
    println!("state: {}", outcome.state.as_str());
    println!("expires_at: {}", format_time(outcome.expires_at));
    if let Some(err) = &outcome.error {
        println!("error: {}", err);
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = cli.cache_config()?;

    match &cli.command {
        Command::Key(resource) => {
            let path = cache::derive_cache_path(
                &config.cache_dir,
                &resource.path,
                &resource.parameters()?,
                &config.strip_suffixes,
            )?;
            println!("{}", path.display());
        }
        Command::Inspect { resource, policy } => {
            let path = cache::derive_cache_path(
                &config.cache_dir,
                &resource.path,
                &resource.parameters()?,
                &config.strip_suffixes,
            )?;
            println!("path: {}", path.display());
            print_freshness(&cache::inspect(&path, &*policy.policy()));
        }
        Command::Get {
            resource,
            policy,
            base_url,
            ..
        } => {
            let cache = CacheManager::new(config)?.with_base_url(base_url)?;
            let outcome = cache.request(
                &resource.path,
                &resource.parameters()?,
                &*policy.policy(),
                Some(&NonEmpty),
            );
            print_outcome(&outcome);
            if !outcome.is_usable() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
