//! Command-line interface parsing for the apicache binary
//!
//! This module handles parsing of CLI arguments using clap: repeated
//! `-p NAME=VALUE` request parameters, the freshness policy flags, and the
//! mapping of global flags onto a [`CacheConfig`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use thiserror::Error;

use crate::cache::{EmbeddedExpiry, FixedTtl, FreshnessPolicy, Parameters};
use crate::config::CacheConfig;
use crate::net::Method;

/// TTL used when neither `--ttl` nor `--expiry-element` is given
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// A `--param` value is not of the form NAME=VALUE
    #[error("Invalid parameter: '{0}'. Expected NAME=VALUE")]
    InvalidParameter(String),

    /// The `--method` value is not GET or POST
    #[error("Invalid method: '{0}'. Valid methods: get, post")]
    InvalidMethod(String),

    /// No `--cache-dir` was given and no default cache directory exists
    #[error("No cache directory available; pass --cache-dir")]
    NoCacheDir,
}

/// apicache - Fetch HTTP resources through a local disk cache
#[derive(Parser, Debug)]
#[command(name = "apicache")]
#[command(about = "Disk cache for rate-limited HTTP data sources")]
#[command(version)]
pub struct Cli {
    /// Cache directory (defaults to the XDG cache directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the cache file a resource maps to
    Key(ResourceArgs),

    /// Report whether a cached resource is fresh, stale or missing
    Inspect {
        #[command(flatten)]
        resource: ResourceArgs,
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Return a cached resource, refreshing it from upstream if needed
    ///
    /// Examples:
    ///   apicache get --base-url https://api.example.com/ char/Sheet.xml -p id=5 -p key=abc
    ///   apicache get --base-url https://api.example.com/ status.xml --method get --ttl 60
    Get {
        #[command(flatten)]
        resource: ResourceArgs,
        #[command(flatten)]
        policy: PolicyArgs,

        /// Service root the logical path is resolved against
        #[arg(long, value_name = "URL")]
        base_url: String,

        /// HTTP method: get or post
        #[arg(long, default_value = "post")]
        method: String,

        /// Minimum milliseconds between requests to the same host
        #[arg(long, value_name = "MS")]
        spacing_ms: Option<u64>,
    },
}

/// A logical resource and its request parameters
#[derive(Args, Debug)]
pub struct ResourceArgs {
    /// Logical resource path (e.g. char/CharacterSheet.xml.aspx)
    pub path: String,

    /// Request parameter as NAME=VALUE (repeatable)
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,
}

impl ResourceArgs {
    /// Parses the collected `--param` values
    pub fn parameters(&self) -> Result<Parameters, CliError> {
        parse_params(&self.params)
    }
}

/// Freshness policy selection
#[derive(Args, Debug)]
pub struct PolicyArgs {
    /// Seconds a cached file stays fresh after it was written
    #[arg(long, value_name = "SECS", conflicts_with = "expiry_element")]
    pub ttl: Option<u64>,

    /// Read the expiry from this element of the cached payload (e.g. cachedUntil)
    #[arg(long, value_name = "NAME")]
    pub expiry_element: Option<String>,
}

impl PolicyArgs {
    /// Builds the selected policy, defaulting to a one hour TTL
    pub fn policy(&self) -> Box<dyn FreshnessPolicy> {
        match (&self.expiry_element, self.ttl) {
            (Some(element), _) => Box::new(EmbeddedExpiry::element(element)),
            (None, Some(secs)) => Box::new(FixedTtl::from_secs(secs)),
            (None, None) => Box::new(FixedTtl::from_secs(DEFAULT_TTL_SECS)),
        }
    }
}

/// Parses a NAME=VALUE argument into a parameter pair
///
/// # Arguments
/// * `s` - The parameter string from CLI
///
/// # Returns
/// * `Ok((name, value))`; the value may be empty and may itself contain `=`
/// * `Err(CliError::InvalidParameter)` if there is no `=` or the name is empty
pub fn parse_param_arg(s: &str) -> Result<(String, String), CliError> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(CliError::InvalidParameter(s.to_string())),
    }
}

/// Parses every `--param` argument; repeated names are all kept
pub fn parse_params(args: &[String]) -> Result<Parameters, CliError> {
    let mut params = Parameters::new();
    for arg in args {
        let (name, value) = parse_param_arg(arg)?;
        params.append(name, value);
    }
    Ok(params)
}

/// Default log filter for a `-v` count; `RUST_LOG` takes precedence
pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

/// Parses a `--method` argument
pub fn parse_method_arg(s: &str) -> Result<Method, CliError> {
    Method::from_str(s).ok_or_else(|| CliError::InvalidMethod(s.to_string()))
}

impl Cli {
    /// Creates a CacheConfig from the global flags
    ///
    /// # Returns
    /// * `Ok(CacheConfig)` rooted at `--cache-dir` or the default cache directory
    /// * `Err(CliError::NoCacheDir)` if neither is available
    pub fn cache_config(&self) -> Result<CacheConfig, CliError> {
        let dir = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => CacheConfig::default_cache_dir().ok_or(CliError::NoCacheDir)?,
        };
        let mut config = CacheConfig::with_dir(dir);

        if let Command::Get {
            method, spacing_ms, ..
        } = &self.command
        {
            config.method = parse_method_arg(method)?;
            if let Some(ms) = spacing_ms {
                config.min_request_spacing = Duration::from_millis(*ms);
            }
        }

        Ok(config)
    }
}
