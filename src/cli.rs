//! Command-line interface for inspecting a file-backed cache
//!
//! The `repocache` binary works directly on a [`FileDriver`] root: it can
//! show the entity stored for a key, delete one key, or clear a keyspace.
//! Keys are given as a keyspace name plus the JSON encoding of the arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::driver::{Driver, FileDriver, Lookup};
use crate::error::DriverError;
use crate::key::{CacheKey, Keyspace};

/// Error types for the maintenance CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// No `--dir` given and no XDG cache directory available
    #[error("No cache directory could be determined; pass --dir")]
    NoCacheDir,

    /// The arguments were not valid JSON
    #[error("Invalid arguments JSON '{input}': {source}")]
    InvalidArgs {
        input: String,
        #[source]
        source: crate::error::Error,
    },

    /// Nothing is stored under the key
    #[error("No cached entry for {0}")]
    NotFound(CacheKey),

    /// The driver failed
    #[error("Cache driver failed: {0}")]
    Driver(#[from] DriverError),

    /// The entity could not be printed
    #[error("Failed to render entity: {0}")]
    Render(#[from] serde_json::Error),
}

/// repocache - inspect and maintain a file-backed cache directory
#[derive(Parser, Debug)]
#[command(name = "repocache")]
#[command(about = "Inspect and maintain a file-backed repocache directory")]
#[command(version)]
pub struct Cli {
    /// Cache root directory (defaults to the XDG cache directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Maintenance operations
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the entity stored for a key as JSON
    ///
    /// Example:
    ///   repocache show weather '["kitsilano", 3]'
    Show {
        /// Repository keyspace
        keyspace: String,
        /// Arguments as JSON
        args: String,
    },
    /// Delete the entry stored for a key
    Delete {
        /// Repository keyspace
        keyspace: String,
        /// Arguments as JSON
        args: String,
    },
    /// Delete every entry in a keyspace
    Clear {
        /// Repository keyspace
        keyspace: String,
    },
}

/// Parses a keyspace and JSON arguments into a cache key
///
/// # Returns
/// * `Ok(CacheKey)` if `args` is valid JSON
/// * `Err(CliError::InvalidArgs)` otherwise
pub fn parse_key(keyspace: &str, args: &str) -> Result<CacheKey, CliError> {
    CacheKey::from_json(&Keyspace::new(keyspace), args).map_err(|source| CliError::InvalidArgs {
        input: args.to_string(),
        source,
    })
}

/// Builds the file driver selected by `--dir`, or the XDG default
pub fn driver_for(cli: &Cli) -> Result<FileDriver, CliError> {
    match &cli.dir {
        Some(dir) => Ok(FileDriver::with_dir(dir)),
        None => FileDriver::new().ok_or(CliError::NoCacheDir),
    }
}

/// Runs the parsed command and returns what should be printed on stdout
pub async fn run(cli: &Cli) -> Result<String, CliError> {
    let driver = driver_for(cli)?;
    match &cli.command {
        Command::Show { keyspace, args } => {
            let key = parse_key(keyspace, args)?;
            match driver.get(&key).await? {
                Lookup::Hit(entity) => Ok(serde_json::to_string_pretty(&entity)?),
                Lookup::Miss => Err(CliError::NotFound(key)),
            }
        }
        Command::Delete { keyspace, args } => {
            let key = parse_key(keyspace, args)?;
            driver.delete(&key).await?;
            Ok(format!("Deleted {key}"))
        }
        Command::Clear { keyspace } => {
            let keyspace = Keyspace::new(keyspace.as_str());
            driver.clear(&keyspace).await?;
            Ok(format!("Cleared keyspace {keyspace}"))
        }
    }
}
