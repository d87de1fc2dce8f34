//! Command-line interface for Datescape
//!
//! This module handles parsing of CLI arguments using clap and runs the
//! cache subcommands against an opened [`ResponseCache`].

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

use crate::cache::{query_key, record_key, ResourceKind, ResponseCache};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// An argument that must be JSON is not
    #[error("Invalid JSON for {what}: {source}")]
    InvalidJson {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The resource tag is not recognized
    #[error("Invalid resource: '{0}'. Valid resources: plan, plans, restaurant, restaurants, event, events, lodge, lodges")]
    InvalidResource(String),

    /// Writing output failed
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Datescape - inspect and manage the response cache
#[derive(Parser, Debug)]
#[command(name = "datescape")]
#[command(about = "Inspect and manage the Datescape response cache")]
#[command(version)]
pub struct Cli {
    /// Directory holding the cache snapshot (defaults to the XDG cache directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Time-to-live for entries written by `set`, in seconds (default 300)
    #[arg(long, global = true, value_name = "SECS")]
    pub ttl_secs: Option<u64>,

    /// Log cache activity to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the cached value for a key (exit status 1 on a miss)
    Get {
        key: String,
    },
    /// Cache a JSON value under a key
    Set {
        key: String,
        /// JSON payload, e.g. '{"title":"Date Night"}'
        value: String,
    },
    /// Remove a key
    Invalidate {
        key: String,
    },
    /// Remove every entry
    Clear,
    /// List live keys with their expiry
    List,
    /// Print the canonical cache key for a record or query
    ///
    /// Examples:
    ///   datescape key plan --id abc123
    ///   datescape key plans --options '{"userId":"u1","limit":20}'
    Key {
        /// Resource tag: plan, plans, restaurant, restaurants, event, events, lodge, lodges
        resource: String,
        /// Record id
        #[arg(long, conflicts_with = "options")]
        id: Option<String>,
        /// Query options as JSON (defaults to {})
        #[arg(long)]
        options: Option<String>,
    },
}

/// How a command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// `get` found nothing
    Miss,
}

/// Parses a JSON argument
pub fn parse_json_arg(what: &'static str, s: &str) -> Result<Value, CliError> {
    serde_json::from_str(s).map_err(|source| CliError::InvalidJson { what, source })
}

/// Parses a resource tag argument
pub fn parse_resource_arg(s: &str) -> Result<ResourceKind, CliError> {
    ResourceKind::from_str(s).ok_or_else(|| CliError::InvalidResource(s.to_string()))
}

/// Runs `command` against `cache`, writing any output to `out`
pub async fn execute(
    command: &Command,
    cache: &ResponseCache,
    out: &mut impl Write,
) -> Result<Outcome, CliError> {
    match command {
        Command::Get { key } => match cache.get::<Value>(key).await {
            Some(value) => {
                let pretty = serde_json::to_string_pretty(&value)
                    .map_err(|source| CliError::InvalidJson { what: "cached value", source })?;
                writeln!(out, "{}", pretty)?;
                Ok(Outcome::Done)
            }
            None => Ok(Outcome::Miss),
        },
        Command::Set { key, value } => {
            let value = parse_json_arg("value", value)?;
            cache.set(key, &value).await;
            Ok(Outcome::Done)
        }
        Command::Invalidate { key } => {
            cache.invalidate(key).await;
            Ok(Outcome::Done)
        }
        Command::Clear => {
            cache.clear().await;
            Ok(Outcome::Done)
        }
        Command::List => {
            for entry in cache.entries().await {
                writeln!(out, "{}\t{}", entry.key, entry.expires_at.to_rfc3339())?;
            }
            Ok(Outcome::Done)
        }
        Command::Key {
            resource,
            id,
            options,
        } => {
            let kind = parse_resource_arg(resource)?;
            let key = match (id, options) {
                (Some(id), _) => record_key(kind, id),
                (None, Some(options)) => query_key(kind, &parse_json_arg("options", options)?),
                (None, None) => query_key(kind, &Value::Object(Default::default())),
            };
            writeln!(out, "{}", key)?;
            Ok(Outcome::Done)
        }
    }
}
