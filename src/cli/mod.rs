//! Command-line interface wiring for medner.

use std::io::Read;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{config::Settings, nlp::Tier, ExtractMode};

pub mod extract;
pub mod search;
pub mod serve;
pub mod status;

/// Top-level CLI definition.
#[derive(Debug, Parser)]
#[command(author, version, about = "Tiered medical entity extraction", long_about = None)]
pub struct Cli {
    /// Debug logging for this crate (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Parse CLI arguments from the environment.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Dispatch the selected sub-command.
    pub async fn dispatch(self, settings: Settings) -> Result<()> {
        match self.command {
            Commands::Extract(args) => extract::run(args, settings).await,
            Commands::Status(args) => status::run(args, settings).await,
            Commands::Serve(args) => serve::run(args, settings).await,
            Commands::Search(args) => search::run(args, settings).await,
        }
    }
}

/// Supported sub-commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Extract conditions, medications and symptoms from text.
    Extract(extract::Args),
    /// Show tier readiness, cache usage and recorded faults.
    Status(status::Args),
    /// Serve the JSON API.
    Serve(serve::Args),
    /// Hybrid keyword and vector search over the resource corpus.
    Search(search::Args),
}

/// Tier a caller using `mode` would like to have ready.
pub(crate) fn target_tier(mode: ExtractMode) -> Tier {
    match mode {
        ExtractMode::Lightweight => Tier::Lightweight,
        ExtractMode::Partial => Tier::Partial,
        ExtractMode::Full | ExtractMode::Auto => Tier::Full,
    }
}

/// Join positional words, or read stdin when none were given.
pub(crate) fn text_or_stdin(words: &[String]) -> Result<String> {
    if !words.is_empty() {
        return Ok(words.join(" "));
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("reading text from stdin")?;
    Ok(buf.trim().to_string())
}
