//! CLI entry-point for hybrid retrieval over the shared resources.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use serde_json::json;
use tracing::instrument;

use crate::{
    cli::text_or_stdin,
    config::Settings,
    resources::{search::Retriever, SharedResourceCache},
};

/// Args for the `search` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Number of hits to return.
    #[arg(long, default_value_t = 5)]
    pub k: usize,
    /// Query text; read from stdin when omitted.
    pub query: Vec<String>,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let query = text_or_stdin(&args.query)?;
    let cache = SharedResourceCache::install(Arc::new(SharedResourceCache::from_settings(
        &settings,
    )));
    let hits = Retriever::new(cache.clone())
        .search(&query, args.k)
        .with_context(|| format!("searching resources in {}", settings.resource_dir.display()))?;
    let report = json!({ "query": query, "hits": hits, "resources": cache.stats() });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
