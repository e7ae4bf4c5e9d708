//! CLI entry-point for entity extraction.

use std::time::Duration;

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::{info, instrument};

use crate::{
    cli::{target_tier, text_or_stdin},
    config::Settings,
    ExtractMode, HybridCoordinator,
};

/// Args for the `extract` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Extraction strategy.
    #[arg(long, default_value = "auto", value_enum)]
    pub mode: ExtractMode,
    /// Seconds to wait for the requested tier to load before extracting.
    #[arg(long, default_value_t = 0)]
    pub wait_secs: u64,
    /// Text to analyse; read from stdin when omitted.
    pub text: Vec<String>,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let text = text_or_stdin(&args.text)?;
    let coordinator = HybridCoordinator::from_settings(&settings)?;
    if args.wait_secs > 0 {
        let tier = target_tier(args.mode);
        let ready = coordinator
            .wait_ready(tier, Duration::from_secs(args.wait_secs))
            .await;
        info!(%tier, ready, "waited for tier");
    }
    let result = coordinator.extract(&text, args.mode);
    coordinator.shutdown();
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
