//! CLI entry-point for inspecting tier readiness.

use std::time::Duration;

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use crate::{config::Settings, HybridCoordinator, Tier};

/// Args for the `status` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Seconds to let background loads settle before reporting.
    #[arg(long, default_value_t = 0)]
    pub wait_secs: u64,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let coordinator = HybridCoordinator::from_settings(&settings)?;
    if args.wait_secs > 0 {
        coordinator
            .wait_ready(Tier::Full, Duration::from_secs(args.wait_secs))
            .await;
    }
    let status = coordinator.status();
    coordinator.shutdown();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
