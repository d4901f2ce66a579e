//! `sdnfuzz dry-run`

use std::path::Path;

use anyhow::{Context, Result};
use sdnfuzz_config::SdnfuzzConfig;
use sdnfuzz_replay::{DryRun, Replayer, RetryPolicy};
use signal_hook::consts::SIGINT;

pub fn run(
    superlog: &Path,
    config: &SdnfuzzConfig,
    strict: bool,
    max_attempts: Option<u32>,
) -> Result<()> {
    let events = super::load(superlog, &super::codec())?;

    let mut policy = RetryPolicy::from_settings(&config.replay);
    if let Some(max_attempts) = max_attempts {
        policy = policy.with_max_attempts(max_attempts);
    }

    let dry_run = DryRun::new();
    let mut replayer = Replayer::new(events)
        .with_policy(policy)
        .with_strict_invariants(strict || config.replay.fail_on_invariant_violation);

    // Ctrl-C stops the replay before its next attempt instead of killing it.
    signal_hook::flag::register(SIGINT, replayer.abort_handle().flag())
        .context("Failed to install Ctrl-C handler")?;

    // ReplayError is returned as is so main can map its exit code.
    let summary = replayer.run(&mut dry_run.simulation())?;

    print!("{summary}");
    let report = dry_run.report();
    if !report.actions.is_empty() {
        println!("network actions:");
        print!("{report}");
    }
    Ok(())
}
