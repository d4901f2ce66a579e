//! `sdnfuzz prune`

use std::path::Path;

use anyhow::{Context, Result};
use sdnfuzz_types::Label;

pub fn run(superlog: &Path, drop: &[String], output: &Path) -> Result<()> {
    let codec = super::codec();
    let events = super::load(superlog, &codec)?;
    let drop: Vec<Label> = drop.iter().map(|label| Label::new(label.trim())).collect();

    let pruned = sdnfuzz_replay::prune(&events, &drop).context("Refusing to prune")?;
    let written = sdnfuzz_replay::write_superlog(output, &pruned, &codec)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "dropped {} event(s), wrote {} to {}",
        events.len() - pruned.len(),
        written,
        output.display()
    );
    Ok(())
}
