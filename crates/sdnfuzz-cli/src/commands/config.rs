//! Configuration commands.

use anyhow::{Result, bail};
use sdnfuzz_config::SdnfuzzConfig;

/// Show the effective configuration.
pub fn show(config: &SdnfuzzConfig, format: &str) -> Result<()> {
    match format {
        "toml" => print!("{}", config.to_toml()?),
        "json" => println!("{}", serde_json::to_string_pretty(config)?),
        other => bail!("Unknown format '{other}' (expected toml or json)"),
    }
    Ok(())
}
