//! `sdnfuzz show`

use std::path::Path;

use anyhow::Result;
use sdnfuzz_replay::LogSummary;

pub fn run(superlog: &Path, list_events: bool, json: bool) -> Result<()> {
    let events = super::load(superlog, &super::codec())?;
    let summary = LogSummary::from_events(&events);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", superlog.display());
    print!("{summary}");

    if list_events {
        println!();
        for event in &events {
            let deps: Vec<&str> = event.dependent_labels().iter().map(|l| l.as_str()).collect();
            if deps.is_empty() {
                println!("{:<8} {:<24} {}", event.label().as_str(), event.class(), event.time());
            } else {
                println!(
                    "{:<8} {:<24} {}  <- {}",
                    event.label().as_str(),
                    event.class(),
                    event.time(),
                    deps.join(", ")
                );
            }
        }
    }

    Ok(())
}
