//! `sdnfuzz validate`

use std::path::Path;

use anyhow::Result;

pub fn run(superlog: &Path) -> Result<()> {
    let events = super::load(superlog, &super::codec())?;
    println!("{}: {} event(s), all records valid", superlog.display(), events.len());
    Ok(())
}
