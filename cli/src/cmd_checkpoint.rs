//! `chainmirror checkpoint`: show where the listener would resume.

use anyhow::Result;

use crate::config::StoreConfig;
use crate::wiring;

pub async fn run(cfg: &StoreConfig) -> Result<Option<u64>> {
    let store = wiring::open_store(cfg).await?;
    let checkpoint = store.max_block_number().await?;
    match checkpoint {
        Some(block) => println!("checkpoint: block {block} (next run starts at {})", block + 1),
        None => println!("no checkpoint (next run starts at block 0)"),
    }
    Ok(checkpoint)
}
