use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::lifecycle::VersionLookup;
use crate::progress::NoProgress;
use crate::sync::{engine_from_config, options_from_config};

/// Entry point for `isync status`: report sync state without mutating anything.
pub async fn run_status(config: &Config) -> Result<()> {
    let engine = engine_from_config(
        config,
        options_from_config(config, false, false),
        Arc::new(NoProgress),
    )
    .await?;
    let check = engine.check().await?;

    let utterances: usize = check.intents.iter().map(|i| i.utterances.len()).sum();

    println!("{:<18} {}:{}", "TARGET", config.provider.app_id, config.provider.version_id);
    println!(
        "{:<18} {} intents, {} utterances",
        "CORPUS",
        check.intents.len(),
        utterances
    );
    println!("{:<18} {}", "CONTENT HASH", check.content_hash);
    match &check.stored {
        Some(fp) => {
            println!("{:<18} {}", "SYNCED HASH", fp.content_hash);
            println!("{:<18} {}", "SYNCED TIMESTAMP", fp.remote_timestamp);
        }
        None => println!("{:<18} never synced", "SYNCED HASH"),
    }
    match &check.remote {
        VersionLookup::Found(v) => match &v.last_modified {
            Some(ts) => println!("{:<18} {}", "REMOTE TIMESTAMP", ts),
            None => println!("{:<18} not reported", "REMOTE TIMESTAMP"),
        },
        VersionLookup::Absent => println!("{:<18} no remote version", "REMOTE TIMESTAMP"),
        VersionLookup::Degraded(reason) => {
            println!("{:<18} unavailable ({})", "REMOTE TIMESTAMP", reason)
        }
    }
    println!(
        "{:<18} {}",
        "NEEDS SYNC",
        if check.needs_sync { "yes" } else { "no" }
    );

    Ok(())
}

/// Entry point for `isync build`: print the payload the next sync would import.
pub async fn run_build(config: &Config) -> Result<()> {
    let engine = engine_from_config(
        config,
        options_from_config(config, false, false),
        Arc::new(NoProgress),
    )
    .await?;
    let payload = engine.build_payload().await?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
