//! Command handler modules for txsync-cli.

pub mod sync;

use anyhow::{anyhow, Result};

/// `txsync config show`
pub fn config_show() -> Result<()> {
    let cfg = txsync_config::resolve_from_env().map_err(|e| anyhow!("{e}"))?;
    println!("{}", serde_json::to_string_pretty(&cfg.to_redacted_json())?);
    Ok(())
}
