//! Loads the TOML configuration named on the command line and merges in the
//! `SVCCHAN_`-prefixed environment overrides reserves for secrets.

use std::path::Path;

use anyhow::{Context, Result};
use svcchan_types::config::Config;

/// Reads and parses `path`, then overlays `SVCCHAN_DB_URL` and
/// `SVCCHAN_KEY_PASSPHRASE` from the environment if present. The passphrase
/// has no file-based fallback: requires it never be written to the TOML file, so an unset
/// environment variable leaves it empty and every key decryption later fails loudly instead of
/// silently succeeding with an empty passphrase.
pub fn load(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    let mut config: Config = toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?;

    if let Ok(db_url) = std::env::var("SVCCHAN_DB_URL") {
        config.db.url = db_url;
    }
    if let Ok(passphrase) = std::env::var("SVCCHAN_KEY_PASSPHRASE") {
        config.key_passphrase = passphrase;
    }

    Ok(config)
}
