use std::fs;

use anyhow::{anyhow, Context, Result};
use camino::Utf8Path;
use serde::de::DeserializeOwned;

/// Loads a config file, picking the format from its extension.
#[inline]
pub fn read_config_file<T>(path: &Utf8Path) -> Result<T>
where
    T: DeserializeOwned,
{
    match path.extension() {
        Some("toml") => {
            let content = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
            toml::from_str(&content).with_context(|| format!("invalid toml config {path}"))
        }
        Some("json") => {
            let content = fs::read(path).with_context(|| format!("failed to read {path}"))?;
            serde_json::from_slice(&content).with_context(|| format!("invalid json config {path}"))
        }
        _ => Err(anyhow!("unknown config file type: {path}")),
    }
}
