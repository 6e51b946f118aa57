use anyhow::{Context, Result};
use std::path::Path;
use stockpile_kernel::StreamConfig;

/// Load a stream config from a YAML file, or the defaults when no file is given.
pub fn load(path: Option<&Path>) -> Result<StreamConfig> {
    let Some(path) = path else {
        return Ok(StreamConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = parse(&text).with_context(|| format!("parsing config {}", path.display()))?;
    tracing::debug!(?config, "loaded config");
    Ok(config)
}

fn parse(text: &str) -> Result<StreamConfig> {
    Ok(serde_yaml::from_str::<StreamConfig>(text)?.normalized())
}
