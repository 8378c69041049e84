//! Runtime configuration for the demo and batch tooling.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::extract::ExtractParams;

#[derive(Clone, Default, Deserialize)]
pub struct OutputConfig {
    pub json_out: Option<PathBuf>,
    pub model_out: Option<PathBuf>,
}

#[derive(Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub extract_params: ExtractParams,
    /// Run the fast sum collapse instead of the full decomposition.
    #[serde(default)]
    pub sum_only: bool,
}

pub fn load_config(path: &Path) -> Result<RuntimeConfig, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    let config: RuntimeConfig = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str(
            r#"{ "extract_params": { "swath": 128, "oversample": 4 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.extract_params.swath, 128);
        assert_eq!(cfg.extract_params.oversample, 4);
        assert_eq!(cfg.extract_params.max_iter, 20);
        assert!(!cfg.sum_only);
        assert!(cfg.output.json_out.is_none());
    }
}
