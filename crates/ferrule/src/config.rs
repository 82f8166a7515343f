//! `ferrule.toml` loading.

use anyhow::{anyhow, Result};
use ferrule_transform::ConvertOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "ferrule.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FerruleConfig {
    pub closures: ConvertOptions,
}

impl FerruleConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| anyhow!("Invalid configuration: {}", e))
    }

    /// Load `explicit`, or `ferrule.toml` in the working directory when it
    /// exists, or the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.exists() {
                    log::debug!("no {} found, using defaults", CONFIG_FILE);
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = fs::read_to_string(&path)
            .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
        log::info!("using configuration from {}", path.display());
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| anyhow!("Failed to serialize configuration: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule_transform::UnknownReturnPolicy;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = FerruleConfig::from_toml("").unwrap();
        assert_eq!(config, FerruleConfig::default());
    }

    #[test]
    fn test_closures_table_overrides() {
        let config = FerruleConfig::from_toml(
            r#"
            [closures]
            unknown_return = "placeholder"
            allocation_is_fallible = false
            "#,
        )
        .unwrap();
        assert_eq!(config.closures.unknown_return, UnknownReturnPolicy::Placeholder);
        assert!(!config.closures.allocation_is_fallible);
        assert_eq!(config.closures.impl_suffix, "__impl");
    }

    #[test]
    fn test_written_config_reads_back() {
        let text = FerruleConfig::default().to_toml().unwrap();
        assert!(text.contains("[closures]"));
        assert_eq!(FerruleConfig::from_toml(&text).unwrap(), FerruleConfig::default());
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!(FerruleConfig::from_toml("[closures]\nunknown_return = \"guess\"\n").is_err());
    }
}
