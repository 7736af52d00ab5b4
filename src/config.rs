use crate::compositor::DebugOverlay;
use crate::region::SelectorConfig;
use crate::segmentation::SegmentationConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// On-disk configuration. Every field has a default, so a missing file or an
/// empty one both give the stock tuning.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// Seed the background estimate with the first captured frame
    #[serde(default = "default_prime_output")]
    pub prime_output: bool,
    #[serde(default)]
    pub debug_overlay: DebugOverlay,
}

fn default_prime_output() -> bool { true }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            prime_output: default_prime_output(),
            debug_overlay: DebugOverlay::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::SelectorKind;
    use crate::segmentation::InternalResolution;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.selector.kind, SelectorKind::BoundingBox);
        assert_eq!(config.selector.scale, 1.3);
        assert_eq!(config.selector.search_radius, 300);
        assert_eq!(config.selector.resolution_min, 20);
        assert_eq!(config.segmentation.segmentation_threshold, 0.9);
        assert!(config.display.prime_output);
        assert_eq!(config.display.debug_overlay, DebugOverlay::Off);
    }

    #[test]
    fn test_partial_config_overrides() {
        let config: Config = toml::from_str(
            r#"
            [selector]
            kind = "tiled"
            search_radius = 200

            [segmentation]
            score_threshold = 0.2
            internal_resolution = "medium"
            flip_horizontal = true

            [display]
            debug_overlay = "highlight"
            "#,
        )
        .unwrap();
        assert_eq!(config.selector.kind, SelectorKind::Tiled);
        assert_eq!(config.selector.search_radius, 200);
        assert_eq!(config.selector.resolution_min, 20);
        assert_eq!(config.segmentation.score_threshold, Some(0.2));
        assert_eq!(
            config.segmentation.internal_resolution,
            InternalResolution::Medium
        );
        assert!(config.segmentation.flip_horizontal);
        assert_eq!(config.display.debug_overlay, DebugOverlay::Highlight);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_or_default("/nonexistent/vanish.toml").unwrap();
        assert_eq!(config.selector.kind, SelectorKind::BoundingBox);
    }

    #[test]
    fn test_unknown_selector_is_rejected() {
        assert!(toml::from_str::<Config>("[selector]\nkind = \"blob\"").is_err());
    }
}
