use std::path::Path;

use anyhow::Context;

use crate::{error::PicturaResult, spec::NamedFilters};

fn default_webp_quality() -> u8 {
    80
}

/// Explicit pipeline configuration, passed in at construction rather than
/// looked up from process-wide settings. Loaded once at startup, read-only
/// at request time.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// Alias name to canonical filter-spec string, substituted before
    /// brace expansion. Values may contain pipes.
    #[serde(default)]
    pub named_filters: NamedFilters,

    /// Quality applied to lossy webp renditions when the request carries
    /// no explicit `q-N`/`quality-N`.
    #[serde(default = "default_webp_quality")]
    pub webp_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            named_filters: NamedFilters::new(),
            webp_quality: default_webp_quality(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> PicturaResult<Self> {
        let config = serde_json::from_str(text).context("parse pipeline config")?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> PicturaResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read pipeline config '{}'", path.display()))?;
        Self::from_json(&text)
    }
}
