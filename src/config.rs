//! Engine configuration, loaded from JSON with serde defaults for every field.
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::mock::MockOptions;
use crate::path_de::from_slice_with_path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Nesting limit for one compile walk.
    pub max_depth: usize,
    /// Compile named types referenced from several places into their own
    /// function instead of inlining them at each use.
    pub share_named_types: bool,
    pub mock: MockOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_depth: 64, share_named_types: true, mock: MockOptions::default() }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        let config = from_slice_with_path(&bytes).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_de::from_str_with_path;

    #[test]
    fn missing_fields_take_defaults() {
        let config: EngineConfig = from_str_with_path(r#"{ "maxDepth": 12, "mock": { "seed": 4 } }"#).unwrap();
        assert_eq!(config.max_depth, 12);
        assert!(config.share_named_types);
        assert_eq!(config.mock.seed, Some(4));
        assert_eq!(config.mock.max_array_len, 4);
    }

    #[test]
    fn type_errors_carry_the_field_path() {
        let err = from_str_with_path::<EngineConfig>(r#"{ "mock": { "maxArrayLen": "many" } }"#).unwrap_err();
        assert_eq!(err.path, "mock.maxArrayLen");
    }
}
