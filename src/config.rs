//! Index configuration: recognized options and their defaults (spec §6).

use serde::{Deserialize, Serialize};

use crate::policy::SubdivisionPolicy;

pub const MAX_LEVEL: u8 = 21;
pub const DEFAULT_WORLD_SIZE: u64 = 1 << MAX_LEVEL;

/// Named subdivision presets (§4.3). `Custom` lets callers supply their own
/// `SubdivisionPolicy` instead of one of the three canonical presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubdivisionPreset {
    Balanced,
    DensePointClouds,
    LargeEntities,
}

impl Default for SubdivisionPreset {
    fn default() -> Self {
        SubdivisionPreset::Balanced
    }
}

impl SubdivisionPreset {
    pub fn policy(self) -> SubdivisionPolicy {
        match self {
            SubdivisionPreset::Balanced => SubdivisionPolicy::balanced(),
            SubdivisionPreset::DensePointClouds => SubdivisionPolicy::dense_point_clouds(),
            SubdivisionPreset::LargeEntities => SubdivisionPolicy::large_entities(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub max_depth: u8,
    pub max_entities_per_node: usize,
    pub subdivision_preset: SubdivisionPreset,
    pub knn_cache_max_entries: usize,
    pub world_size_override: Option<u64>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            max_depth: MAX_LEVEL,
            max_entities_per_node: 10,
            subdivision_preset: SubdivisionPreset::Balanced,
            knn_cache_max_entries: 10_000,
            world_size_override: None,
        }
    }
}

impl IndexConfig {
    pub fn world_size(&self) -> u64 {
        self.world_size_override.unwrap_or(DEFAULT_WORLD_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = IndexConfig::default();
        assert_eq!(cfg.max_depth, 21);
        assert_eq!(cfg.max_entities_per_node, 10);
        assert_eq!(cfg.subdivision_preset, SubdivisionPreset::Balanced);
        assert_eq!(cfg.knn_cache_max_entries, 10_000);
        assert_eq!(cfg.world_size(), 1 << 21);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = IndexConfig::default();
        let text = serde_json::to_string(&cfg).unwrap();
        let back: IndexConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.max_depth, cfg.max_depth);
    }
}
