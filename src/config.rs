use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::{LibError, Result};
use crate::models::{AddRelLabels, PersonId};

pub const DEFAULT_NODE_SEPARATION: f64 = 250.0;
pub const DEFAULT_LEVEL_SEPARATION: f64 = 150.0;
pub const DEFAULT_GENERATIONS: usize = 2;

/// Layout and editing settings for one chart.
///
/// `None` depths mean "no limit". Comparators and privacy predicates are not
/// data and are attached to the session instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartConfig {
    pub main_id: Option<PersonId>,
    pub node_separation: f64,
    pub level_separation: f64,
    pub ancestry_depth: Option<usize>,
    pub progeny_depth: Option<usize>,
    pub single_parent_empty_card: bool,
    pub is_horizontal: bool,
    pub show_siblings_of_main: bool,
    pub sort_children_with_spouses: bool,
    pub labels: AddRelLabels,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            main_id: None,
            node_separation: DEFAULT_NODE_SEPARATION,
            level_separation: DEFAULT_LEVEL_SEPARATION,
            ancestry_depth: Some(DEFAULT_GENERATIONS),
            progeny_depth: Some(DEFAULT_GENERATIONS),
            single_parent_empty_card: true,
            is_horizontal: false,
            show_siblings_of_main: true,
            sort_children_with_spouses: true,
            labels: AddRelLabels::default(),
        }
    }
}

impl ChartConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: ChartConfig = serde_json::from_str(raw).map_err(|err| {
            LibError::invalid("Chart configuration is not valid JSON", anyhow!(err))
        })?;
        Ok(config.normalize())
    }

    /// Replaces unusable separations with the defaults.
    pub fn normalize(mut self) -> Self {
        if !self.node_separation.is_finite() || self.node_separation <= 0.0 {
            self.node_separation = DEFAULT_NODE_SEPARATION;
        }
        if !self.level_separation.is_finite() || self.level_separation <= 0.0 {
            self.level_separation = DEFAULT_LEVEL_SEPARATION;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = ChartConfig::from_json_str(r#"{"nodeSeparation": 300, "progenyDepth": null}"#)
            .expect("config should parse");

        assert_eq!(config.node_separation, 300.0);
        assert_eq!(config.level_separation, DEFAULT_LEVEL_SEPARATION);
        assert_eq!(config.ancestry_depth, Some(2));
        assert_eq!(config.progeny_depth, None);
        assert!(config.show_siblings_of_main);
        assert_eq!(config.labels.father, "Add father");
    }

    #[test]
    fn normalize_rejects_non_positive_separation() {
        let config = ChartConfig {
            node_separation: 0.0,
            level_separation: f64::NAN,
            ..ChartConfig::default()
        }
        .normalize();

        assert_eq!(config.node_separation, DEFAULT_NODE_SEPARATION);
        assert_eq!(config.level_separation, DEFAULT_LEVEL_SEPARATION);
    }

    #[test]
    fn malformed_config_is_invalid_input() {
        let err = ChartConfig::from_json_str("{").expect_err("should reject bad json");
        assert_eq!(err.code, "invalid_input");
    }
}
