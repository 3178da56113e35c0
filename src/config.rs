//! Configuration loading for the map goals node

use crate::error::{MapGoalsError, Result};
use crate::navigation::grid_raster::RowOrder;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MapGoalsConfig {
    #[serde(default)]
    pub topics: TopicConfig,
    #[serde(default)]
    pub node: NodeConfig,
}

/// Topic names and queue sizes
#[derive(Clone, Debug, Deserialize)]
pub struct TopicConfig {
    /// Occupancy grid input (default: "map")
    #[serde(default = "default_map_topic")]
    pub map: String,

    /// Candidate points from an external planner (default: "goal/response")
    #[serde(default = "default_goal_response_topic")]
    pub goal_response: String,

    /// Navigation goal output (default: "goal")
    #[serde(default = "default_goal_topic")]
    pub goal: String,

    /// Goal request, echo and startup probe output (default: "goal/request")
    #[serde(default = "default_goal_request_topic")]
    pub goal_request: String,

    /// Depth of the event channel and of every ROS publisher and
    /// subscription history (default: 10)
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

/// Node loop settings
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    /// Loop rate in Hz (default: 1.0)
    #[serde(default = "default_loop_rate")]
    pub loop_rate_hz: f64,

    /// Raster row mapping (default: legacy)
    #[serde(default)]
    pub row_order: RowOrder,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            map: default_map_topic(),
            goal_response: default_goal_response_topic(),
            goal: default_goal_topic(),
            goal_request: default_goal_request_topic(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl TopicConfig {
    /// Keep-last history depth for ROS endpoints
    pub fn history_depth(&self) -> u32 {
        u32::try_from(self.queue_depth).unwrap_or(u32::MAX)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            loop_rate_hz: default_loop_rate(),
            row_order: RowOrder::default(),
        }
    }
}

// Default value functions
fn default_map_topic() -> String {
    "map".to_string()
}
fn default_goal_response_topic() -> String {
    "goal/response".to_string()
}
fn default_goal_topic() -> String {
    "goal".to_string()
}
fn default_goal_request_topic() -> String {
    "goal/request".to_string()
}
fn default_queue_depth() -> usize {
    10
}
fn default_loop_rate() -> f64 {
    1.0
}

impl MapGoalsConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.node.loop_rate_hz.is_finite() && self.node.loop_rate_hz > 0.0) {
            return Err(MapGoalsError::Config(format!(
                "loop_rate_hz must be positive, got {}",
                self.node.loop_rate_hz
            )));
        }
        if self.topics.queue_depth == 0 {
            return Err(MapGoalsError::Config(
                "queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Period of the node loop. Falls back to one second for rates that
    /// `validate` would reject.
    pub fn loop_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.node.loop_rate_hz)
            .ok()
            .filter(|period| !period.is_zero())
            .unwrap_or(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_topic_layout() {
        let config = MapGoalsConfig::default();
        assert_eq!(config.topics.map, "map");
        assert_eq!(config.topics.goal_response, "goal/response");
        assert_eq!(config.topics.goal, "goal");
        assert_eq!(config.topics.goal_request, "goal/request");
        assert_eq!(config.topics.queue_depth, 10);
        assert_eq!(config.node.row_order, RowOrder::Legacy);
        assert_eq!(config.loop_period(), Duration::from_secs(1));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = MapGoalsConfig::from_toml_str(
            r#"
            [topics]
            goal = "move_base_simple/goal"

            [node]
            loop_rate_hz = 4.0
            row_order = "mirrored"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.topics.goal, "move_base_simple/goal");
        assert_eq!(config.topics.map, "map");
        assert_eq!(config.node.row_order, RowOrder::Mirrored);
        assert_eq!(config.loop_period(), Duration::from_millis(250));
    }

    #[test]
    fn empty_file_is_default() {
        let config = MapGoalsConfig::from_toml_str("").expect("valid config");
        assert_eq!(config.topics.queue_depth, 10);
        assert_eq!(config.topics.history_depth(), 10);
    }

    #[test]
    fn queue_depth_sets_history_depth() {
        let config =
            MapGoalsConfig::from_toml_str("[topics]\nqueue_depth = 3").expect("valid config");
        assert_eq!(config.topics.history_depth(), 3);

        let mut config = MapGoalsConfig::default();
        config.topics.queue_depth = usize::MAX;
        assert_eq!(config.topics.history_depth(), u32::MAX);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            MapGoalsConfig::from_toml_str("[node]\nloop_rate_hz = 0.0"),
            Err(MapGoalsError::Config(_))
        ));
        assert!(matches!(
            MapGoalsConfig::from_toml_str("[topics]\nqueue_depth = 0"),
            Err(MapGoalsError::Config(_))
        ));
        assert!(matches!(
            MapGoalsConfig::from_toml_str("[node]\nrow_order = \"sideways\""),
            Err(MapGoalsError::Config(_))
        ));
    }

    #[test]
    fn unusable_rate_falls_back_to_one_second() {
        let mut config = MapGoalsConfig::default();
        config.node.loop_rate_hz = -2.0;
        assert_eq!(config.loop_period(), Duration::from_secs(1));
        config.node.loop_rate_hz = f64::INFINITY;
        assert_eq!(config.loop_period(), Duration::from_secs(1));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            MapGoalsConfig::load(Path::new("/nonexistent/map_goals.toml")),
            Err(MapGoalsError::Io(_))
        ));
    }
}
