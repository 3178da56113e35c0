//! Map goals core for the Prometheus mobile robot
//!
//! Turns occupancy grids into a classified raster and raster pixels into
//! navigation goals in the map frame.
pub mod common;
pub mod config;
pub mod error;
pub mod navigation;
pub mod node;

pub use crate::common::messages::{OccupancyGrid, Point, PoseStamped};
pub use crate::config::MapGoalsConfig;
pub use crate::error::{MapGoalsError, Result};
pub use crate::navigation::goal_dispatcher::{
    GoalCandidate, GoalDispatcher, GoalSink, NavigationGoal, Rejected,
};
pub use crate::navigation::grid_raster::{CellClass, GridRaster, RowOrder};
pub use crate::node::{Event, MapGoalsNode, Outbound, BOOTSTRAP_PROBE};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Does nothing if a
/// subscriber is already installed.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
