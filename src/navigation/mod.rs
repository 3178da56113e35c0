//! Navigation module: map raster and goal dispatch
pub mod goal_dispatcher;
pub mod grid_raster;
