//! Common utilities and types for the map goals core
pub mod messages;

/// Common types and utilities used across the codebase
pub mod types {
    /// A raster pixel (column, row), row 0 at the top of the image
    pub type Pixel = (i64, i64);

    /// A 2D point in the world frame (x, y)
    pub type Point2D = (f64, f64);
}
