//! Occupancy grid raster
//!
//! Converts occupancy grid snapshots into a classified raster image and keeps
//! the transform that maps raster pixels back into the world frame. The image
//! is stored with row 0 at the top while grid row 0 is the bottom of the
//! world, so every update flips the rows.

use crate::common::messages::{OccupancyGrid, Pose};
use crate::common::types::Point2D;
use crate::error::{MapGoalsError, Result};
use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Grids narrower or shorter than this are not converted
pub const MIN_GRID_SIZE: u32 = 3;

/// Raster byte values for each cell class
pub mod raster_values {
    pub const UNKNOWN: u8 = 127;
    pub const FREE: u8 = 255;
    pub const OCCUPIED: u8 = 0;
}

/// Occupancy values understood in grid messages
pub mod occupancy_values {
    pub const UNKNOWN: i8 = -1;
    pub const FREE: i8 = 0;
    pub const OCCUPIED: i8 = 100;
}

/// Classification of a raster cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellClass {
    Unknown,
    Free,
    Occupied,
}

impl CellClass {
    /// Classify a raw occupancy value. Values other than -1, 0 and 100 have
    /// no classification.
    pub fn from_occupancy(value: i8) -> Option<Self> {
        match value {
            occupancy_values::UNKNOWN => Some(CellClass::Unknown),
            occupancy_values::FREE => Some(CellClass::Free),
            occupancy_values::OCCUPIED => Some(CellClass::Occupied),
            _ => None,
        }
    }

    /// Decode a raster byte
    pub fn from_raster(byte: u8) -> Self {
        match byte {
            raster_values::FREE => CellClass::Free,
            raster_values::OCCUPIED => CellClass::Occupied,
            _ => CellClass::Unknown,
        }
    }

    /// Encode as a raster byte
    pub fn to_raster(self) -> u8 {
        match self {
            CellClass::Unknown => raster_values::UNKNOWN,
            CellClass::Free => raster_values::FREE,
            CellClass::Occupied => raster_values::OCCUPIED,
        }
    }
}

impl fmt::Display for CellClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellClass::Unknown => write!(f, "unknown"),
            CellClass::Free => write!(f, "free"),
            CellClass::Occupied => write!(f, "occupied"),
        }
    }
}

/// How raster rows are matched to grid rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowOrder {
    /// Raster row `y` reads grid row `height - y`. Row 0 reads one band past
    /// the end of the grid and is never written.
    #[default]
    Legacy,
    /// Raster row `y` reads grid row `height - 1 - y`
    Mirrored,
}

/// Flat index into the grid data for raster column `x`, raster row `y`.
///
/// `y` must be below `height`. The returned index is not checked against the
/// grid data; `Legacy` yields `width * height + x` for `y = 0`.
pub fn source_index(order: RowOrder, width: usize, height: usize, x: usize, y: usize) -> usize {
    debug_assert!(y < height);
    match order {
        RowOrder::Legacy => width * (height - y) + x,
        RowOrder::Mirrored => width * (height - 1 - y) + x,
    }
}

/// Bounds-checked raster of classified cells, row 0 at the top
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRaster {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl ClassifiedRaster {
    /// Create a raster with every cell unknown
    pub fn new(width: usize, height: usize) -> Self {
        ClassifiedRaster {
            width,
            height,
            data: vec![raster_values::UNKNOWN; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Classification at column `x`, row `y`, or `None` when out of bounds
    pub fn get(&self, x: i64, y: i64) -> Option<CellClass> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        let index = y as usize * self.width + x as usize;
        self.data.get(index).copied().map(CellClass::from_raster)
    }

    /// Raw image bytes, row-major
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Write a cell through the flat buffer. Returns false when `index` is
    /// outside the buffer and nothing was written.
    fn set_flat(&mut self, index: usize, class: CellClass) -> bool {
        match self.data.get_mut(index) {
            Some(byte) => {
                *byte = class.to_raster();
                true
            }
            None => false,
        }
    }
}

/// Rigid transform from the map-local frame into the world frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTransform {
    isometry: Isometry3<f64>,
}

impl WorldTransform {
    pub fn identity() -> Self {
        WorldTransform {
            isometry: Isometry3::identity(),
        }
    }

    /// Build from a grid origin pose. A zero-norm orientation is read as no
    /// rotation.
    pub fn from_pose(pose: &Pose) -> Self {
        let p = &pose.position;
        let o = &pose.orientation;
        let rotation = UnitQuaternion::try_new(Quaternion::new(o.w, o.x, o.y, o.z), f64::EPSILON)
            .unwrap_or_else(UnitQuaternion::identity);
        WorldTransform {
            isometry: Isometry3::from_parts(Translation3::new(p.x, p.y, p.z), rotation),
        }
    }

    /// Transform a map-local point lying in the z = 0 plane
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let transformed = self.isometry * Point3::new(x, y, 0.0);
        (transformed.x, transformed.y)
    }
}

impl Default for WorldTransform {
    fn default() -> Self {
        WorldTransform::identity()
    }
}

/// A raster together with the transform and resolution of the same update
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSnapshot {
    pub raster: ClassifiedRaster,
    pub transform: WorldTransform,
    pub resolution: f64,
}

impl RasterSnapshot {
    /// Classification at pixel (px, py); unknown when out of bounds
    pub fn classify(&self, px: i64, py: i64) -> CellClass {
        self.raster.get(px, py).unwrap_or(CellClass::Unknown)
    }

    /// Pixel to world coordinates. The transformed Y is negated to undo the
    /// image row inversion.
    pub fn to_world(&self, px: f64, py: f64) -> Point2D {
        let (x, y) = self
            .transform
            .apply(px * self.resolution, py * self.resolution);
        (x, -y)
    }
}

/// Owner of the latest classified raster and its world transform
#[derive(Debug, Default)]
pub struct GridRaster {
    row_order: RowOrder,
    current: Option<Arc<RasterSnapshot>>,
}

impl GridRaster {
    /// Create an empty raster using the legacy row order
    pub fn new() -> Self {
        GridRaster::default()
    }

    /// Create an empty raster with a specific row order
    pub fn with_row_order(row_order: RowOrder) -> Self {
        GridRaster {
            row_order,
            current: None,
        }
    }

    pub fn row_order(&self) -> RowOrder {
        self.row_order
    }

    /// Convert a grid update into the raster.
    ///
    /// Returns false when the grid is too small and the update was dropped.
    /// The raster is only reallocated when both width and height differ from
    /// the stored ones; otherwise cells are written in place using the
    /// incoming grid's row stride, and writes past the buffer are dropped.
    pub fn ingest(&mut self, grid: &OccupancyGrid) -> bool {
        let size_x = grid.info.width;
        let size_y = grid.info.height;

        if size_x < MIN_GRID_SIZE || size_y < MIN_GRID_SIZE {
            info!(
                "Map size is only x: {}, y: {}. Not running map to raster conversion",
                size_x, size_y
            );
            return false;
        }

        let width = size_x as usize;
        let height = size_y as usize;

        let mut raster = match self.current.as_deref() {
            Some(snapshot)
                if snapshot.raster.width() == width || snapshot.raster.height() == height =>
            {
                snapshot.raster.clone()
            }
            _ => {
                debug!("Allocating {}x{} raster", width, height);
                ClassifiedRaster::new(width, height)
            }
        };

        let mut dropped = 0usize;
        for y in 0..height {
            for x in 0..width {
                let class = grid
                    .data
                    .get(source_index(self.row_order, width, height, x, y))
                    .copied()
                    .and_then(CellClass::from_occupancy);

                if let Some(class) = class {
                    if !raster.set_flat(width * y + x, class) {
                        dropped += 1;
                    }
                }
            }
        }

        if dropped > 0 {
            debug!(
                "{} cells fell outside the {}x{} raster",
                dropped,
                raster.width(),
                raster.height()
            );
        }

        self.current = Some(Arc::new(RasterSnapshot {
            raster,
            transform: WorldTransform::from_pose(&grid.info.origin),
            resolution: f64::from(grid.info.resolution),
        }));

        true
    }

    /// Classification at pixel (px, py). Unknown when no grid has been
    /// ingested or the pixel is out of bounds.
    pub fn classify(&self, px: i64, py: i64) -> CellClass {
        self.current
            .as_deref()
            .map_or(CellClass::Unknown, |snapshot| snapshot.classify(px, py))
    }

    /// Pixel to world coordinates
    pub fn to_world(&self, px: f64, py: f64) -> Result<Point2D> {
        self.current
            .as_deref()
            .map(|snapshot| snapshot.to_world(px, py))
            .ok_or_else(|| MapGoalsError::InvalidState("no map has been received".to_string()))
    }

    /// The raster and transform of the latest accepted update
    pub fn snapshot(&self) -> Option<Arc<RasterSnapshot>> {
        self.current.clone()
    }

    /// Raster (width, height), if any
    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.current
            .as_deref()
            .map(|snapshot| (snapshot.raster.width(), snapshot.raster.height()))
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::messages::{Point, Quaternion};
    use approx::assert_relative_eq;

    fn grid(width: u32, height: u32, value: i8) -> OccupancyGrid {
        OccupancyGrid::filled(width, height, 1.0, Pose::default(), value)
    }

    #[test]
    fn legacy_index_reads_one_row_band_higher() {
        // 4 wide, 3 high
        assert_eq!(source_index(RowOrder::Legacy, 4, 3, 0, 0), 12);
        assert_eq!(source_index(RowOrder::Legacy, 4, 3, 1, 1), 9);
        assert_eq!(source_index(RowOrder::Legacy, 4, 3, 3, 2), 7);
    }

    #[test]
    fn mirrored_index_flips_rows() {
        assert_eq!(source_index(RowOrder::Mirrored, 4, 3, 0, 0), 8);
        assert_eq!(source_index(RowOrder::Mirrored, 4, 3, 1, 1), 5);
        assert_eq!(source_index(RowOrder::Mirrored, 4, 3, 3, 2), 3);
    }

    #[test]
    fn raw_values_classify() {
        assert_eq!(CellClass::from_occupancy(-1), Some(CellClass::Unknown));
        assert_eq!(CellClass::from_occupancy(0), Some(CellClass::Free));
        assert_eq!(CellClass::from_occupancy(100), Some(CellClass::Occupied));
        assert_eq!(CellClass::from_occupancy(50), None);
        assert_eq!(CellClass::Unknown.to_raster(), 127);
        assert_eq!(CellClass::Free.to_raster(), 255);
        assert_eq!(CellClass::Occupied.to_raster(), 0);
    }

    #[test]
    fn every_cell_classifies_under_mirrored_order() {
        let mut g = grid(4, 3, occupancy_values::FREE);
        g.set(0, 0, occupancy_values::OCCUPIED);
        g.set(3, 2, occupancy_values::UNKNOWN);

        let mut raster = GridRaster::with_row_order(RowOrder::Mirrored);
        assert!(raster.ingest(&g));

        // grid row 0 is the bottom image row
        assert_eq!(raster.classify(0, 2), CellClass::Occupied);
        assert_eq!(raster.classify(3, 0), CellClass::Unknown);
        assert_eq!(raster.classify(1, 1), CellClass::Free);
        assert_eq!(raster.classify(3, 2), CellClass::Free);
    }

    #[test]
    fn legacy_order_leaves_top_row_unwritten() {
        let mut raster = GridRaster::new();
        assert!(raster.ingest(&grid(3, 3, occupancy_values::FREE)));

        for x in 0..3 {
            assert_eq!(raster.classify(x, 0), CellClass::Unknown);
            assert_eq!(raster.classify(x, 1), CellClass::Free);
            assert_eq!(raster.classify(x, 2), CellClass::Free);
        }
    }

    #[test]
    fn small_grids_leave_raster_unchanged() {
        let mut raster = GridRaster::with_row_order(RowOrder::Mirrored);
        let mut g = grid(4, 4, occupancy_values::FREE);
        g.set(1, 1, occupancy_values::OCCUPIED);
        raster.ingest(&g);
        let before = raster.snapshot().expect("snapshot");

        assert!(!raster.ingest(&grid(2, 7, occupancy_values::OCCUPIED)));
        assert!(!raster.ingest(&grid(7, 2, occupancy_values::OCCUPIED)));

        let after = raster.snapshot().expect("snapshot");
        assert_eq!(before.raster.bytes(), after.raster.bytes());
        assert_eq!(raster.dimensions(), Some((4, 4)));
    }

    #[test]
    fn small_first_grid_keeps_raster_empty() {
        let mut raster = GridRaster::new();
        assert!(!raster.ingest(&grid(2, 2, occupancy_values::FREE)));
        assert!(raster.is_empty());
    }

    #[test]
    fn reallocates_when_both_dimensions_change() {
        let mut raster = GridRaster::new();
        raster.ingest(&grid(5, 5, occupancy_values::FREE));
        raster.ingest(&grid(7, 6, occupancy_values::FREE));
        assert_eq!(raster.dimensions(), Some((7, 6)));
    }

    #[test]
    fn keeps_shape_when_only_one_dimension_changes() {
        let mut raster = GridRaster::new();
        raster.ingest(&grid(5, 5, occupancy_values::FREE));
        assert!(raster.ingest(&grid(5, 4, occupancy_values::OCCUPIED)));

        assert_eq!(raster.dimensions(), Some((5, 5)));
        // rows 1..=3 rewritten from the 5x4 grid, row 4 is stale
        for x in 0..5 {
            assert_eq!(raster.classify(x, 0), CellClass::Unknown);
            assert_eq!(raster.classify(x, 1), CellClass::Occupied);
            assert_eq!(raster.classify(x, 3), CellClass::Occupied);
            assert_eq!(raster.classify(x, 4), CellClass::Free);
        }
    }

    #[test]
    fn writes_past_a_kept_buffer_are_dropped() {
        let mut raster = GridRaster::with_row_order(RowOrder::Mirrored);
        assert_eq!(raster.row_order(), RowOrder::Mirrored);
        raster.ingest(&grid(5, 5, occupancy_values::FREE));

        // wider grid, same height: rows 0..=3 of the new stride cover the buffer
        assert!(raster.ingest(&grid(7, 5, occupancy_values::OCCUPIED)));
        assert_eq!(raster.dimensions(), Some((5, 5)));
        for y in 0..5 {
            for x in 0..5 {
                assert_eq!(raster.classify(x, y), CellClass::Occupied);
            }
        }

        // taller grid, same width: only the first five rows land
        assert!(raster.ingest(&grid(5, 9, occupancy_values::UNKNOWN)));
        assert_eq!(raster.dimensions(), Some((5, 5)));
        for y in 0..5 {
            for x in 0..5 {
                assert_eq!(raster.classify(x, y), CellClass::Unknown);
            }
        }
    }

    #[test]
    fn unclassifiable_values_keep_stale_cells() {
        let mut raster = GridRaster::with_row_order(RowOrder::Mirrored);
        raster.ingest(&grid(3, 3, occupancy_values::OCCUPIED));

        let mut g = grid(3, 3, 42);
        g.set(0, 0, occupancy_values::FREE);
        raster.ingest(&g);

        assert_eq!(raster.classify(0, 2), CellClass::Free);
        assert_eq!(raster.classify(1, 1), CellClass::Occupied);
    }

    #[test]
    fn classify_out_of_bounds_is_unknown() {
        let mut raster = GridRaster::with_row_order(RowOrder::Mirrored);
        assert_eq!(raster.classify(0, 0), CellClass::Unknown);

        raster.ingest(&grid(3, 3, occupancy_values::FREE));
        assert_eq!(raster.classify(-1, 0), CellClass::Unknown);
        assert_eq!(raster.classify(0, -1), CellClass::Unknown);
        assert_eq!(raster.classify(3, 0), CellClass::Unknown);
        assert_eq!(raster.classify(0, 3), CellClass::Unknown);
    }

    #[test]
    fn to_world_before_any_map_fails() {
        let raster = GridRaster::new();
        assert!(matches!(
            raster.to_world(1.0, 1.0),
            Err(MapGoalsError::InvalidState(_))
        ));
    }

    #[test]
    fn to_world_scales_translates_and_negates_y() {
        let origin = Pose {
            position: Point::new(-1.0, -2.0, 0.0),
            orientation: Quaternion::identity(),
        };
        let mut raster = GridRaster::new();
        raster.ingest(&OccupancyGrid::filled(8, 8, 0.5, origin, 0));

        let (x, y) = raster.to_world(4.0, 2.0).expect("world point");
        assert_relative_eq!(x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn to_world_applies_origin_rotation() {
        let half = std::f64::consts::FRAC_PI_4;
        let origin = Pose {
            position: Point::new(1.0, 2.0, 0.0),
            orientation: Quaternion {
                x: 0.0,
                y: 0.0,
                z: half.sin(),
                w: half.cos(),
            },
        };
        let mut raster = GridRaster::new();
        raster.ingest(&OccupancyGrid::filled(4, 4, 1.0, origin, 0));

        let (x, y) = raster.to_world(2.0, 0.0).expect("world point");
        assert_relative_eq!(x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(y, -4.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_orientation_is_identity() {
        let origin = Pose {
            position: Point::new(0.0, 0.0, 0.0),
            orientation: Quaternion {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                w: 0.0,
            },
        };
        let transform = WorldTransform::from_pose(&origin);
        let (x, y) = transform.apply(3.0, 4.0);
        assert_relative_eq!(x, 3.0);
        assert_relative_eq!(y, 4.0);
    }

    #[test]
    fn transform_follows_every_accepted_update() {
        let mut raster = GridRaster::new();
        raster.ingest(&grid(5, 5, occupancy_values::FREE));

        let moved = Pose {
            position: Point::new(10.0, 0.0, 0.0),
            orientation: Quaternion::identity(),
        };
        raster.ingest(&OccupancyGrid::filled(5, 5, 2.0, moved, 0));

        let (x, y) = raster.to_world(1.0, 1.0).expect("world point");
        assert_relative_eq!(x, 12.0, epsilon = 1e-9);
        assert_relative_eq!(y, -2.0, epsilon = 1e-9);
    }
}
