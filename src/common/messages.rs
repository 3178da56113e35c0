//! Plain message types exchanged with the transport layer.
//!
//! Field layout follows the ROS 2 `builtin_interfaces`, `std_msgs`,
//! `geometry_msgs` and `nav_msgs` definitions so adapters can convert field by
//! field.

use std::time::{SystemTime, UNIX_EPOCH};

/// Time stamp (seconds + nanoseconds since the epoch)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Time {
    pub sec: i32,
    pub nanosec: u32,
}

impl Time {
    /// Current wall clock time
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Time {
            sec: elapsed.as_secs() as i32,
            nanosec: elapsed.subsec_nanos(),
        }
    }
}

/// Standard metadata for stamped data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

/// A position in free space
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Point { x, y, z }
    }
}

/// An orientation in free space in quaternion form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    /// No rotation
    pub const fn identity() -> Self {
        Quaternion {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::identity()
    }
}

/// A pose: position + orientation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

/// A pose with a reference frame and time stamp
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseStamped {
    pub header: Header,
    pub pose: Pose,
}

/// Metadata about the map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapMetaData {
    /// The time at which the map was loaded
    pub map_load_time: Time,
    /// The map resolution (meters/cell)
    pub resolution: f32,
    /// Map width (cells)
    pub width: u32,
    /// Map height (cells)
    pub height: u32,
    /// The real-world pose of cell (0, 0) in the map
    pub origin: Pose,
}

/// A 2D grid map in which each cell holds an occupancy belief.
///
/// Data is row-major starting at (0, 0), row 0 at the bottom of the world.
/// Values are in [0, 100]; unknown is -1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OccupancyGrid {
    pub header: Header,
    pub info: MapMetaData,
    pub data: Vec<i8>,
}

impl OccupancyGrid {
    /// Build a grid in the "map" frame
    pub fn new(width: u32, height: u32, resolution: f32, origin: Pose, data: Vec<i8>) -> Self {
        OccupancyGrid {
            header: Header {
                stamp: Time::now(),
                frame_id: "map".to_string(),
            },
            info: MapMetaData {
                map_load_time: Time::default(),
                resolution,
                width,
                height,
                origin,
            },
            data,
        }
    }

    /// Build a grid with every cell set to `value`
    pub fn filled(width: u32, height: u32, resolution: f32, origin: Pose, value: i8) -> Self {
        let cells = width as usize * height as usize;
        OccupancyGrid::new(width, height, resolution, origin, vec![value; cells])
    }

    /// Set the cell at grid column `x`, grid row `y` (row 0 at the bottom)
    pub fn set(&mut self, x: u32, y: u32, value: i8) {
        if x < self.info.width && y < self.info.height {
            let index = (y * self.info.width + x) as usize;
            if let Some(cell) = self.data.get_mut(index) {
                *cell = value;
            }
        }
    }
}
