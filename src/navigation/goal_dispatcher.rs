//! Goal dispatcher
//!
//! Turns candidate raster pixels into navigation goals in the map frame.
//! Candidates on cells that are not free are rejected without any output.

use super::grid_raster::{CellClass, GridRaster};
use crate::common::messages::{Header, Point, Pose, PoseStamped, Quaternion, Time};
use crate::common::types::Pixel;
use crate::error::Result;
use std::fmt;
use tracing::{info, warn};

/// Frame every goal is expressed in
pub const GOAL_FRAME_ID: &str = "map";

/// A navigation goal published for the robot
pub type NavigationGoal = PoseStamped;

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CandidateSource {
    /// A press on the displayed raster
    Pointer,
    /// A response from an external planner, echoed back once accepted
    GoalResponse(Point),
}

/// A proposed target in raster pixel units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalCandidate {
    pub x: f64,
    pub y: f64,
    pub source: CandidateSource,
}

impl GoalCandidate {
    pub fn from_pointer(x: i32, y: i32) -> Self {
        GoalCandidate {
            x: f64::from(x),
            y: f64::from(y),
            source: CandidateSource::Pointer,
        }
    }

    pub fn from_goal_response(point: Point) -> Self {
        GoalCandidate {
            x: point.x,
            y: point.y,
            source: CandidateSource::GoalResponse(point),
        }
    }

    /// The raster cell holding this candidate, coordinates truncated
    pub fn pixel(&self) -> Option<Pixel> {
        if self.x.is_finite() && self.y.is_finite() {
            Some((self.x as i64, self.y as i64))
        } else {
            None
        }
    }
}

/// A candidate that does not lie on a free cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rejected {
    pub candidate: GoalCandidate,
    pub cell: CellClass,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(x: {}, y: {}) is not reachable, cell is {}",
            self.candidate.x, self.candidate.y, self.cell
        )
    }
}

/// Output channels of the dispatcher
pub trait GoalSink {
    /// Publish a navigation goal
    fn send_goal(&self, goal: &NavigationGoal) -> Result<()>;

    /// Publish a point on the goal request channel
    fn send_goal_request(&self, point: &Point) -> Result<()>;
}

/// Validates candidates and emits navigation goals
#[derive(Debug, Default)]
pub struct GoalDispatcher {}

impl GoalDispatcher {
    /// Create a new goal dispatcher
    pub fn new() -> Self {
        GoalDispatcher {}
    }

    /// Validate a candidate and build its goal without emitting anything
    pub fn evaluate(
        &self,
        raster: &GridRaster,
        candidate: &GoalCandidate,
    ) -> std::result::Result<NavigationGoal, Rejected> {
        let rejected = |cell| Rejected {
            candidate: *candidate,
            cell,
        };

        // one snapshot for both the lookup and the transform
        let snapshot = raster
            .snapshot()
            .ok_or_else(|| rejected(CellClass::Unknown))?;
        let (px, py) = candidate
            .pixel()
            .ok_or_else(|| rejected(CellClass::Unknown))?;

        match snapshot.classify(px, py) {
            CellClass::Free => {
                let (x, y) = snapshot.to_world(candidate.x, candidate.y);
                Ok(navigation_goal(x, y, Time::now()))
            }
            cell => Err(rejected(cell)),
        }
    }

    /// Validate a candidate and publish its goal.
    ///
    /// Goal-response candidates are echoed on the goal request channel once
    /// their goal is published. Publish failures are logged only.
    pub fn request_goal(
        &self,
        raster: &GridRaster,
        candidate: &GoalCandidate,
        sink: &dyn GoalSink,
    ) -> std::result::Result<NavigationGoal, Rejected> {
        let goal = self.evaluate(raster, candidate).map_err(|rejected| {
            warn!("Unable to move to {}", rejected);
            rejected
        })?;

        info!(
            "Moving to (x: {}, y: {}) -> world ({:.3}, {:.3})",
            candidate.x, candidate.y, goal.pose.position.x, goal.pose.position.y
        );

        if let Err(e) = sink.send_goal(&goal) {
            warn!("Failed to publish goal: {}", e);
        }

        if let CandidateSource::GoalResponse(point) = candidate.source {
            if let Err(e) = sink.send_goal_request(&point) {
                warn!("Failed to publish goal request: {}", e);
            }
        }

        Ok(goal)
    }
}

/// Goal at world (x, y) in the map frame with no rotation
pub fn navigation_goal(x: f64, y: f64, stamp: Time) -> NavigationGoal {
    PoseStamped {
        header: Header {
            stamp,
            frame_id: GOAL_FRAME_ID.to_string(),
        },
        pose: Pose {
            position: Point::new(x, y, 0.0),
            orientation: Quaternion::identity(),
        },
    }
}
