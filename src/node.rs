//! Event-driven map goals node
//!
//! All inputs arrive as [`Event`]s and are handled one at a time, in arrival
//! order, on a single task. Outputs leave through a [`GoalSink`].

use crate::common::messages::{OccupancyGrid, Point};
use crate::config::MapGoalsConfig;
use crate::error::{MapGoalsError, Result};
use crate::navigation::goal_dispatcher::{
    GoalCandidate, GoalDispatcher, GoalSink, NavigationGoal, Rejected,
};
use crate::navigation::grid_raster::GridRaster;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Goal request sent once at startup
pub const BOOTSTRAP_PROBE: Point = Point::new(5.0, 2.0, 0.0);

/// Inputs of the node
#[derive(Debug, Clone)]
pub enum Event {
    /// Full occupancy grid snapshot
    Map(OccupancyGrid),
    /// Pointer press on the raster, in pixels
    PointerPress { x: i32, y: i32 },
    /// Candidate from an external planner
    GoalResponse(Point),
    /// Periodic loop cycle
    Tick,
    /// Stop processing
    Shutdown,
}

/// Outputs of the node
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Goal(NavigationGoal),
    GoalRequest(Point),
}

impl GoalSink for mpsc::UnboundedSender<Outbound> {
    fn send_goal(&self, goal: &NavigationGoal) -> Result<()> {
        self.send(Outbound::Goal(goal.clone()))
            .map_err(|_| MapGoalsError::ChannelClosed("goal"))
    }

    fn send_goal_request(&self, point: &Point) -> Result<()> {
        self.send(Outbound::GoalRequest(*point))
            .map_err(|_| MapGoalsError::ChannelClosed("goal request"))
    }
}

/// One-shot latch around the startup goal request
#[derive(Debug, Default)]
pub struct BootstrapProbe {
    sent: bool,
}

impl BootstrapProbe {
    pub fn new() -> Self {
        BootstrapProbe::default()
    }

    /// Send the probe if it has not been sent yet. Returns true when this call
    /// sent it. The latch closes even if publishing fails.
    pub fn fire(&mut self, sink: &dyn GoalSink) -> Result<bool> {
        if self.sent {
            return Ok(false);
        }
        self.sent = true;
        sink.send_goal_request(&BOOTSTRAP_PROBE)?;
        info!(
            "Publishing to (x: {}, y: {})",
            BOOTSTRAP_PROBE.x as i64, BOOTSTRAP_PROBE.y as i64
        );
        Ok(true)
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }
}

/// Map goals node: grid raster, goal dispatcher and startup probe
pub struct MapGoalsNode<S: GoalSink> {
    raster: GridRaster,
    dispatcher: GoalDispatcher,
    probe: BootstrapProbe,
    sink: S,
    loop_period: Duration,
}

impl<S: GoalSink> MapGoalsNode<S> {
    /// Create a node from configuration
    pub fn new(config: &MapGoalsConfig, sink: S) -> Self {
        MapGoalsNode {
            raster: GridRaster::with_row_order(config.node.row_order),
            dispatcher: GoalDispatcher::new(),
            probe: BootstrapProbe::new(),
            sink,
            loop_period: config.loop_period(),
        }
    }

    pub fn raster(&self) -> &GridRaster {
        &self.raster
    }

    pub fn probe_sent(&self) -> bool {
        self.probe.is_sent()
    }

    /// Dispatch a single event
    pub fn handle(&mut self, event: Event) -> ControlFlow<()> {
        match event {
            Event::Map(grid) => self.on_map(&grid),
            Event::PointerPress { x, y } => {
                self.on_pointer_press(x, y);
            }
            Event::GoalResponse(point) => {
                // rejection is already logged by the dispatcher
                let _ = self.on_goal_response(point);
            }
            Event::Tick => self.on_tick(),
            Event::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    pub fn on_map(&mut self, grid: &OccupancyGrid) {
        if self.raster.ingest(grid) {
            debug!(
                "Map updated: {}x{} at {} m/cell",
                grid.info.width, grid.info.height, grid.info.resolution
            );
        }
    }

    /// Pointer presses are ignored until a raster exists
    pub fn on_pointer_press(&self, x: i32, y: i32) -> Option<NavigationGoal> {
        if self.raster.is_empty() {
            debug!("Ignoring press at ({}, {}), no map yet", x, y);
            return None;
        }
        self.dispatcher
            .request_goal(&self.raster, &GoalCandidate::from_pointer(x, y), &self.sink)
            .ok()
    }

    pub fn on_goal_response(&self, point: Point) -> std::result::Result<NavigationGoal, Rejected> {
        self.dispatcher.request_goal(
            &self.raster,
            &GoalCandidate::from_goal_response(point),
            &self.sink,
        )
    }

    pub fn on_tick(&mut self) {
        if let Err(e) = self.probe.fire(&self.sink) {
            warn!("Failed to publish startup goal request: {}", e);
        }
    }

    /// Process events until shutdown or until every sender is dropped.
    ///
    /// The probe goes out on the first loop cycle, before any event is
    /// handled; later cycles follow the configured loop rate.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>) {
        let mut interval = tokio::time::interval(self.loop_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // the first tick completes immediately; run it before any queued event
        interval.tick().await;
        self.on_tick();

        loop {
            tokio::select! {
                biased;
                _ = interval.tick() => self.on_tick(),
                event = events.recv() => match event {
                    Some(event) => {
                        if self.handle(event).is_break() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        info!("Map goals node stopped");
    }
}
