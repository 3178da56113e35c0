use anyhow::{Context, Result};
use clap::Parser;
use prometheus_map_goals::common::messages::{OccupancyGrid, Point, Pose};
use prometheus_map_goals::navigation::grid_raster::occupancy_values;
use prometheus_map_goals::{init_tracing, Event, MapGoalsConfig, MapGoalsNode, Outbound};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

/// Drive the map goals node with a synthetic room map
#[derive(Parser, Debug)]
#[command(name = "map_goals_sim", version)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Map width in cells
    #[arg(long, default_value_t = 20)]
    width: u32,

    /// Map height in cells
    #[arg(long, default_value_t = 15)]
    height: u32,

    /// Map resolution in meters per cell
    #[arg(long, default_value_t = 0.05)]
    resolution: f32,

    /// Pointer press on the raster as "x,y" (repeatable)
    #[arg(long = "press", value_parser = parse_pixel)]
    presses: Vec<(i32, i32)>,
}

fn parse_pixel(s: &str) -> std::result::Result<(i32, i32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{}'", s))?;
    let x = x.trim().parse().map_err(|e| format!("bad x in '{}': {}", s, e))?;
    let y = y.trim().parse().map_err(|e| format!("bad y in '{}': {}", s, e))?;
    Ok((x, y))
}

/// Walled room with a pillar in the middle and an unexplored strip on the right
fn room(width: u32, height: u32, resolution: f32) -> OccupancyGrid {
    let mut grid = OccupancyGrid::filled(
        width,
        height,
        resolution,
        Pose::default(),
        occupancy_values::FREE,
    );

    for x in 0..width {
        grid.set(x, 0, occupancy_values::OCCUPIED);
        grid.set(x, height.saturating_sub(1), occupancy_values::OCCUPIED);
    }
    for y in 0..height {
        grid.set(0, y, occupancy_values::OCCUPIED);
        grid.set(width.saturating_sub(2), y, occupancy_values::OCCUPIED);
        grid.set(width.saturating_sub(1), y, occupancy_values::UNKNOWN);
    }
    for y in height / 2..height / 2 + 2 {
        for x in width / 2..width / 2 + 2 {
            grid.set(x, y, occupancy_values::OCCUPIED);
        }
    }

    grid
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("prometheus_map_goals=info,map_goals_sim=info");

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            MapGoalsConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => {
            info!("Using default configuration");
            MapGoalsConfig::default()
        }
    };

    info!(
        "Topics: map={}, goal_response={}, goal={}, goal_request={}",
        config.topics.map,
        config.topics.goal_response,
        config.topics.goal,
        config.topics.goal_request
    );

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let (events_tx, events_rx) = mpsc::channel(config.topics.queue_depth);

    let node = MapGoalsNode::new(&config, outbound_tx);
    let handle = tokio::spawn(node.run(events_rx));

    events_tx
        .send(Event::Map(room(args.width, args.height, args.resolution)))
        .await?;

    // the planner answering the startup probe
    events_tx
        .send(Event::GoalResponse(Point::new(5.0, 2.0, 0.0)))
        .await?;

    let presses = if args.presses.is_empty() {
        vec![(2, 3), (0, 0), (args.width as i32 - 1, 4)]
    } else {
        args.presses.clone()
    };
    for (x, y) in presses {
        events_tx.send(Event::PointerPress { x, y }).await?;
    }

    events_tx.send(Event::Shutdown).await?;
    handle.await?;

    while let Ok(message) = outbound_rx.try_recv() {
        match message {
            Outbound::Goal(goal) => info!(
                "[{}] goal: x={:.3}, y={:.3}",
                config.topics.goal, goal.pose.position.x, goal.pose.position.y
            ),
            Outbound::GoalRequest(point) => info!(
                "[{}] point: x={}, y={}",
                config.topics.goal_request, point.x, point.y
            ),
        }
    }

    Ok(())
}
