use anyhow::{Error, Result};
use prometheus_map_goals::common::messages as core_msgs;
use prometheus_map_goals::{
    init_tracing, GoalSink, MapGoalsConfig, MapGoalsError, MapGoalsNode, NavigationGoal,
};
use rclrs::{Context, CreateBasicExecutor, RclrsErrorFilter, SpinOptions, QOS_PROFILE_DEFAULT};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{info, warn};

use builtin_interfaces::msg::Time;
use geometry_msgs::msg::{Point, Pose, PoseStamped, Quaternion};
use nav_msgs::msg::OccupancyGrid;
use std_msgs::msg::Header;

/// Goal and goal request publishers
struct RosGoalSink {
    goal_publisher: Arc<rclrs::Publisher<PoseStamped>>,
    goal_request_publisher: Arc<rclrs::Publisher<Point>>,
}

impl GoalSink for RosGoalSink {
    fn send_goal(&self, goal: &NavigationGoal) -> prometheus_map_goals::Result<()> {
        self.goal_publisher
            .publish(&to_ros_goal(goal))
            .map_err(|e| MapGoalsError::Publish(e.to_string()))
    }

    fn send_goal_request(&self, point: &core_msgs::Point) -> prometheus_map_goals::Result<()> {
        self.goal_request_publisher
            .publish(&to_ros_point(point))
            .map_err(|e| MapGoalsError::Publish(e.to_string()))
    }
}

fn to_core_pose(pose: &Pose) -> core_msgs::Pose {
    core_msgs::Pose {
        position: to_core_point(&pose.position),
        orientation: core_msgs::Quaternion {
            x: pose.orientation.x,
            y: pose.orientation.y,
            z: pose.orientation.z,
            w: pose.orientation.w,
        },
    }
}

fn to_core_point(point: &Point) -> core_msgs::Point {
    core_msgs::Point::new(point.x, point.y, point.z)
}

fn to_core_time(time: &Time) -> core_msgs::Time {
    core_msgs::Time {
        sec: time.sec,
        nanosec: time.nanosec,
    }
}

fn to_core_grid(msg: &OccupancyGrid) -> core_msgs::OccupancyGrid {
    core_msgs::OccupancyGrid {
        header: core_msgs::Header {
            stamp: to_core_time(&msg.header.stamp),
            frame_id: msg.header.frame_id.clone(),
        },
        info: core_msgs::MapMetaData {
            map_load_time: to_core_time(&msg.info.map_load_time),
            resolution: msg.info.resolution,
            width: msg.info.width,
            height: msg.info.height,
            origin: to_core_pose(&msg.info.origin),
        },
        data: msg.data.clone(),
    }
}

fn to_ros_point(point: &core_msgs::Point) -> Point {
    let mut msg = Point::default();
    msg.x = point.x;
    msg.y = point.y;
    msg.z = point.z;
    msg
}

fn to_ros_goal(goal: &NavigationGoal) -> PoseStamped {
    let mut header = Header::default();
    header.frame_id = goal.header.frame_id.clone();
    header.stamp = Time {
        sec: goal.header.stamp.sec,
        nanosec: goal.header.stamp.nanosec,
    };

    let mut orientation = Quaternion::default();
    orientation.x = goal.pose.orientation.x;
    orientation.y = goal.pose.orientation.y;
    orientation.z = goal.pose.orientation.z;
    orientation.w = goal.pose.orientation.w;

    let mut msg = PoseStamped::default();
    msg.header = header;
    msg.pose.position = to_ros_point(&goal.pose.position);
    msg.pose.orientation = orientation;
    msg
}

/// Keeps subscriptions alive and stops the loop thread on drop
struct MapGoalsRosNode {
    _map_subscription: Arc<rclrs::Subscription<OccupancyGrid>>,
    _goal_response_subscription: Arc<rclrs::Subscription<Point>>,
    running: Arc<AtomicBool>,
}

impl MapGoalsRosNode {
    fn new(executor: &rclrs::Executor, name: &str, config: &MapGoalsConfig) -> Result<Self> {
        let node = executor.create_node(name)?;
        let qos = QOS_PROFILE_DEFAULT.keep_last(config.topics.history_depth());

        let sink = RosGoalSink {
            goal_publisher: node
                .create_publisher::<PoseStamped>(&config.topics.goal, qos)?,
            goal_request_publisher: node
                .create_publisher::<Point>(&config.topics.goal_request, qos)?,
        };

        let core = Arc::new(Mutex::new(MapGoalsNode::new(config, sink)));

        let core_clone = Arc::clone(&core);
        let map_subscription = node.create_subscription::<OccupancyGrid, _>(
            &config.topics.map,
            qos,
            move |msg: OccupancyGrid| {
                match core_clone.lock() {
                    Ok(mut core) => core.on_map(&to_core_grid(&msg)),
                    Err(_) => warn!("Map goals core lock poisoned, dropping map"),
                }
            },
        )?;

        let core_clone = Arc::clone(&core);
        let goal_response_subscription = node.create_subscription::<Point, _>(
            &config.topics.goal_response,
            qos,
            move |msg: Point| {
                match core_clone.lock() {
                    Ok(core) => {
                        let _ = core.on_goal_response(to_core_point(&msg));
                    }
                    Err(_) => warn!("Map goals core lock poisoned, dropping goal response"),
                }
            },
        )?;

        // Loop thread: the first cycle sends the startup goal request
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);
        let loop_period = config.loop_period();
        thread::spawn(move || {
            while running_clone.load(Ordering::Relaxed) {
                match core.lock() {
                    Ok(mut core) => core.on_tick(),
                    Err(_) => warn!("Map goals core lock poisoned"),
                }
                thread::sleep(loop_period);
            }
        });

        Ok(MapGoalsRosNode {
            _map_subscription: map_subscription,
            _goal_response_subscription: goal_response_subscription,
            running,
        })
    }
}

impl Drop for MapGoalsRosNode {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn main() -> Result<(), Error> {
    init_tracing("prometheus_map_goals=info,map_goals=info");

    // first non-flag argument is a config file; ROS arguments follow --ros-args
    let config = match std::env::args().nth(1).filter(|a| !a.starts_with("--")) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            MapGoalsConfig::load(Path::new(&path))?
        }
        None => MapGoalsConfig::default(),
    };

    let mut executor = Context::default_from_env()?.create_basic_executor();
    let _node = MapGoalsRosNode::new(&executor, "map_goals", &config)?;

    info!(
        "Map goals node listening on '{}' and '{}'",
        config.topics.map, config.topics.goal_response
    );

    executor
        .spin(SpinOptions::default())
        .first_error()
        .map_err(|err| err.into())
}
