//! 控制层：Planner（prompt 拼装与推理调用）、任务控制循环、过程事件

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::MissionEvent;
pub use loop_::{run_mission, MissionConfig, MissionSession};
pub use planner::{default_system_prompt, goal_message, observation_message, Planner};
