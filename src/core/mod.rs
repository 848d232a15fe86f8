//! 核心层：错误与恢复、任务状态机、急停

pub mod error;
pub mod recovery;
pub mod shutdown;
pub mod state;

pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use shutdown::{EmergencyStop, StopReason};
pub use state::{AbortReason, MissionReport, MissionState};
