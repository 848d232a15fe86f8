//! 任务状态机：Running / AwaitingBackoff / Completed / Aborted
//!
//! 控制循环持有 MissionState；结束时投影为 MissionReport（最终状态行、轮数、冷却次数等）。

use serde::Serialize;

/// 控制循环状态
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum MissionState {
    Running,
    AwaitingBackoff,
    Completed,
    Aborted(AbortReason),
}

impl MissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionState::Completed | MissionState::Aborted(_))
    }
}

/// 终止原因
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum AbortReason {
    /// 轮数用尽仍未看到完成标记（软停止）
    TurnBudgetExhausted,
    /// 外部急停
    EmergencyStop,
    /// 截屏 / 推理 / 分发出现未归类故障
    Fatal(String),
}

/// 任务结束时的汇总
#[derive(Clone, Debug, Serialize)]
pub struct MissionReport {
    pub session_id: String,
    pub state: MissionState,
    /// 实际完成的轮数（限流重试不重复计数）
    pub turns: usize,
    pub backoffs: usize,
    pub tool_calls: usize,
    pub last_reply: String,
}

impl MissionReport {
    /// 最终状态行
    pub fn status_line(&self) -> String {
        match &self.state {
            MissionState::Completed => format!(
                "MISSION END: Completed after {} turn(s), {} tool call(s)",
                self.turns, self.tool_calls
            ),
            MissionState::Aborted(AbortReason::TurnBudgetExhausted) => format!(
                "MISSION END: Aborted, turn budget exhausted after {} turn(s)",
                self.turns
            ),
            MissionState::Aborted(AbortReason::EmergencyStop) => format!(
                "MISSION END: Aborted by emergency stop at turn {}",
                self.turns + 1
            ),
            MissionState::Aborted(AbortReason::Fatal(e)) => {
                format!("MISSION END: Aborted at turn {}: {}", self.turns + 1, e)
            }
            // 非终态不会出现在报告中
            other => format!("MISSION END: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: MissionState) -> MissionReport {
        MissionReport {
            session_id: "s1".to_string(),
            state,
            turns: 3,
            backoffs: 0,
            tool_calls: 2,
            last_reply: String::new(),
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(MissionState::Completed.is_terminal());
        assert!(MissionState::Aborted(AbortReason::EmergencyStop).is_terminal());
        assert!(!MissionState::Running.is_terminal());
        assert!(!MissionState::AwaitingBackoff.is_terminal());
    }

    #[test]
    fn test_status_line() {
        let line = report(MissionState::Completed).status_line();
        assert!(line.contains("Completed after 3 turn(s)"));
        let line = report(MissionState::Aborted(AbortReason::TurnBudgetExhausted)).status_line();
        assert!(line.contains("turn budget exhausted"));
        let line = report(MissionState::Aborted(AbortReason::Fatal("boom".into()))).status_line();
        assert!(line.ends_with("boom"));
    }
}
