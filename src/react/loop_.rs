//! 任务控制循环
//!
//! Observe (屏幕) -> Plan (LLM) -> Act (工具调用块) -> Log (情景记忆)，轮与轮之间等待固定的 settle delay。
//! 状态机 Running / AwaitingBackoff / Completed / Aborted：
//! - 限流：冷却后以同一轮次重试，不重复计数
//! - 工具调用块解析失败：跳过该块，错误写回对话
//! - 未知工具 / 工具失败：作为普通观察写回，由模型自行纠正
//! - 其它故障或急停：立即 Aborted
//! 可选 event_tx：推送 TurnStarted / Thinking / Reply / ToolCall / Observation 等事件。

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AbortReason, AgentError, MissionReport, MissionState, RecoveryAction, RecoveryEngine};
use crate::memory::{EpisodicMemory, Message, ShortTermBuffer, StatsScope, Transcript};
use crate::react::planner::{goal_message, observation_message, tool_output_message, Planner};
use crate::react::MissionEvent;
use crate::tools::{parse_tool_calls, ActionExecutor};

pub const DEFAULT_MAX_TURNS: usize = 15;
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 5;
pub const DEFAULT_RATE_LIMIT_COOLDOWN_SECS: u64 = 60;
pub const DEFAULT_COMPLETION_TOKEN: &str = "MISSION COMPLETE";
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct MissionConfig {
    pub max_turns: usize,
    /// 两轮之间等待 UI 稳定
    pub settle_delay: Duration,
    pub rate_limit_cooldown: Duration,
    pub completion_token: String,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_DELAY_SECS),
            rate_limit_cooldown: Duration::from_secs(DEFAULT_RATE_LIMIT_COOLDOWN_SECS),
            completion_token: DEFAULT_COMPLETION_TOKEN.to_string(),
        }
    }
}

/// 单次任务的协作者与配置
pub struct MissionSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ActionExecutor,
    pub memory: &'a EpisodicMemory,
    pub recovery: &'a RecoveryEngine,
    /// 急停令牌：触发后放弃当前轮并以 Aborted 结束
    pub cancel_token: CancellationToken,
    pub event_tx: Option<&'a UnboundedSender<MissionEvent>>,
    pub config: MissionConfig,
    /// 图谱中的会话标识
    pub session_id: String,
}

impl<'a> MissionSession<'a> {
    pub fn new(
        planner: &'a Planner,
        executor: &'a ActionExecutor,
        memory: &'a EpisodicMemory,
        recovery: &'a RecoveryEngine,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            planner,
            executor,
            memory,
            recovery,
            cancel_token,
            event_tx: None,
            config: MissionConfig::default(),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<MissionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_config(mut self, config: MissionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    fn send_event(&self, ev: MissionEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

enum TurnOutcome {
    Continue,
    Completed,
}

/// 单次任务的可变状态，生命周期与任务相同
struct MissionRun {
    transcript: Transcript,
    buffer: ShortTermBuffer,
    /// 已写入图谱的步号
    step: u64,
    tool_calls: usize,
    last_reply: String,
}

/// 执行一次任务，总是以 Completed 或 Aborted 结束
pub async fn run_mission(session: &MissionSession<'_>, goal: &str) -> MissionReport {
    let config = &session.config;
    let memory = session.memory;
    tracing::info!(session_id = %session.session_id, goal, "mission started");

    let context = memory
        .retrieve_context(memory.user_id(), goal, memory.config().retrieve_limit)
        .await;
    tracing::info!(fragments = context.len(), "retrieved context");

    let mut run = MissionRun {
        transcript: Transcript::new(),
        buffer: ShortTermBuffer::new(memory.config().buffer_threshold),
        step: 0,
        tool_calls: 0,
        last_reply: String::new(),
    };
    run.transcript.push(goal_message(goal, &context));

    let mut state = MissionState::Running;
    let mut turn = 0usize;
    let mut backoffs = 0usize;

    while !state.is_terminal() {
        if state == MissionState::AwaitingBackoff {
            session.send_event(MissionEvent::Backoff {
                turn: turn + 1,
                cooldown_secs: config.rate_limit_cooldown.as_secs(),
            });
            tracing::warn!(turn = turn + 1, cooldown = ?config.rate_limit_cooldown, "rate limited, cooling down");
            state = if pause(&session.cancel_token, config.rate_limit_cooldown).await {
                MissionState::Running
            } else {
                MissionState::Aborted(AbortReason::EmergencyStop)
            };
            continue;
        }

        if session.cancel_token.is_cancelled() {
            state = MissionState::Aborted(AbortReason::EmergencyStop);
            break;
        }
        if turn >= config.max_turns {
            tracing::warn!(max_turns = config.max_turns, "turn budget exhausted");
            state = MissionState::Aborted(AbortReason::TurnBudgetExhausted);
            break;
        }

        match run_turn(session, &mut run, turn).await {
            Ok(TurnOutcome::Completed) => {
                turn += 1;
                tracing::info!(turn, "agent indicated task completion");
                state = MissionState::Completed;
            }
            Ok(TurnOutcome::Continue) => {
                turn += 1;
                tracing::debug!(delay = ?config.settle_delay, "settling");
                if !pause(&session.cancel_token, config.settle_delay).await {
                    state = MissionState::Aborted(AbortReason::EmergencyStop);
                }
            }
            Err(AgentError::Cancelled) => {
                state = MissionState::Aborted(AbortReason::EmergencyStop);
            }
            Err(e) => match session.recovery.handle(&e) {
                RecoveryAction::Backoff => {
                    backoffs += 1;
                    state = MissionState::AwaitingBackoff;
                }
                _ => {
                    tracing::error!(turn = turn + 1, error = %e, "mission aborted");
                    state = MissionState::Aborted(AbortReason::Fatal(e.to_string()));
                }
            },
        }
    }

    match &state {
        MissionState::Completed => session.send_event(MissionEvent::Completed { turns: turn }),
        MissionState::Aborted(reason) => session.send_event(MissionEvent::Aborted {
            reason: format!("{:?}", reason),
        }),
        _ => {}
    }

    let report = MissionReport {
        session_id: session.session_id.clone(),
        state,
        turns: turn,
        backoffs,
        tool_calls: run.tool_calls,
        last_reply: run.last_reply,
    };
    let stats = memory.get_stats(StatsScope::Session(&session.session_id));
    tracing::info!(
        session_id = %report.session_id,
        nodes = stats.node_count,
        relationships = stats.relationship_count,
        "{}",
        report.status_line()
    );
    report
}

/// 单轮：截屏 -> 规划 -> 分发 -> 记录；返回是否看到完成标记
async fn run_turn(
    session: &MissionSession<'_>,
    run: &mut MissionRun,
    turn: usize,
) -> Result<TurnOutcome, AgentError> {
    let cancel = &session.cancel_token;
    session.send_event(MissionEvent::TurnStarted {
        turn: turn + 1,
        max_turns: session.config.max_turns,
    });
    tracing::info!(turn = turn + 1, "observing & thinking");

    let screen = session
        .executor
        .desktop()
        .screen_text_map()
        .await
        .map_err(|e| AgentError::FatalLoopError(format!("screen snapshot failed: {}", e)))?;
    run.transcript.push(observation_message(&screen));

    session.send_event(MissionEvent::Thinking);
    let planned = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        r = session.planner.plan(run.transcript.messages()) => r,
    };
    let reply = match planned {
        Ok(r) => r,
        Err(e) => {
            // 撤回本轮观察，重试时重新截屏
            run.transcript.pop();
            return Err(e);
        }
    };
    tracing::info!(turn = turn + 1, reply = %reply, "agent reply");
    session.send_event(MissionEvent::Reply { text: reply.clone() });
    run.transcript.push(Message::assistant(reply.clone()));
    run.last_reply = reply.clone();

    run.buffer.push(format!("Response: {}", reply));
    log_step(session, run, "thought", &reply).await;
    if run.buffer.needs_pruning() {
        let before = run.buffer.len();
        let pruned = session.memory.prune_buffer(run.buffer.take()).await;
        run.buffer.replace(pruned);
        if run.buffer.len() != before {
            session.send_event(MissionEvent::Pruned {
                before,
                after: run.buffer.len(),
            });
        }
    }

    let calls = parse_tool_calls(&reply);
    if !calls.is_empty() {
        tracing::info!(count = calls.len(), "detected tool calls");
    }
    for call in calls {
        let call = match call {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed tool call");
                if let AgentError::ParseError { tool, reason } = &e {
                    session.send_event(MissionEvent::ParseFailure {
                        tool: tool.clone(),
                        reason: reason.clone(),
                    });
                }
                match session.recovery.handle(&e) {
                    RecoveryAction::SkipCall(msg) | RecoveryAction::Observe(msg) => {
                        run.transcript.push(Message::user(msg));
                    }
                    RecoveryAction::Abort => return Err(e),
                    RecoveryAction::Backoff | RecoveryAction::Defer => {}
                }
                continue;
            }
        };

        session.send_event(MissionEvent::ToolCall {
            tool: call.name.clone(),
            args: call.args.clone(),
        });
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            out = session.executor.execute(&call.name, &call.args) => out,
        };
        run.tool_calls += 1;
        tracing::info!(tool = %call.name, output = %output, "tool output");
        session.send_event(MissionEvent::Observation {
            tool: call.name.clone(),
            preview: preview(&output),
        });
        run.transcript.push(tool_output_message(&call.name, &output));
        let description = format!("{} {} -> {}", call.name, call.args, output);
        log_step(session, run, "tool_call", &description).await;
    }

    let done = run
        .transcript
        .last()
        .map(|m| m.content.contains(&session.config.completion_token))
        .unwrap_or(false);
    Ok(if done {
        TurnOutcome::Completed
    } else {
        TurnOutcome::Continue
    })
}

/// 写图谱失败不影响任务
async fn log_step(session: &MissionSession<'_>, run: &mut MissionRun, action_type: &str, description: &str) {
    let next = run.step + 1;
    match session
        .memory
        .log_step(&session.session_id, next, action_type, description)
        .await
    {
        Ok(()) => run.step = next,
        Err(e) => {
            if session.recovery.handle(&e) != RecoveryAction::Defer {
                tracing::warn!(error = %e, "unexpected step logging error");
            }
        }
    }
}

/// 等待指定时长；急停返回 false
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}
