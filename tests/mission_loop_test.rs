//! 控制循环集成测试：脚本化推理服务 + 只记录动作的桌面，时间暂停以断言停顿与冷却

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bee_desk::core::{AbortReason, AgentError, MissionReport, MissionState, RecoveryEngine};
    use bee_desk::llm::{LlmError, LlmSummarizer, ScriptedLlmClient};
    use bee_desk::memory::{
        ChainNode, EpisodicMemory, InMemoryGraphStore, InMemoryVectorStore, Message, Role,
    };
    use bee_desk::react::{run_mission, MissionConfig, MissionEvent, MissionSession, Planner};
    use bee_desk::tools::{ActionExecutor, Desktop, DryRunDesktop, ScreenElement};
    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    const DONE: &str = "The file is visibly saved. MISSION COMPLETE";

    struct Harness {
        llm: Arc<ScriptedLlmClient>,
        desktop: Arc<DryRunDesktop>,
        vectors: Arc<InMemoryVectorStore>,
        planner: Planner,
        executor: ActionExecutor,
        memory: EpisodicMemory,
        recovery: RecoveryEngine,
    }

    fn harness_with_desktop(
        script: Vec<Result<String, LlmError>>,
        desktop: Arc<dyn Desktop>,
        dry_run: Arc<DryRunDesktop>,
    ) -> Harness {
        let llm = Arc::new(ScriptedLlmClient::new(script).with_fallback("Still working on it."));
        let summarizer_llm = Arc::new(
            ScriptedLlmClient::from_replies(Vec::<String>::new())
                .with_fallback("Opened Notepad and typed the text."),
        );
        let vectors = Arc::new(InMemoryVectorStore::default());
        let memory = EpisodicMemory::new(
            Arc::new(InMemoryGraphStore::new()),
            vectors.clone(),
            Arc::new(LlmSummarizer::new(summarizer_llm)),
            "demo_agent",
        );
        Harness {
            llm: llm.clone(),
            desktop: dry_run,
            vectors,
            planner: Planner::new(llm, "SYSTEM"),
            executor: ActionExecutor::new(desktop, 30).with_home_dir("/home/agent"),
            memory,
            recovery: RecoveryEngine::new(),
        }
    }

    fn harness(script: Vec<Result<String, LlmError>>) -> Harness {
        let desktop = Arc::new(DryRunDesktop::with_elements(vec![
            ScreenElement::new("Untitled - Notepad", "Window"),
            ScreenElement::new("Text Editor", "Document"),
        ]));
        harness_with_desktop(script, desktop.clone(), desktop)
    }

    fn replies(rs: &[&str]) -> Vec<Result<String, LlmError>> {
        rs.iter().map(|r| Ok(r.to_string())).collect()
    }

    async fn run(h: &Harness, config: MissionConfig, cancel: CancellationToken) -> MissionReport {
        let session = MissionSession::new(&h.planner, &h.executor, &h.memory, &h.recovery, cancel)
            .with_config(config)
            .with_session_id("mission-test");
        run_mission(&session, "Open Notepad and save a file").await
    }

    fn user_contents(messages: &[Message]) -> Vec<String> {
        messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_without_calls_goes_to_next_turn() {
        let h = harness(replies(&["Let me look at the screen first.", DONE]));
        let start = Instant::now();
        let report = run(&h, MissionConfig::default(), CancellationToken::new()).await;

        assert_eq!(report.state, MissionState::Completed);
        assert_eq!(report.turns, 2);
        assert_eq!(report.tool_calls, 0);
        assert!(h.desktop.actions().is_empty());
        assert_eq!(h.llm.call_count(), 2);
        // 只有第一轮之后的一次停顿
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_layout() {
        let h = harness(replies(&[DONE]));
        run(&h, MissionConfig::default(), CancellationToken::new()).await;

        let sent = h.llm.call(0).unwrap();
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(
            sent[1].content,
            "GOAL: Open Notepad and save a file. \nCONTEXT: No prior knowledge."
        );
        assert!(sent[2].content.starts_with("--- CURRENT SCREEN STATE"));
        assert!(sent[2]
            .content
            .contains("ID:0 | Name:'Untitled - Notepad' | Type:Window"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_token_stops_before_settle() {
        let h = harness(replies(&[
            "<function=open_app>{\"app_name\": \"notepad\"}</function>",
            DONE,
        ]));
        let start = Instant::now();
        let report = run(&h, MissionConfig::default(), CancellationToken::new()).await;

        assert_eq!(report.state, MissionState::Completed);
        assert_eq!(report.turns, 2);
        assert_eq!(report.tool_calls, 1);
        assert_eq!(report.last_reply, DONE);
        assert_eq!(h.desktop.actions(), vec!["open_app notepad"]);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(report.status_line().contains("Completed after 2 turn(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_on_first_turn_has_no_delay() {
        let h = harness(replies(&["Nothing to do. MISSION COMPLETE"]));
        let start = Instant::now();
        let report = run(&h, MissionConfig::default(), CancellationToken::new()).await;
        assert_eq!(report.state, MissionState::Completed);
        assert_eq!(report.turns, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_same_turn() {
        let h = harness(vec![
            Err(LlmError::RateLimited { retry_after_ms: 0 }),
            Ok(DONE.to_string()),
        ]);
        let start = Instant::now();
        let report = run(&h, MissionConfig::default(), CancellationToken::new()).await;

        assert_eq!(report.state, MissionState::Completed);
        assert_eq!(report.turns, 1);
        assert_eq!(report.backoffs, 1);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        // 重试时不保留上一次的观察消息
        let retried = h.llm.call(1).unwrap();
        assert_eq!(retried.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_call_is_skipped() {
        let h = harness(replies(&[
            "<function=type_text>{text: oops}</function>\n<function=open_app>{\"app_name\": \"notepad\"}</function>",
            DONE,
        ]));
        let report = run(&h, MissionConfig::default(), CancellationToken::new()).await;

        assert_eq!(report.state, MissionState::Completed);
        assert_eq!(report.tool_calls, 1);
        assert_eq!(h.desktop.actions(), vec!["open_app notepad"]);
        let users = user_contents(&h.llm.call(1).unwrap());
        assert!(users.iter().any(|c| c.starts_with("Error executing type_text:")));
        assert!(users.iter().any(|c| c == "Tool 'open_app' Output: Launched notepad"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tool_becomes_observation() {
        let h = harness(replies(&["<function=save_everything>{}</function>", DONE]));
        let report = run(&h, MissionConfig::default(), CancellationToken::new()).await;

        assert_eq!(report.state, MissionState::Completed);
        let users = user_contents(&h.llm.call(1).unwrap());
        assert!(users
            .iter()
            .any(|c| c == "Tool 'save_everything' Output: Error: Function save_everything not found."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_budget_exhausted() {
        let h = harness(Vec::new());
        let config = MissionConfig {
            max_turns: 3,
            ..MissionConfig::default()
        };
        let start = Instant::now();
        let report = run(&h, config, CancellationToken::new()).await;

        assert_eq!(report.state, MissionState::Aborted(AbortReason::TurnBudgetExhausted));
        assert_eq!(report.turns, 3);
        assert_eq!(h.llm.call_count(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_llm_error_aborts() {
        let h = harness(vec![Err(LlmError::Api("invalid api key".into()))]);
        let report = run(&h, MissionConfig::default(), CancellationToken::new()).await;

        match &report.state {
            MissionState::Aborted(AbortReason::Fatal(msg)) => assert!(msg.contains("invalid api key")),
            other => panic!("unexpected state {:?}", other),
        }
        assert_eq!(report.turns, 0);
        assert_eq!(h.llm.call_count(), 1);
    }

    struct BrokenScreen;

    #[async_trait]
    impl Desktop for BrokenScreen {
        async fn scan(&self) -> Result<Vec<ScreenElement>, AgentError> {
            Err(AgentError::ToolExecutionError {
                tool: "scan".into(),
                reason: "no foreground window".into(),
            })
        }

        async fn open_app(&self, _app_name: &str) -> Result<(), AgentError> {
            Ok(())
        }

        async fn type_text(&self, _text: &str, _press_enter: bool) -> Result<(), AgentError> {
            Ok(())
        }

        async fn click(&self, _x: i32, _y: i32, _double_click: bool) -> Result<(), AgentError> {
            Ok(())
        }

        async fn press_keys(&self, _keys: &[String]) -> Result<(), AgentError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_failure_aborts() {
        let h = harness_with_desktop(
            replies(&[DONE]),
            Arc::new(BrokenScreen),
            Arc::new(DryRunDesktop::new()),
        );
        let report = run(&h, MissionConfig::default(), CancellationToken::new()).await;
        assert!(matches!(report.state, MissionState::Aborted(AbortReason::Fatal(_))));
        assert_eq!(h.llm.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_stop_before_start() {
        let h = harness(replies(&[DONE]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = run(&h, MissionConfig::default(), cancel).await;
        assert_eq!(report.state, MissionState::Aborted(AbortReason::EmergencyStop));
        assert_eq!(h.llm.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_stop_during_settle() {
        let h = harness(Vec::new());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });
        let start = Instant::now();
        let report = run(&h, MissionConfig::default(), cancel).await;

        assert_eq!(report.state, MissionState::Aborted(AbortReason::EmergencyStop));
        assert_eq!(report.turns, 1);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_pruned_and_summary_remembered() {
        let h = harness(replies(&["r1", "r2", "r3", "r4", "r5", "r6", DONE]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = MissionSession::new(
            &h.planner,
            &h.executor,
            &h.memory,
            &h.recovery,
            CancellationToken::new(),
        )
        .with_event_tx(&tx)
        .with_session_id("prune-test");
        let report = run_mission(&session, "Open Notepad").await;
        assert_eq!(report.state, MissionState::Completed);

        let mut pruned = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let MissionEvent::Pruned { before, after } = ev {
                pruned.push((before, after));
            }
        }
        assert_eq!(pruned, vec![(6, 2)]);
        assert_eq!(h.vectors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turns_logged_as_steps() {
        let h = harness(replies(&[
            "<function=press_hotkey>{\"key_combo\": \"ctrl+s\"}</function>",
            DONE,
        ]));
        run(&h, MissionConfig::default(), CancellationToken::new()).await;

        let timeline = h.memory.timeline("mission-test").unwrap();
        let kinds: Vec<(u64, String)> = timeline
            .iter()
            .map(|n| match n {
                ChainNode::Step(s) => (s.step_number, s.action_type.clone()),
                ChainNode::Summary(s) => panic!("unexpected summary {:?}", s),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                (1, "thought".to_string()),
                (2, "tool_call".to_string()),
                (3, "thought".to_string()),
            ]
        );
    }
}
