//! bee-desk：闭环桌面智能体
//!
//! 入口：初始化日志、加载配置、装配组件，对命令行给出的目标跑一次任务并打印最终状态行。
//! Ctrl+C / SIGTERM 作为急停。

use std::sync::Arc;

use anyhow::Context;
use bee_desk::agent::{create_mission_components, run};
use bee_desk::config::load_config;
use bee_desk::core::EmergencyStop;
use bee_desk::tools::DryRunDesktop;

const DEFAULT_GOAL: &str = "Open Notepad, type 'Reasoning Test', and save it to 'C:\\Users\\Public\\Documents\\reasoning_test.txt'.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bee_desk::observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let goal = if args.is_empty() {
        DEFAULT_GOAL.to_string()
    } else {
        args.join(" ")
    };

    let cfg = load_config(std::env::var("BEE_CONFIG").ok().map(Into::into))
        .context("Failed to load config")?;

    // 真实的 UI 自动化在进程外部，这里只记录动作
    let desktop = Arc::new(DryRunDesktop::new());
    let components = create_mission_components(&cfg, desktop.clone())
        .context("Failed to create mission components")?;

    let stop = Arc::new(EmergencyStop::new());
    stop.install_signal_handlers();

    let report = run(&components, &goal, stop.token(), None).await;
    tracing::info!(actions = desktop.actions().len(), "dry-run desktop actions recorded");
    println!("{}", report.status_line());
    Ok(())
}
