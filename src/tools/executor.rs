//! 动作执行器
//!
//! 持有 Desktop 与全局超时，execute(name, args) 把调用解析为 DesktopAction 并在超时内执行；
//! 从不返回错误：未知工具、参数错误、超时、桌面故障都转为描述性文本交给模型自行纠正。
//! 每次调用输出结构化审计日志（JSON）。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::action::DesktopAction;
use crate::tools::desktop::Desktop;

pub const SAVE_FILE_REFUSAL: &str = "ERROR: You cannot save files directly. YOU MUST USE THE UI (File > Save As, or Ctrl+S). This is a Windows Desktop Agent, not a backend script.";

pub struct ActionExecutor {
    desktop: Arc<dyn Desktop>,
    /// get_app_hotkeys 询问的本地模型；未配置时该工具返回错误文本
    hotkey_advisor: Option<Arc<dyn LlmClient>>,
    home_dir: Option<PathBuf>,
    timeout: Duration,
    recovery: RecoveryEngine,
}

impl ActionExecutor {
    pub fn new(desktop: Arc<dyn Desktop>, timeout_secs: u64) -> Self {
        Self {
            desktop,
            hotkey_advisor: None,
            home_dir: home_dir(),
            timeout: Duration::from_secs(timeout_secs),
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn with_hotkey_advisor(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.hotkey_advisor = Some(llm);
        self
    }

    pub fn with_home_dir(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self
    }

    pub fn desktop(&self) -> &Arc<dyn Desktop> {
        &self.desktop
    }

    /// 执行并返回文本结果；失败同样以文本返回
    pub async fn execute(&self, name: &str, args: &Value) -> String {
        match self.try_execute(name, args).await {
            Ok(output) => output,
            Err(e) => match self.recovery.handle(&e) {
                RecoveryAction::Observe(msg) | RecoveryAction::SkipCall(msg) => msg,
                _ => format!("Error executing {}: {}", name, e),
            },
        }
    }

    /// 执行并保留错误类型；超时返回 ToolTimeout
    pub async fn try_execute(&self, name: &str, args: &Value) -> Result<String, AgentError> {
        let start = Instant::now();
        let result = match DesktopAction::from_call(name, args) {
            Ok(action) => match timeout(self.timeout, self.dispatch(action)).await {
                Ok(r) => r,
                Err(_) => Err(AgentError::ToolTimeout(name.to_string())),
            },
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AgentError::ToolNotFound(_)) => "not_found",
            Err(AgentError::ToolTimeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        result
    }

    async fn dispatch(&self, action: DesktopAction) -> Result<String, AgentError> {
        let name = action.name().to_string();
        let failed = |e: AgentError| AgentError::ToolExecutionError {
            tool: name.clone(),
            reason: e.to_string(),
        };
        match action {
            DesktopAction::GetScreenTextMap => self.desktop.screen_text_map().await.map_err(failed),
            DesktopAction::TypeText(args) => {
                self.desktop
                    .type_text(&args.text, args.press_enter)
                    .await
                    .map_err(failed)?;
                Ok(format!("Typed '{}'", args.text))
            }
            DesktopAction::OpenApp(args) => {
                self.desktop.open_app(&args.app_name).await.map_err(failed)?;
                Ok(format!("Launched {}", args.app_name))
            }
            DesktopAction::ClickElement(args) => {
                self.desktop
                    .click(args.x, args.y, args.double_click)
                    .await
                    .map_err(failed)?;
                Ok(format!("Clicked at ({}, {})", args.x, args.y))
            }
            DesktopAction::PressHotkey(args) => {
                let keys: Vec<String> = args
                    .key_combo
                    .split('+')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect();
                if keys.is_empty() {
                    return Err(AgentError::ToolExecutionError {
                        tool: name.clone(),
                        reason: "empty key combo".to_string(),
                    });
                }
                self.desktop.press_keys(&keys).await.map_err(failed)?;
                Ok(format!("Pressed shortcut: {}", args.key_combo))
            }
            DesktopAction::GetUserFolderPath(args) => {
                let home = self.home_dir.as_ref().ok_or_else(|| AgentError::ToolExecutionError {
                    tool: name.clone(),
                    reason: "home directory unknown".into(),
                })?;
                Ok(home.join(&args.folder_name).display().to_string())
            }
            DesktopAction::GetAppHotkeys(args) => {
                let llm = self.hotkey_advisor.as_ref().ok_or_else(|| AgentError::ToolExecutionError {
                    tool: name.clone(),
                    reason: "no hotkey advisor configured".into(),
                })?;
                let prompt = format!(
                    "List top 5 Windows keyboard shortcuts for '{}'. Return ONLY the list.",
                    args.app_name
                );
                llm.complete(&[Message::user(prompt)])
                    .await
                    .map_err(|e| AgentError::ToolExecutionError {
                        tool: name.clone(),
                        reason: e.to_string(),
                    })
            }
            DesktopAction::SaveFile(_) => Ok(SAVE_FILE_REFUSAL.to_string()),
            DesktopAction::Unknown(name) => Err(AgentError::ToolNotFound(name)),
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::desktop::{DryRunDesktop, ScreenElement};
    use serde_json::json;

    fn executor() -> (ActionExecutor, Arc<DryRunDesktop>) {
        let desktop = Arc::new(DryRunDesktop::with_elements(vec![ScreenElement::new(
            "Save", "Button",
        )]));
        let exec = ActionExecutor::new(desktop.clone(), 5).with_home_dir("/home/agent");
        (exec, desktop)
    }

    #[tokio::test]
    async fn test_execute_dispatches_to_desktop() {
        let (exec, desktop) = executor();
        assert_eq!(
            exec.execute("open_app", &json!({"app_name": "notepad"})).await,
            "Launched notepad"
        );
        assert_eq!(
            exec.execute("press_hotkey", &json!({"key_combo": "ctrl+s"})).await,
            "Pressed shortcut: ctrl+s"
        );
        assert_eq!(desktop.actions(), vec!["open_app notepad", "press_keys ctrl+s"]);
        assert_eq!(
            exec.execute("get_screen_text_map", &json!({})).await,
            "ID:0 | Name:'Save' | Type:Button"
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_text() {
        let (exec, desktop) = executor();
        assert_eq!(
            exec.execute("launch_rocket", &json!({})).await,
            "Error: Function launch_rocket not found."
        );
        assert!(desktop.actions().is_empty());
    }

    #[tokio::test]
    async fn test_bad_args_is_text() {
        let (exec, _) = executor();
        let out = exec.execute("type_text", &json!({"txt": "x"})).await;
        assert!(out.starts_with("Error executing type_text:"), "{}", out);
    }

    #[tokio::test]
    async fn test_empty_key_combo_is_tool_error() {
        let (exec, desktop) = executor();
        let out = exec.execute("press_hotkey", &json!({"key_combo": " + "})).await;
        assert_eq!(out, "Error executing press_hotkey: empty key combo");
        assert!(desktop.actions().is_empty());
    }

    #[tokio::test]
    async fn test_folder_path_and_decoy() {
        let (exec, desktop) = executor();
        let path = exec
            .execute("get_user_folder_path", &json!({"folder_name": "Desktop"}))
            .await;
        assert_eq!(PathBuf::from(path), PathBuf::from("/home/agent/Desktop"));
        assert_eq!(
            exec.execute("save_file", &json!({"filename": "a.txt"})).await,
            SAVE_FILE_REFUSAL
        );
        assert!(desktop.actions().is_empty());
    }

    #[tokio::test]
    async fn test_app_hotkeys_asks_advisor() {
        let (exec, _) = executor();
        let advisor = Arc::new(ScriptedLlmClient::from_replies(["1. Ctrl+S - Save"]));
        let exec = exec.with_hotkey_advisor(advisor.clone());
        let out = exec.execute("get_app_hotkeys", &json!({"app_name": "Notepad"})).await;
        assert_eq!(out, "1. Ctrl+S - Save");
        let prompt = advisor.call(0).unwrap();
        assert!(prompt[0].content.contains("'Notepad'"));
    }
}
