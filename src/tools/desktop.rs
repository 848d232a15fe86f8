//! 桌面自动化原语
//!
//! 真正的 UI 扫描与键鼠注入在进程外部实现，这里只定义接口 Desktop 与一个只记录动作的 DryRunDesktop
//! （二进制默认使用，测试里用来断言分发结果）。

use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::AgentError;

/// 屏幕文字图最多扫描的元素数
pub const MAX_SCREEN_ELEMENTS: usize = 50;

pub const NO_ELEMENTS: &str = "No interactable elements found.";

/// 前台窗口中的一个控件
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenElement {
    pub name: String,
    pub control_type: String,
    pub offscreen: bool,
}

impl ScreenElement {
    pub fn new(name: impl Into<String>, control_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            control_type: control_type.into(),
            offscreen: false,
        }
    }
}

/// 渲染为 `ID:{i} | Name:'{name}' | Type:{type}`；无名或不可见控件跳过但保留序号
pub fn render_screen_map(elements: &[ScreenElement]) -> String {
    let lines: Vec<String> = elements
        .iter()
        .take(MAX_SCREEN_ELEMENTS)
        .enumerate()
        .filter(|(_, e)| !e.name.is_empty() && !e.offscreen)
        .map(|(i, e)| format!("ID:{} | Name:'{}' | Type:{}", i, e.name, e.control_type))
        .collect();
    if lines.is_empty() {
        NO_ELEMENTS.to_string()
    } else {
        lines.join("\n")
    }
}

#[async_trait]
pub trait Desktop: Send + Sync {
    /// 扫描前台窗口的控件
    async fn scan(&self) -> Result<Vec<ScreenElement>, AgentError>;

    async fn open_app(&self, app_name: &str) -> Result<(), AgentError>;

    async fn type_text(&self, text: &str, press_enter: bool) -> Result<(), AgentError>;

    async fn click(&self, x: i32, y: i32, double_click: bool) -> Result<(), AgentError>;

    async fn press_keys(&self, keys: &[String]) -> Result<(), AgentError>;

    async fn screen_text_map(&self) -> Result<String, AgentError> {
        Ok(render_screen_map(&self.scan().await?))
    }
}

/// 只记录动作、不触碰真实桌面
#[derive(Default)]
pub struct DryRunDesktop {
    elements: Mutex<Vec<ScreenElement>>,
    actions: Mutex<Vec<String>>,
}

impl DryRunDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elements(elements: Vec<ScreenElement>) -> Self {
        Self {
            elements: Mutex::new(elements),
            actions: Mutex::new(Vec::new()),
        }
    }

    /// 已执行动作的记录，如 `open_app notepad`
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn record(&self, action: String) -> Result<(), AgentError> {
        tracing::debug!(action = %action, "dry-run desktop");
        self.actions
            .lock()
            .map_err(|_| AgentError::FatalLoopError("desktop action log poisoned".into()))?
            .push(action);
        Ok(())
    }
}

#[async_trait]
impl Desktop for DryRunDesktop {
    async fn scan(&self) -> Result<Vec<ScreenElement>, AgentError> {
        self.elements
            .lock()
            .map(|e| e.clone())
            .map_err(|_| AgentError::FatalLoopError("desktop elements poisoned".into()))
    }

    async fn open_app(&self, app_name: &str) -> Result<(), AgentError> {
        self.record(format!("open_app {}", app_name))
    }

    async fn type_text(&self, text: &str, press_enter: bool) -> Result<(), AgentError> {
        let suffix = if press_enter { " +enter" } else { "" };
        self.record(format!("type_text {}{}", text, suffix))
    }

    async fn click(&self, x: i32, y: i32, double_click: bool) -> Result<(), AgentError> {
        let kind = if double_click { "double_click" } else { "click" };
        self.record(format!("{} {},{}", kind, x, y))
    }

    async fn press_keys(&self, keys: &[String]) -> Result<(), AgentError> {
        self.record(format!("press_keys {}", keys.join("+")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_screen_map_format() {
        let mut hidden = ScreenElement::new("Hidden", "Button");
        hidden.offscreen = true;
        let elements = vec![
            ScreenElement::new("File", "MenuItem"),
            ScreenElement::new("", "Pane"),
            hidden,
            ScreenElement::new("Text Editor", "Document"),
        ];
        assert_eq!(
            render_screen_map(&elements),
            "ID:0 | Name:'File' | Type:MenuItem\nID:3 | Name:'Text Editor' | Type:Document"
        );
    }

    #[test]
    fn test_render_screen_map_empty_and_capped() {
        assert_eq!(render_screen_map(&[]), NO_ELEMENTS);
        let many: Vec<_> = (0..80)
            .map(|i| ScreenElement::new(format!("e{}", i), "Button"))
            .collect();
        assert_eq!(render_screen_map(&many).lines().count(), MAX_SCREEN_ELEMENTS);
    }

    #[tokio::test]
    async fn test_dry_run_records_actions() {
        let d = DryRunDesktop::new();
        d.open_app("notepad").await.unwrap();
        d.press_keys(&["ctrl".into(), "s".into()]).await.unwrap();
        assert_eq!(d.actions(), vec!["open_app notepad", "press_keys ctrl+s"]);
        assert_eq!(d.screen_text_map().await.unwrap(), NO_ELEMENTS);
    }
}
