//! 桌面动作目录
//!
//! 模型按名字调用工具，这里把 (name, args) 收敛为一个封闭的 DesktopAction：每个工具一个变体，参数是带
//! schemars Schema 的强类型结构体；未知名字落到 Unknown，由执行器作为普通观察返回给模型。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TypeTextArgs {
    /// Text to type into the focused window
    pub text: String,
    /// Press Enter after typing
    #[serde(default = "default_true")]
    pub press_enter: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AppArgs {
    /// Name of the app (e.g. notepad)
    pub app_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ClickArgs {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub double_click: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HotkeyArgs {
    /// Key combination (e.g. ctrl+s)
    pub key_combo: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FolderArgs {
    /// Folder name (e.g. Desktop, Documents)
    pub folder_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct SaveFileArgs {
    #[serde(default)]
    pub filename: Option<String>,
}

fn default_true() -> bool {
    true
}

/// 封闭的工具集合
#[derive(Debug, Clone, PartialEq)]
pub enum DesktopAction {
    GetScreenTextMap,
    TypeText(TypeTextArgs),
    OpenApp(AppArgs),
    ClickElement(ClickArgs),
    PressHotkey(HotkeyArgs),
    GetUserFolderPath(FolderArgs),
    GetAppHotkeys(AppArgs),
    /// 诱饵：模型常幻觉出直接保存文件的工具，统一回复“请走 UI”
    SaveFile(SaveFileArgs),
    Unknown(String),
}

impl DesktopAction {
    /// 按工具名解析参数；名字未知返回 Unknown，参数形状不符返回 ToolExecutionError
    pub fn from_call(name: &str, args: &Value) -> Result<Self, AgentError> {
        let action = match name {
            "get_screen_text_map" => {
                let _: NoArgs = parse_args(name, args)?;
                DesktopAction::GetScreenTextMap
            }
            "type_text" => DesktopAction::TypeText(parse_args(name, args)?),
            "open_app" => DesktopAction::OpenApp(parse_args(name, args)?),
            "click_element" => DesktopAction::ClickElement(parse_args(name, args)?),
            "press_hotkey" => DesktopAction::PressHotkey(parse_args(name, args)?),
            "get_user_folder_path" => DesktopAction::GetUserFolderPath(parse_args(name, args)?),
            "get_app_hotkeys" => DesktopAction::GetAppHotkeys(parse_args(name, args)?),
            "save_file" => DesktopAction::SaveFile(parse_args(name, args)?),
            other => DesktopAction::Unknown(other.to_string()),
        };
        Ok(action)
    }

    pub fn name(&self) -> &str {
        match self {
            DesktopAction::GetScreenTextMap => "get_screen_text_map",
            DesktopAction::TypeText(_) => "type_text",
            DesktopAction::OpenApp(_) => "open_app",
            DesktopAction::ClickElement(_) => "click_element",
            DesktopAction::PressHotkey(_) => "press_hotkey",
            DesktopAction::GetUserFolderPath(_) => "get_user_folder_path",
            DesktopAction::GetAppHotkeys(_) => "get_app_hotkeys",
            DesktopAction::SaveFile(_) => "save_file",
            DesktopAction::Unknown(name) => name,
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, AgentError> {
    // 无参工具允许模型传 null
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args.clone()
    };
    serde_json::from_value(args).map_err(|e| AgentError::ToolExecutionError {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

/// 目录条目：名字、描述、参数 Schema
pub struct CatalogEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null)
}

/// 供 system prompt 使用的工具目录
pub fn catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry {
            name: "get_screen_text_map",
            description: "Scans the active window for buttons/fields.",
            parameters: schema_value::<NoArgs>(),
        },
        CatalogEntry {
            name: "type_text",
            description: "Types text into the active window.",
            parameters: schema_value::<TypeTextArgs>(),
        },
        CatalogEntry {
            name: "open_app",
            description: "Launches an application (e.g. 'notepad').",
            parameters: schema_value::<AppArgs>(),
        },
        CatalogEntry {
            name: "click_element",
            description: "Moves the mouse and clicks at (x, y).",
            parameters: schema_value::<ClickArgs>(),
        },
        CatalogEntry {
            name: "press_hotkey",
            description: "Performs a keyboard shortcut (e.g. 'ctrl+s').",
            parameters: schema_value::<HotkeyArgs>(),
        },
        CatalogEntry {
            name: "get_user_folder_path",
            description: "Returns the absolute path to Desktop/Documents.",
            parameters: schema_value::<FolderArgs>(),
        },
        CatalogEntry {
            name: "get_app_hotkeys",
            description: "Asks the local model for an app's keyboard shortcuts.",
            parameters: schema_value::<AppArgs>(),
        },
    ]
}

/// 渲染为 `- name: description` 行，附参数 Schema（单行 JSON）
pub fn render_catalog() -> String {
    catalog()
        .iter()
        .map(|e| {
            let params = e
                .parameters
                .get("properties")
                .cloned()
                .unwrap_or(Value::Null);
            format!("- {}: {} Args: {}", e.name, e.description, params)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
