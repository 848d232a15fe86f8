//! Planner：system prompt 与每轮消息的拼装，调用推理服务
//!
//! 对话本身（目标、屏幕观察、回复、工具输出）由控制循环写入 Transcript；Planner 只在调用前把 system prompt
//! 放在最前面。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::render_catalog;

pub const NO_PRIOR_KNOWLEDGE: &str = "No prior knowledge.";

/// 默认 system prompt：不假设动作成功，每轮依据屏幕状态验证
pub fn default_system_prompt(completion_token: &str) -> String {
    format!(
        r#"You are a Closed-Loop Windows Desktop Agent.
You DO NOT assume actions worked. You VERIFY them using the provided Screen State.

PROTOCOL:
1. READ the 'CURRENT SCREEN STATE' provided in every user message.
2. IF you see "Confirm Save As" or "already exists", you must resolve it (e.g., press 'y' or click 'Yes').
3. IF the app didn't open, try again.
4. START by finding the Desktop path via 'get_user_folder_path'.
5. ONLY say "{token}" when the file is visibly saved and the UI is stable.

AVAILABLE TOOLS:
{tools}

COMMAND FORMAT:
To execute a tool, you MUST output a block like this:
<function=tool_name>{{"arg_name": "value"}}</function>
Example: <function=type_text>{{"text": "Hello"}}</function>

RESTRICTIONS:
- DO NOT hallucinate tools like 'save_file'.
- To save to a specific folder:
  1. PRESS 'ctrl+s' to open the Save dialog.
  2. REASONING: "I need to change the folder first."
  3. PRESS 'alt+d' to focus the Address Bar.
  4. TYPE the full folder path and PRESS 'enter' (Wait for navigation).
  5. REASONING: "Now I can name the file."
  6. PRESS 'alt+n' to focus the File Name field.
  7. TYPE the filename and PRESS 'enter'.

WINDOWS UI KNOWLEDGE:
- 'Alt+D' -> Focuses Address Bar (File Explorer/Dialogs)
- 'Alt+N' -> Focuses File Name Field
- 'Ctrl+S' -> Save
- 'Enter' in Address Bar -> Navigates to folder
"#,
        token = completion_token,
        tools = render_catalog(),
    )
}

/// 任务首条 user 消息：目标 + 检索到的历史经验
pub fn goal_message(goal: &str, context: &[String]) -> Message {
    let context = if context.is_empty() {
        NO_PRIOR_KNOWLEDGE.to_string()
    } else {
        context.join("\n")
    };
    Message::user(format!("GOAL: {}. \nCONTEXT: {}", goal, context))
}

/// 每轮开始时的屏幕观察
pub fn observation_message(screen: &str) -> Message {
    Message::user(format!(
        "--- CURRENT SCREEN STATE (What you see right now) ---\n{}\n\
         ----------------------------------------------------\n\
         Based on this state, did the last action work? What is the next step?",
        screen
    ))
}

pub fn tool_output_message(tool: &str, output: &str) -> Message {
    Message::user(format!("Tool '{}' Output: {}", tool, output))
}

/// Planner：持有 LLM 与 system prompt
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 限流以 AgentError::RateLimited 返回，其余推理故障为 AgentError::LlmError
    pub async fn plan(&self, messages: &[Message]) -> Result<String, AgentError> {
        let mut full_messages = Vec::with_capacity(messages.len() + 1);
        full_messages.push(Message::system(self.system_prompt.clone()));
        full_messages.extend_from_slice(messages);
        Ok(self.llm.complete(&full_messages).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::memory::Role;

    #[test]
    fn test_goal_message_context() {
        assert_eq!(
            goal_message("Open Notepad", &[]).content,
            "GOAL: Open Notepad. \nCONTEXT: No prior knowledge."
        );
        let m = goal_message("Open Notepad", &["tip a".into(), "tip b".into()]);
        assert!(m.content.ends_with("CONTEXT: tip a\ntip b"));
    }

    #[test]
    fn test_system_prompt_mentions_token_and_tools() {
        let p = default_system_prompt("MISSION COMPLETE");
        assert!(p.contains("ONLY say \"MISSION COMPLETE\""));
        assert!(p.contains("- get_user_folder_path:"));
        assert!(p.contains("<function=type_text>{\"text\": \"Hello\"}</function>"));
    }

    #[tokio::test]
    async fn test_plan_prepends_system() {
        let llm = Arc::new(ScriptedLlmClient::from_replies(["ok"]));
        let planner = Planner::new(llm.clone(), "SYS");
        let out = planner.plan(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "ok");
        let sent = llm.call(0).unwrap();
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[1].content, "hi");
    }

    #[tokio::test]
    async fn test_plan_rate_limit_is_distinct() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![Err(LlmError::RateLimited {
            retry_after_ms: 0,
        })]));
        let planner = Planner::new(llm, "SYS");
        let err = planner.plan(&[]).await.unwrap_err();
        assert!(matches!(err, AgentError::RateLimited { .. }));
    }
}
