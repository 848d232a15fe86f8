//! 工具调用块解析
//!
//! 模型以纯文本输出 `<function=NAME>{JSON}</function>`，一条回复可含零到多个块。
//! 每个块单独解析：payload 不是 JSON 对象时该块报 ParseError，不影响同一回复中的其它块。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::AgentError;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub name: String,
    pub args: Value,
}

static CALL_RE: OnceLock<Regex> = OnceLock::new();

fn call_pattern() -> &'static Regex {
    CALL_RE.get_or_init(|| Regex::new(r"(?s)<function=(\w+)>(.*?)</function>").unwrap())
}

/// 按出现顺序返回每个块的解析结果
pub fn parse_tool_calls(reply: &str) -> Vec<Result<ParsedCall, AgentError>> {
    call_pattern()
        .captures_iter(reply)
        .map(|cap| {
            let name = cap[1].to_string();
            let payload = cap[2].trim();
            match serde_json::from_str::<Value>(payload) {
                Ok(args @ Value::Object(_)) => Ok(ParsedCall { name, args }),
                Ok(other) => Err(AgentError::ParseError {
                    tool: name,
                    reason: format!("arguments must be a JSON object, got {}", other),
                }),
                Err(e) => Err(AgentError::ParseError {
                    tool: name,
                    reason: e.to_string(),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_blocks() {
        assert!(parse_tool_calls("I will think about it first.").is_empty());
    }

    #[test]
    fn test_multiple_blocks_in_order() {
        let reply = "Opening.\n<function=open_app>{\"app_name\": \"notepad\"}</function>\nthen\n<function=type_text>{\n  \"text\": \"Hi\"\n}</function>";
        let calls: Vec<_> = parse_tool_calls(reply).into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "open_app");
        assert_eq!(calls[0].args, json!({"app_name": "notepad"}));
        assert_eq!(calls[1].args, json!({"text": "Hi"}));
    }

    #[test]
    fn test_bad_payload_does_not_hide_others() {
        let reply = "<function=type_text>{text: oops}</function><function=press_hotkey>{\"key_combo\":\"ctrl+s\"}</function><function=open_app>[1]</function>";
        let calls = parse_tool_calls(reply);
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[0], Err(AgentError::ParseError { tool, .. }) if tool == "type_text"));
        assert!(calls[1].is_ok());
        assert!(matches!(&calls[2], Err(AgentError::ParseError { tool, .. }) if tool == "open_app"));
    }
}
