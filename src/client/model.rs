//! 聊天服务的请求/响应模型

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// 头像字符
    pub fn avatar(&self) -> &'static str {
        match self {
            Role::User => "\u{1F464}",
            Role::Assistant => "\u{1F49A}",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会话中的一条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub time: String,
}

/// 注册/登录凭据
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// 一轮对话请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub session_id: &'a str,
    pub token: &'a str,
}

/// 服务端的回复（内容均视为不可信输入）
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub options: Vec<String>,
    #[serde(default, rename = "riskLevel", alias = "risk_level")]
    pub risk_level: Option<String>,
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// 会话摘要
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationSummary {
    #[serde(rename = "sessionId", default)]
    pub session_id: String,
    pub summary: String,
    /// Unix 秒
    pub created_at: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummariesResponse {
    #[serde(default)]
    pub summaries: Vec<ConversationSummary>,
}

/// 错误响应体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_with_null_options() {
        let reply: ChatReply = serde_json::from_str(
            r#"{"response":"hi","options":null,"riskLevel":"low","sessionId":"s1","timestamp":1700000000}"#,
        )
        .unwrap();
        assert!(reply.options.is_empty());
        assert_eq!(reply.risk_level.as_deref(), Some("low"));
        assert_eq!(reply.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_reply_minimal() {
        let reply: ChatReply = serde_json::from_str(r#"{"response":"hi"}"#).unwrap();
        assert_eq!(reply.response, "hi");
        assert!(reply.options.is_empty());
        assert_eq!(reply.risk_level, None);
    }

    #[test]
    fn test_request_is_camel_case() {
        let req = ChatRequest { message: "m", session_id: "s", token: "t" };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"message": "m", "sessionId": "s", "token": "t"}));
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let creds = Credentials { username: "amy".into(), password: "hunter2".into() };
        let dbg = format!("{:?}", creds);
        assert!(dbg.contains("amy"));
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }
}
