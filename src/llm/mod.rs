mod backend;
mod cache;
mod client;
mod error;
mod ledger;
mod safety;
pub mod scripted;

pub use backend::{CompletionBackend, CompletionRequest, OpenAiBackend, RawCompletion};
pub use cache::ResponseCache;
pub use client::{BatchOptions, CompletionClient, GenerateOptions};
pub use error::{BackendError, ClientError};
pub use ledger::{UsageLedger, UsageStats, COMPLETION_TOKEN_RATE, PROMPT_TOKEN_RATE};
pub use safety::{KeywordSafetyCheck, SafetyCheck, SafetyPolicy, SafetyVerdict};
pub use scripted::ScriptedBackend;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Caller-supplied metadata attached to a response. Ordered by key.
pub type Metadata = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("Unknown message role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Input to a completion call: free text or an already-structured conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Text(String),
    Messages(Vec<ChatMessage>),
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<Vec<ChatMessage>> for Prompt {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Prompt::Messages(messages)
    }
}

impl TryFrom<Value> for Prompt {
    type Error = ClientError;

    /// A JSON string is free text; a JSON array must hold `{role, content}` objects.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(text) => Ok(Prompt::Text(text)),
            Value::Array(items) => {
                let mut messages = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let role = item
                        .get("role")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            ClientError::InvalidInput(format!("message {} has no role", index))
                        })?
                        .parse::<Role>()
                        .map_err(ClientError::InvalidInput)?;
                    let content = item
                        .get("content")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            ClientError::InvalidInput(format!(
                                "message {} has no string content",
                                index
                            ))
                        })?;
                    messages.push(ChatMessage {
                        role,
                        content: content.to_string(),
                    });
                }
                Ok(Prompt::Messages(messages))
            }
            other => Err(ClientError::InvalidInput(format!(
                "prompt must be a string or a list of messages, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Token usage breakdown for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    FunctionCall,
    /// Synthetic marker for batch slots whose call failed.
    Error,
    #[serde(other)]
    Unknown,
}

/// Normalized result of one completion call.
///
/// Cached responses are shared, so a `ModelResponse` handed out by the client
/// should be treated as read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    pub model: String,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ModelResponse {
    /// Placeholder for a batch slot whose call exhausted its retries.
    pub fn error(model: &str, message: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("error".to_string(), Value::Bool(true));
        metadata.insert(
            "error_message".to_string(),
            Value::String(message.to_string()),
        );

        Self {
            content: format!("ERROR: {}", message),
            model: model.to_string(),
            usage: Usage::default(),
            finish_reason: FinishReason::Error,
            timestamp: Utc::now(),
            metadata,
        }
    }

    pub fn is_error(&self) -> bool {
        self.finish_reason == FinishReason::Error
            || self
                .metadata
                .get("error")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_from_json_string() {
        let prompt = Prompt::try_from(json!("hello")).unwrap();
        assert_eq!(prompt, Prompt::Text("hello".to_string()));
    }

    #[test]
    fn test_prompt_from_json_messages() {
        let prompt = Prompt::try_from(json!([
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": "hi"}
        ]))
        .unwrap();

        assert_eq!(
            prompt,
            Prompt::Messages(vec![ChatMessage::system("be brief"), ChatMessage::user("hi")])
        );
    }

    #[test]
    fn test_prompt_rejects_unknown_role() {
        let err = Prompt::try_from(json!([{"role": "tool", "content": "x"}])).unwrap_err();
        assert!(matches!(err, ClientError::InvalidInput(_)));
    }

    #[test]
    fn test_prompt_rejects_other_shapes() {
        assert!(matches!(
            Prompt::try_from(json!(42)),
            Err(ClientError::InvalidInput(_))
        ));
        assert!(matches!(
            Prompt::try_from(json!({"content": "x"})),
            Err(ClientError::InvalidInput(_))
        ));
        assert!(matches!(
            Prompt::try_from(json!([{"role": "user"}])),
            Err(ClientError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_error_response_is_flagged() {
        let response = ModelResponse::error("gpt-oss-20b", "boom");
        assert!(response.is_error());
        assert_eq!(response.finish_reason, FinishReason::Error);
        assert_eq!(response.content, "ERROR: boom");
        assert_eq!(response.metadata["error_message"], json!("boom"));
        assert_eq!(response.usage, Usage::default());
    }

    #[test]
    fn test_unknown_finish_reason_deserializes() {
        let reason: FinishReason = serde_json::from_value(json!("something_new")).unwrap();
        assert_eq!(reason, FinishReason::Unknown);
    }
}
