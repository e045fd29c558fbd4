pub mod openai;

use async_trait::async_trait;

use crate::error::AgentError;

/// One entry in a per-request conversation. `tool_call` is set on the
/// assistant turn that requested a tool and echoed on the matching tool
/// result turn so the provider can thread ids/names per wire format.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    pub tool_call: Option<ToolCall>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            tool_call: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            tool_call: None,
        }
    }

    pub fn assistant_call(call: ToolCall) -> Self {
        Self {
            role: "assistant".to_string(),
            content: String::new(),
            tool_call: Some(call),
        }
    }

    pub fn tool_result(call: &ToolCall, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content,
            tool_call: Some(call.clone()),
        }
    }
}

/// A tool invocation emitted by the model. `arguments` is kept as the raw
/// JSON text the model produced; it is untrusted and parsed (with
/// validation) by the dispatcher, never here.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

/// A tool declared to the model.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// What the model produced in one round: plain text or a tool request.
#[derive(Debug, Clone)]
pub enum ModelTurn {
    Text(String),
    ToolCall(ToolCall),
}

impl ModelTurn {
    /// Collapse to text, mirroring the provider contract of "content or
    /// empty" when the model ignores the no-tools instruction.
    pub fn text_or_default(self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::ToolCall(_) => String::new(),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One model round: the full conversation, optionally with tool
    /// declarations. Attempted exactly once; no retries.
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolSpec]>,
    ) -> Result<ModelTurn, AgentError>;
}
