use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ChatMessage, LlmProvider, ModelTurn, ToolCall, ToolSpec};
use crate::error::AgentError;

/// Calls that never return are worse than a surfaced error.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Which tool-calling contract the endpoint speaks. `Tools` is the current
/// OpenAI shape (declarations nested under a `function` key, responses in
/// `tool_calls`); `LegacyFunctions` is the flat `functions`/`function_call`
/// shape older proxies still expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolWireFormat {
    #[default]
    Tools,
    LegacyFunctions,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
    #[serde(default)]
    function_call: Option<ResponseFunctionCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunctionCall,
}

#[derive(Deserialize)]
struct ResponseFunctionCall {
    name: String,
    arguments: String,
}

/// OpenAI-compatible chat-completions client with tool-call support.
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    wire_format: ToolWireFormat,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, wire_format: ToolWireFormat) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            wire_format,
            client,
        }
    }

    fn wire_message(&self, message: &ChatMessage) -> serde_json::Value {
        match (&message.tool_call, message.role.as_str()) {
            (Some(call), "assistant") => match self.wire_format {
                ToolWireFormat::Tools => json!({
                    "role": "assistant",
                    "content": serde_json::Value::Null,
                    "tool_calls": [{
                        "id": call.id.as_deref().unwrap_or("call_0"),
                        "type": "function",
                        "function": { "name": call.name, "arguments": call.arguments },
                    }],
                }),
                ToolWireFormat::LegacyFunctions => json!({
                    "role": "assistant",
                    "content": serde_json::Value::Null,
                    "function_call": { "name": call.name, "arguments": call.arguments },
                }),
            },
            (Some(call), _) => match self.wire_format {
                ToolWireFormat::Tools => json!({
                    "role": "tool",
                    "tool_call_id": call.id.as_deref().unwrap_or("call_0"),
                    "content": message.content,
                }),
                ToolWireFormat::LegacyFunctions => json!({
                    "role": "function",
                    "name": call.name,
                    "content": message.content,
                }),
            },
            (None, _) => json!({ "role": message.role, "content": message.content }),
        }
    }

    fn declare_tools(&self, tools: &[ToolSpec]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|tool| match self.wire_format {
                ToolWireFormat::Tools => json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    },
                }),
                ToolWireFormat::LegacyFunctions => json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }),
            })
            .collect()
    }

    fn parse_turn(&self, parsed: ChatResponse) -> Result<ModelTurn, AgentError> {
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AgentError::Provider("response contained no choices".to_string()))?;

        if let Some(call) = message
            .tool_calls
            .and_then(|calls| calls.into_iter().next())
        {
            return Ok(ModelTurn::ToolCall(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            }));
        }
        if let Some(call) = message.function_call {
            return Ok(ModelTurn::ToolCall(ToolCall {
                id: None,
                name: call.name,
                arguments: call.arguments,
            }));
        }
        Ok(ModelTurn::Text(message.content.unwrap_or_default()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolSpec]>,
    ) -> Result<ModelTurn, AgentError> {
        let wire_messages: Vec<serde_json::Value> =
            messages.iter().map(|m| self.wire_message(m)).collect();

        let mut body = json!({ "model": model, "messages": wire_messages });
        if let Some(tools) = tools {
            let key = match self.wire_format {
                ToolWireFormat::Tools => "tools",
                ToolWireFormat::LegacyFunctions => "functions",
            };
            body[key] = serde_json::Value::Array(self.declare_tools(tools));
        }
        info!(
            "Calling model with {} messages and {} tools",
            messages.len(),
            tools.map(|t| t.len()).unwrap_or(0)
        );

        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let detail = res.text().await.unwrap_or_default();
            return Err(AgentError::Provider(format!("{status}: {detail}")));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;
        self.parse_turn(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(format: ToolWireFormat) -> OpenAiProvider {
        OpenAiProvider::new("https://api.openai.com/v1/", "sk-test", format)
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        assert_eq!(provider(ToolWireFormat::Tools).base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn modern_format_nests_declarations_under_function() {
        let spec = ToolSpec {
            name: "ask_database",
            description: "query".to_string(),
            parameters: json!({"type": "object"}),
        };
        let declared = provider(ToolWireFormat::Tools).declare_tools(&[spec.clone()]);
        assert_eq!(declared[0]["type"], "function");
        assert_eq!(declared[0]["function"]["name"], "ask_database");

        let legacy = provider(ToolWireFormat::LegacyFunctions).declare_tools(&[spec]);
        assert_eq!(legacy[0]["name"], "ask_database");
        assert!(legacy[0].get("function").is_none());
    }

    #[test]
    fn tool_result_message_shape_follows_wire_format() {
        let call = ToolCall {
            id: Some("call_abc".to_string()),
            name: "ask_database".to_string(),
            arguments: "{}".to_string(),
        };
        let msg = ChatMessage::tool_result(&call, "{\"rows\":[]}".to_string());

        let modern = provider(ToolWireFormat::Tools).wire_message(&msg);
        assert_eq!(modern["role"], "tool");
        assert_eq!(modern["tool_call_id"], "call_abc");

        let legacy = provider(ToolWireFormat::LegacyFunctions).wire_message(&msg);
        assert_eq!(legacy["role"], "function");
        assert_eq!(legacy["name"], "ask_database");
    }

    #[test]
    fn parse_prefers_tool_calls_over_content() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "ask_database", "arguments": "{\"query\":\"SELECT 1\"}" },
                    }],
                },
            }],
        }))
        .unwrap();

        match provider(ToolWireFormat::Tools).parse_turn(response).unwrap() {
            ModelTurn::ToolCall(call) => {
                assert_eq!(call.name, "ask_database");
                assert_eq!(call.id.as_deref(), Some("call_1"));
            }
            ModelTurn::Text(_) => panic!("expected a tool call"),
        }
    }

    #[test]
    fn parse_handles_legacy_function_call() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "function_call": { "name": "create_support_ticket", "arguments": "{}" },
                },
            }],
        }))
        .unwrap();

        match provider(ToolWireFormat::LegacyFunctions).parse_turn(response).unwrap() {
            ModelTurn::ToolCall(call) => assert_eq!(call.name, "create_support_ticket"),
            ModelTurn::Text(_) => panic!("expected a tool call"),
        }
    }

    #[test]
    fn parse_empty_choices_is_a_provider_error() {
        let response: ChatResponse = serde_json::from_value(json!({ "choices": [] })).unwrap();
        let err = provider(ToolWireFormat::Tools).parse_turn(response).unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }
}
