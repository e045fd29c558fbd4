use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::core::dataset::DATABASE_SCHEMA;
use crate::core::llm::{ChatMessage, LlmProvider, ModelTurn, ToolCall, ToolSpec};
use crate::core::query::{self, QueryExecutor, QueryResult};
use crate::core::tickets::{Ticket, TicketPriority, TicketStore};
use crate::error::AgentError;

pub const ASK_DATABASE: &str = "ask_database";
pub const CREATE_SUPPORT_TICKET: &str = "create_support_ticket";

const SYSTEM_PROMPT: &str = r#"You are DatabaseGPT, a helpful assistant that answers questions using the netflix_titles SQLite database.
Rules:
- Generate safe, single-statement, read-only SQL (SELECT ... or WITH ... SELECT) referencing only the netflix_titles table and its listed columns.
- Treat directors as a comma-separated list; when counting or grouping by director, expand the list using a CTE with json_each and TRIM, converting the string into valid JSON, for example:
  WITH director_cte AS (
      SELECT TRIM(value) AS director
      FROM netflix_titles,
           json_each('["' || REPLACE(REPLACE(IFNULL(directors, ''), '"', ''), ',', '","') || '"]')
      WHERE director <> ''
  )
- Apply sensible LIMIT values (e.g., 10 or 20) unless the user requests more.
- When results indicate data quality issues, suggest creating a support ticket through the provided tool.
Provide concise, markdown-formatted answers summarising the results."#;

const FOLLOW_UP_PROMPT: &str = "Respond to the user with the database results, format as \
markdown, and include the SQL query used if it was executed.";

/// What one dispatcher invocation hands back to the presentation layer.
/// Exactly the `{text?, columns?, rows?, query?, ticket?, error?}` contract:
/// partial results survive alongside `error` when only the follow-up
/// summarization failed.
#[derive(Debug, Default, Serialize)]
pub struct AgentOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<serde_json::Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentOutcome {
    fn failed(err: AgentError) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

/// Orchestrates the two-round conversation per user question: round one
/// offers the model the tool set, round two turns a tool result into the
/// final answer. Conversation state lives on the stack of `run` and is
/// never shared across requests.
pub struct ToolDispatcher {
    provider: Arc<dyn LlmProvider>,
    model: String,
    executor: QueryExecutor,
    tickets: Arc<TicketStore>,
}

impl ToolDispatcher {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        executor: QueryExecutor,
        tickets: Arc<TicketStore>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            executor,
            tickets,
        }
    }

    pub async fn run(&self, question: &str) -> AgentOutcome {
        info!("Received user question: {}", question);

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(question),
        ];
        let tools = declared_tools();

        // Round one. A failure here aborts before any tool runs.
        let first = match self
            .provider
            .generate(&self.model, &messages, Some(&tools))
            .await
        {
            Ok(turn) => turn,
            Err(err) => return AgentOutcome::failed(err),
        };

        let call = match first {
            ModelTurn::Text(text) => {
                return AgentOutcome {
                    text: Some(text),
                    ..AgentOutcome::default()
                };
            }
            ModelTurn::ToolCall(call) => call,
        };

        match call.name.as_str() {
            ASK_DATABASE => self.dispatch_query(messages, call).await,
            CREATE_SUPPORT_TICKET => self.dispatch_ticket(messages, call).await,
            other => AgentOutcome::failed(AgentError::UnknownTool(other.to_string())),
        }
    }

    async fn dispatch_query(&self, mut messages: Vec<ChatMessage>, call: ToolCall) -> AgentOutcome {
        let (safe_sql, result) = match self.execute_query_call(&call) {
            Ok(pair) => pair,
            Err(err) => return AgentOutcome::failed(err),
        };

        let payload = json!({ "columns": result.columns, "rows": result.rows }).to_string();
        messages.push(ChatMessage::assistant_call(call.clone()));
        messages.push(ChatMessage::tool_result(&call, payload));
        messages.push(ChatMessage::system(FOLLOW_UP_PROMPT));

        // Round two, without tools. Fetched rows are returned even when
        // this call fails; informational results are never silently lost.
        match self.provider.generate(&self.model, &messages, None).await {
            Ok(turn) => {
                let text = turn.text_or_default();
                info!(
                    "Answered question with {} rows and message length {}",
                    result.rows.len(),
                    text.len()
                );
                AgentOutcome {
                    text: Some(text),
                    columns: Some(result.columns),
                    rows: Some(result.rows),
                    query: Some(safe_sql),
                    ..AgentOutcome::default()
                }
            }
            Err(err) => AgentOutcome {
                error: Some(err.to_string()),
                columns: Some(result.columns),
                rows: Some(result.rows),
                query: Some(safe_sql),
                ..AgentOutcome::default()
            },
        }
    }

    fn execute_query_call(&self, call: &ToolCall) -> Result<(String, QueryResult), AgentError> {
        let query = parse_query_arguments(&call.arguments)?;
        let safe_sql = query::normalize(&query)?;
        let result = self.executor.execute(&safe_sql)?;
        Ok((safe_sql, result))
    }

    async fn dispatch_ticket(&self, mut messages: Vec<ChatMessage>, call: ToolCall) -> AgentOutcome {
        let (title, description, priority) = match parse_ticket_arguments(&call.arguments) {
            Ok(args) => args,
            Err(err) => return AgentOutcome::failed(err),
        };

        let ticket = match self.tickets.create(&title, &description, priority) {
            Ok(ticket) => ticket,
            Err(err) => return AgentOutcome::failed(err),
        };

        let payload = match serde_json::to_string(&ticket) {
            Ok(payload) => payload,
            Err(e) => return AgentOutcome::failed(AgentError::Storage(e.to_string())),
        };
        messages.push(ChatMessage::assistant_call(call.clone()));
        messages.push(ChatMessage::tool_result(&call, payload));

        // The ticket exists on disk; a follow-up outage must not hide it.
        let text = match self.provider.generate(&self.model, &messages, None).await {
            Ok(turn) => turn.text_or_default(),
            Err(err) => format!(
                "Ticket created: {}. (Follow-up call failed: {})",
                ticket.ticket_id, err
            ),
        };
        info!(
            "Support ticket {} created via agent with priority {}",
            ticket.ticket_id, ticket.priority
        );
        AgentOutcome {
            text: Some(text),
            ticket: Some(ticket),
            ..AgentOutcome::default()
        }
    }
}

fn declared_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: ASK_DATABASE,
            description: "Use this function to answer user questions about the Netflix dataset. \
                          Output should be a fully formed SQL query."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": format!(
                            "SQL query extracting info to answer the user's question. \
                             SQL must use this database schema:\n{DATABASE_SCHEMA}\
                             Return the query as plain text, not JSON."
                        ),
                    },
                },
                "required": ["query"],
            }),
        },
        ToolSpec {
            name: CREATE_SUPPORT_TICKET,
            description: "Create a support ticket for human follow-up when the data seems \
                          incorrect, incomplete, or when the user explicitly asks for human help."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Short summary of the issue.",
                    },
                    "description": {
                        "type": "string",
                        "description": "Detailed description of the observed problem with necessary context.",
                    },
                    "priority": {
                        "type": "string",
                        "enum": ["low", "medium", "high"],
                        "default": "medium",
                        "description": "Priority of the ticket.",
                    },
                },
                "required": ["title", "description"],
            }),
        },
    ]
}

/// The argument payload is model output: untrusted text until proven JSON.
fn parse_query_arguments(raw: &str) -> Result<String, AgentError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| AgentError::MalformedToolCall(e.to_string()))?;
    value
        .get("query")
        .and_then(|q| q.as_str())
        .map(|q| q.to_string())
        .ok_or_else(|| AgentError::MalformedToolCall("missing required field 'query'".to_string()))
}

fn parse_ticket_arguments(raw: &str) -> Result<(String, String, TicketPriority), AgentError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| AgentError::MalformedToolCall(e.to_string()))?;
    let title = value
        .get("title")
        .and_then(|t| t.as_str())
        .unwrap_or("Untitled issue")
        .to_string();
    let description = value
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or("")
        .to_string();
    let priority = value
        .get("priority")
        .and_then(|p| p.as_str())
        .map(TicketPriority::parse)
        .unwrap_or_default();
    Ok((title, description, priority))
}
