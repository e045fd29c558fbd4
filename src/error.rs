use thiserror::Error;

/// Everything that can go wrong between a user question and an answer.
/// All variants are converted to a single descriptive message at the
/// dispatcher boundary; nothing here crosses into the presentation layer
/// as a panic or raw error type.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Database error: {0}")]
    QueryExecution(#[from] rusqlite::Error),

    #[error("Failed to parse tool arguments: {0}")]
    MalformedToolCall(String),

    #[error("Unknown tool requested: {0}")]
    UnknownTool(String),

    #[error("Ticket storage failure: {0}")]
    Storage(String),

    #[error("OpenAI request failed: {0}")]
    Provider(String),
}
