use std::env;
use std::path::PathBuf;

use crate::core::llm::openai::ToolWireFormat;
use crate::core::query::DEFAULT_MAX_ROWS;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DATABASE: &str = "data/netflix.db";
pub const DEFAULT_TICKET_LOG: &str = "data/support_tickets.csv";

/// Process configuration, loaded once from the environment (with `.env`
/// support). The API key is optional here so that offline commands
/// (tickets, summary) work without one; the dispatcher demands it.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub database: PathBuf,
    pub ticket_log: PathBuf,
    pub wire_format: ToolWireFormat,
    pub max_rows: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let wire_format = match env::var("FLIXQL_WIRE_FORMAT").ok().as_deref() {
            Some("legacy") | Some("functions") => ToolWireFormat::LegacyFunctions,
            _ => ToolWireFormat::Tools,
        };

        let max_rows = env::var("FLIXQL_MAX_ROWS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_ROWS);

        Self {
            api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            model: env::var("FLIXQL_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: env::var("FLIXQL_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            database: env::var("FLIXQL_DATABASE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATABASE)),
            ticket_log: env::var("FLIXQL_TICKET_LOG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_TICKET_LOG)),
            wire_format,
            max_rows,
        }
    }
}
