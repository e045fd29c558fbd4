use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::AppState;
use crate::core::dataset;
use crate::core::tickets::TicketPriority;

#[derive(Deserialize)]
pub struct AskRequest {
    question: String,
}

pub async fn ask_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<AskRequest>,
) -> Json<serde_json::Value> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Json(json!({
            "success": false,
            "error": "Please enter a question before submitting.",
        }));
    }

    let outcome = state.dispatcher.run(question).await;
    let success = outcome.error.is_none();
    Json(json!({ "success": success, "outcome": outcome }))
}

#[derive(Deserialize)]
pub struct CreateTicketRequest {
    title: String,
    description: String,
    #[serde(default)]
    priority: Option<String>,
}

pub async fn create_ticket_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateTicketRequest>,
) -> Json<serde_json::Value> {
    let title = payload.title.trim();
    let description = payload.description.trim();
    if title.is_empty() || description.is_empty() {
        return Json(json!({
            "success": false,
            "error": "Please provide both a title and a description.",
        }));
    }

    let priority = payload
        .priority
        .as_deref()
        .map(TicketPriority::parse)
        .unwrap_or_default();
    match state.tickets.create(title, description, priority) {
        Ok(ticket) => {
            info!("Manual ticket {} created via API", ticket.ticket_id);
            Json(json!({ "success": true, "ticket": ticket }))
        }
        Err(e) => Json(json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn list_tickets_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.tickets.list_recent() {
        Ok(mut tickets) => {
            tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Json(json!({ "success": true, "tickets": tickets }))
        }
        Err(e) => Json(json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn summary_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    match dataset::summary(&state.db_path) {
        Ok(summary) => Json(json!({ "success": true, "summary": summary })),
        Err(e) => Json(json!({ "success": false, "error": e.to_string() })),
    }
}
