use std::sync::Arc;

use anyhow::{anyhow, Result};
use console::style;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::core::agent::{AgentOutcome, ToolDispatcher};
use crate::core::llm::openai::OpenAiProvider;
use crate::core::query::QueryExecutor;
use crate::core::terminal::{self, print_error, GuideSection};
use crate::core::tickets::{TicketPriority, TicketStore};
use crate::core::dataset;
use crate::interfaces::web::{self, AppState};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Ask")
        .command("ask", "Ask the catalog a question in plain language")
        .command("serve", "Start the JSON API (--host, --port)")
        .print();

    GuideSection::new("Tickets")
        .command("ticket", "File a support ticket (--title, --description, --priority)")
        .command("tickets", "List the most recent support tickets")
        .print();

    GuideSection::new("Dataset")
        .command("summary", "Show headline dataset figures")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("flixql").green()
    );
}

fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

pub async fn run_main() -> Result<()> {
    init_logging();
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");

    match command {
        "ask" => cmd_ask(&args[2..]).await,
        "serve" => cmd_serve(&args[2..]).await,
        "ticket" => cmd_ticket(&args[2..]),
        "tickets" => cmd_tickets(),
        "summary" => cmd_summary(),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}

fn build_dispatcher(config: &Config) -> Result<ToolDispatcher> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set. Add it to your .env file."))?;
    let provider = Arc::new(OpenAiProvider::new(
        config.base_url.as_str(),
        api_key,
        config.wire_format,
    ));
    Ok(ToolDispatcher::new(
        provider,
        config.model.as_str(),
        QueryExecutor::new(&config.database, config.max_rows),
        Arc::new(TicketStore::new(&config.ticket_log)),
    ))
}

async fn cmd_ask(args: &[String]) -> Result<()> {
    let question = args.join(" ");
    let question = question.trim();
    if question.is_empty() {
        return Err(anyhow!("Usage: flixql ask <question>"));
    }

    let config = Config::from_env();
    let dispatcher = build_dispatcher(&config)?;
    let outcome = dispatcher.run(question).await;
    print_outcome(&outcome);
    if outcome.error.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_outcome(outcome: &AgentOutcome) {
    if let Some(err) = &outcome.error {
        print_error(err);
    }
    if outcome.error.is_none() && outcome.text.as_deref().map_or(true, str::is_empty) {
        terminal::print_warn("The model returned an empty reply.");
    }
    if let Some(text) = &outcome.text {
        println!("\n{}\n", text);
    }
    if let (Some(columns), Some(rows)) = (&outcome.columns, &outcome.rows) {
        println!("{}", style(columns.join(" | ")).bold());
        for row in rows {
            let rendered: Vec<String> = row.iter().map(render_cell).collect();
            println!("{}", rendered.join(" | "));
        }
        println!();
    }
    if let Some(query) = &outcome.query {
        terminal::print_status("SQL executed", query);
    }
    if let Some(ticket) = &outcome.ticket {
        terminal::print_success(&format!(
            "Support ticket created: {} (priority: {})",
            ticket.ticket_id, ticket.priority
        ));
    }
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn cmd_serve(args: &[String]) -> Result<()> {
    let mut host = "127.0.0.1".to_string();
    let mut port: u16 = 8750;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                if i + 1 < args.len() {
                    host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port = args[i + 1].parse().unwrap_or(port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    let config = Config::from_env();
    let dispatcher = build_dispatcher(&config)?;
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        tickets: Arc::new(TicketStore::new(&config.ticket_log)),
        db_path: config.database.clone(),
    };
    web::serve(state, &host, port).await
}

fn cmd_ticket(args: &[String]) -> Result<()> {
    let mut title = String::new();
    let mut description = String::new();
    let mut priority = TicketPriority::Medium;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--title" | "-t" => {
                if i + 1 < args.len() {
                    title = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--description" | "-d" => {
                if i + 1 < args.len() {
                    description = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--priority" => {
                if i + 1 < args.len() {
                    priority = TicketPriority::parse(&args[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    if title.trim().is_empty() || description.trim().is_empty() {
        return Err(anyhow!(
            "Usage: flixql ticket --title <summary> --description <details> [--priority low|medium|high]"
        ));
    }

    let config = Config::from_env();
    let store = TicketStore::new(&config.ticket_log);
    let ticket = store.create(title.trim(), description.trim(), priority)?;
    terminal::print_success(&format!(
        "Ticket {} created. A human analyst will contact you soon.",
        ticket.ticket_id
    ));
    Ok(())
}

fn cmd_tickets() -> Result<()> {
    let config = Config::from_env();
    let store = TicketStore::new(&config.ticket_log);
    let mut all = store.list_recent()?;
    if all.is_empty() {
        terminal::print_info("No tickets created yet.");
        return Ok(());
    }
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    for ticket in all.iter().take(10) {
        println!(
            "{}  [{}] {} — {}",
            style(&ticket.ticket_id).green(),
            ticket.priority,
            style(&ticket.title).bold(),
            ticket.created_at
        );
    }
    Ok(())
}

fn cmd_summary() -> Result<()> {
    let config = Config::from_env();
    let summary = dataset::summary(&config.database)?;
    terminal::print_status("Rows in dataset", &summary.total_rows.to_string());
    terminal::print_status("Unique titles", &summary.unique_titles.to_string());
    terminal::print_status(
        "Latest release year",
        &summary
            .latest_year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    for entry in &summary.by_type {
        terminal::print_status(&entry.kind, &entry.count.to_string());
    }
    Ok(())
}
