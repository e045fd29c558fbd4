use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

use crate::error::AgentError;

pub const TICKET_HEADER: &str = "ticket_id,title,description,priority,created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TicketPriority {
    /// Lenient parse: anything unrecognized falls back to the schema
    /// default, matching the tool declaration's `default: medium`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub title: String,
    pub description: String,
    pub priority: TicketPriority,
    pub created_at: String,
}

/// Append-only CSV log of support tickets. Records are immutable once
/// written; there is no quoting scheme, so every free-text field is
/// sanitized before it touches the file. Appends are serialized behind a
/// mutex so concurrent requests never interleave partial lines.
pub struct TicketStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TicketStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazily creates the log with its header row. Idempotent.
    fn ensure_store(&self) -> Result<(), AgentError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(storage_err)?;
            }
        }
        if !self.path.exists() {
            fs::write(&self.path, format!("{TICKET_HEADER}\n")).map_err(storage_err)?;
        }
        Ok(())
    }

    /// Single-attempt, best-effort create: write failures surface
    /// immediately, nothing is buffered or retried.
    pub fn create(
        &self,
        title: &str,
        description: &str,
        priority: TicketPriority,
    ) -> Result<Ticket, AgentError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_store()?;

        let now = OffsetDateTime::now_utc();
        let created_at = now.format(&Rfc3339).map_err(storage_err)?;
        // Random suffix keeps ids unique even for same-second creates.
        let suffix: u32 = rand::thread_rng().gen();
        let ticket = Ticket {
            ticket_id: format!("T-{}-{:08x}", now.unix_timestamp(), suffix),
            title: sanitize_field(title),
            description: sanitize_field(description),
            priority,
            created_at,
        };

        let line = format!(
            "{},{},{},{},{}\n",
            ticket.ticket_id, ticket.title, ticket.description, ticket.priority, ticket.created_at
        );
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(storage_err)?;
        file.write_all(line.as_bytes()).map_err(storage_err)?;

        info!(
            "Created support ticket {} with priority {}",
            ticket.ticket_id, ticket.priority
        );
        Ok(ticket)
    }

    /// All persisted tickets in file order; empty when the log does not
    /// exist yet. Malformed lines are skipped. Sorting and limiting are
    /// the caller's concern.
    pub fn list_recent(&self) -> Result<Vec<Ticket>, AgentError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(storage_err)?;
        let mut tickets = Vec::new();
        for line in raw.lines().skip(1) {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 5 {
                continue;
            }
            tickets.push(Ticket {
                ticket_id: fields[0].to_string(),
                title: fields[1].to_string(),
                description: fields[2].to_string(),
                priority: TicketPriority::parse(fields[3]),
                created_at: fields[4].to_string(),
            });
        }
        Ok(tickets)
    }
}

/// The flat-record format has no escaping, so the delimiter and line
/// breaks must never reach the file.
fn sanitize_field(value: &str) -> String {
    value
        .replace(['\n', '\r', ','], " ")
        .trim()
        .to_string()
}

fn storage_err<E: fmt::Display>(err: E) -> AgentError {
    AgentError::Storage(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, TicketStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TicketStore::new(dir.path().join("support_tickets.csv"));
        (dir, store)
    }

    #[test]
    fn create_then_list_round_trip() {
        let (_dir, store) = temp_store();
        let ticket = store
            .create("Bad data", "Director field garbled", TicketPriority::High)
            .unwrap();

        assert!(ticket.ticket_id.starts_with("T-"));
        assert_eq!(ticket.priority, TicketPriority::High);
        OffsetDateTime::parse(&ticket.created_at, &Rfc3339).expect("RFC 3339 timestamp");

        let listed = store.list_recent().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].ticket_id, ticket.ticket_id);
        assert_eq!(listed[0].priority, TicketPriority::High);
    }

    #[test]
    fn list_is_empty_before_first_write() {
        let (_dir, store) = temp_store();
        assert!(store.list_recent().unwrap().is_empty());
    }

    #[test]
    fn header_is_written_once() {
        let (_dir, store) = temp_store();
        store.create("a", "b", TicketPriority::Medium).unwrap();
        store.create("c", "d", TicketPriority::Medium).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines[0], TICKET_HEADER);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn sanitization_keeps_exactly_five_fields() {
        let (_dir, store) = temp_store();
        store
            .create(
                "Broken, wrong, data\nwith newline",
                "Line one\r\nline two, and a comma",
                TicketPriority::Low,
            )
            .unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let record = raw.lines().nth(1).unwrap();
        assert_eq!(record.split(',').count(), 5);

        let listed = store.list_recent().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].title.contains('\n'));
    }

    #[test]
    fn ids_are_unique_across_rapid_creates() {
        let (_dir, store) = temp_store();
        let a = store.create("a", "x", TicketPriority::Medium).unwrap();
        let b = store.create("b", "y", TicketPriority::Medium).unwrap();
        assert_ne!(a.ticket_id, b.ticket_id);
    }

    #[test]
    fn unknown_priority_parses_to_medium() {
        assert_eq!(TicketPriority::parse("urgent"), TicketPriority::Medium);
        assert_eq!(TicketPriority::parse(""), TicketPriority::Medium);
        assert_eq!(TicketPriority::parse("HIGH"), TicketPriority::High);
        assert_eq!(TicketPriority::parse(" low "), TicketPriority::Low);
    }
}
