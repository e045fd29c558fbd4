use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use crate::error::AgentError;

/// Schema text handed to the model inside the ask_database tool
/// description. Must stay in sync with the dataset build script.
pub const DATABASE_SCHEMA: &str = "\
Table: netflix_titles
Columns: show_id, type, title, directors, cast, countries, date_added, release_year, rating, duration, listed_in, description
";

#[derive(Debug, Clone, Serialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: i64,
}

/// Headline figures for the dashboard and the `summary` command.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub total_rows: i64,
    pub unique_titles: i64,
    pub latest_year: Option<i64>,
    pub by_type: Vec<TypeCount>,
}

pub fn summary(db_path: &Path) -> Result<DatasetSummary, AgentError> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let total_rows = conn.query_row("SELECT COUNT(*) FROM netflix_titles", [], |r| r.get(0))?;
    let unique_titles =
        conn.query_row("SELECT COUNT(DISTINCT title) FROM netflix_titles", [], |r| {
            r.get(0)
        })?;
    let latest_year =
        conn.query_row("SELECT MAX(release_year) FROM netflix_titles", [], |r| {
            r.get(0)
        })?;

    let mut stmt = conn.prepare(
        "SELECT type, COUNT(*) AS count FROM netflix_titles GROUP BY type ORDER BY count DESC",
    )?;
    let by_type = stmt
        .query_map([], |r| {
            Ok(TypeCount {
                kind: r.get(0)?,
                count: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DatasetSummary {
        total_rows,
        unique_titles,
        latest_year,
        by_type,
    })
}
