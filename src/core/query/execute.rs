use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AgentError;

pub const DEFAULT_MAX_ROWS: usize = 200;

/// Column names plus a row-limited result set. `truncated` signals that the
/// underlying query produced more rows than were returned.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    #[serde(skip)]
    pub truncated: bool,
}

/// Runs already-normalized queries against the read-only dataset. A fresh
/// connection is opened per call and released on every exit path; statement
/// shape is the rewriter's contract, not re-checked here.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    db_path: PathBuf,
    max_rows: usize,
}

impl QueryExecutor {
    pub fn new<P: AsRef<Path>>(db_path: P, max_rows: usize) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            max_rows,
        }
    }

    pub fn execute(&self, sql: &str) -> Result<QueryResult, AgentError> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        info!("Executing SQL: {}", sql);

        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let column_count = columns.len();

        let mut result_rows = Vec::new();
        let mut truncated = false;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            if result_rows.len() == self.max_rows {
                warn!("Result truncated to first {} rows", self.max_rows);
                truncated = true;
                break;
            }
            let mut record = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                record.push(value_to_json(row.get_ref(idx)?));
            }
            result_rows.push(record);
        }
        info!("Query returned {} rows", result_rows.len());

        Ok(QueryResult {
            columns,
            rows: result_rows,
            truncated,
        })
    }
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob: {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::normalize;

    fn seed_titles(path: &Path, titles: &[(&str, Option<&str>, i64)]) {
        let conn = Connection::open(path).unwrap();
        conn.execute(
            "CREATE TABLE netflix_titles (
                show_id TEXT PRIMARY KEY,
                type TEXT,
                title TEXT,
                directors TEXT,
                release_year INTEGER
            )",
            [],
        )
        .unwrap();
        for (i, (title, directors, year)) in titles.iter().enumerate() {
            conn.execute(
                "INSERT INTO netflix_titles (show_id, type, title, directors, release_year)
                 VALUES (?1, 'Movie', ?2, ?3, ?4)",
                rusqlite::params![format!("s{i}"), title, directors, year],
            )
            .unwrap();
        }
    }

    #[test]
    fn returns_columns_in_statement_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("netflix.db");
        seed_titles(&db, &[("Movie A", None, 2020)]);

        let result = QueryExecutor::new(&db, DEFAULT_MAX_ROWS)
            .execute("SELECT release_year, title FROM netflix_titles")
            .unwrap();
        assert_eq!(result.columns, vec!["release_year", "title"]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][0], serde_json::json!(2020));
        assert_eq!(result.rows[0][1], serde_json::json!("Movie A"));
        assert!(!result.truncated);
    }

    #[test]
    fn truncates_at_the_configured_maximum() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("netflix.db");
        let titles: Vec<(String, Option<&str>, i64)> = (0..500)
            .map(|i| (format!("Title {i}"), None, 2000 + (i % 20)))
            .collect();
        let borrowed: Vec<(&str, Option<&str>, i64)> =
            titles.iter().map(|(t, d, y)| (t.as_str(), *d, *y)).collect();
        seed_titles(&db, &borrowed);

        let result = QueryExecutor::new(&db, 200)
            .execute("SELECT title FROM netflix_titles")
            .unwrap();
        assert_eq!(result.rows.len(), 200);
        assert!(result.truncated);
    }

    #[test]
    fn exact_fit_is_not_flagged_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("netflix.db");
        seed_titles(&db, &[("A", None, 2020), ("B", None, 2021)]);

        let result = QueryExecutor::new(&db, 2)
            .execute("SELECT title FROM netflix_titles")
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(!result.truncated);
    }

    #[test]
    fn surfaces_engine_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("netflix.db");
        seed_titles(&db, &[("A", None, 2020)]);

        let err = QueryExecutor::new(&db, DEFAULT_MAX_ROWS)
            .execute("SELECT no_such_column FROM netflix_titles")
            .unwrap_err();
        assert!(matches!(err, AgentError::QueryExecution(_)));
        assert!(err.to_string().contains("no_such_column"));
    }

    #[test]
    fn rewritten_directors_expansion_survives_commas_and_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("netflix.db");
        seed_titles(
            &db,
            &[
                ("Heist", Some(r#"Jane "JJ" Doe, John Roe"#), 2019),
                ("Sequel", Some("John Roe"), 2021),
                ("Mystery", None, 2022),
            ],
        );

        let sql = normalize(
            "WITH director_cte AS (
                SELECT TRIM(value) AS director
                FROM netflix_titles, json_each(directors)
                WHERE TRIM(value) <> ''
            )
            SELECT director, COUNT(*) AS count
            FROM director_cte GROUP BY director ORDER BY count DESC",
        )
        .unwrap();

        let result = QueryExecutor::new(&db, DEFAULT_MAX_ROWS)
            .execute(&sql)
            .unwrap();
        let directors: Vec<(String, i64)> = result
            .rows
            .iter()
            .map(|r| (r[0].as_str().unwrap().to_string(), r[1].as_i64().unwrap()))
            .collect();
        assert_eq!(directors[0], ("John Roe".to_string(), 2));
        assert!(directors.contains(&("Jane JJ Doe".to_string(), 1)));
    }
}
