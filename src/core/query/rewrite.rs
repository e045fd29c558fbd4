use tracing::info;

use crate::error::AgentError;

/// SQLite expression that turns the free-text comma list in `directors`
/// into a valid JSON array literal: strip stray double quotes, turn each
/// comma into `","`, and wrap the whole thing in `["` .. `"]`. The column
/// has no JSON type, so feeding it to json_each raw would blow up on any
/// director name containing a quote character.
const SAFE_DIRECTORS_EXPANSION: &str =
    r#"json_each('["' || REPLACE(REPLACE(IFNULL(directors, ''), '"', ''), ',', '","') || '"]')"#;

/// The two raw-expansion spellings the model is known to emit.
const RAW_EXPANSIONS: [&str; 2] = [
    "json_each(directors)",
    "json_each(IFNULL(directors, ''))",
];

/// Validate statement shape and patch the unsafe directors expansion.
///
/// This is deliberately a fixed-pattern textual rewrite, not a SQL parser:
/// exactly one statement type is allowed and exactly one unsafe idiom is
/// recognized. Anything else is rejected rather than sanitized.
pub fn normalize(sql: &str) -> Result<String, AgentError> {
    let stripped = sql.trim();
    if stripped.is_empty() {
        return Err(AgentError::InvalidQuery("Empty SQL query.".to_string()));
    }

    let lowered = stripped.to_lowercase();
    if !(lowered.starts_with("select") || lowered.starts_with("with")) {
        return Err(AgentError::InvalidQuery(
            "Only SELECT statements (optionally starting with WITH) are allowed.".to_string(),
        ));
    }

    let mut safe_sql = stripped.to_string();
    for raw in RAW_EXPANSIONS {
        safe_sql = safe_sql.replace(raw, SAFE_DIRECTORS_EXPANSION);
    }
    if safe_sql != stripped {
        info!("Adjusted query for safe JSON expansion over directors");
    }

    if safe_sql.matches(';').count() > 1 {
        return Err(AgentError::InvalidQuery(
            "Multiple statements are not allowed.".to_string(),
        ));
    }

    Ok(safe_sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace_input() {
        assert!(matches!(normalize(""), Err(AgentError::InvalidQuery(_))));
        assert!(matches!(normalize("   \n\t "), Err(AgentError::InvalidQuery(_))));
    }

    #[test]
    fn rejects_non_select_statements() {
        for sql in [
            "UPDATE netflix_titles SET title = 'x'",
            "DELETE FROM netflix_titles",
            "DROP TABLE netflix_titles",
            "PRAGMA table_info(netflix_titles)",
            "INSERT INTO netflix_titles VALUES (1)",
        ] {
            assert!(
                matches!(normalize(sql), Err(AgentError::InvalidQuery(_))),
                "should reject: {sql}"
            );
        }
    }

    #[test]
    fn accepts_select_and_with_case_insensitively() {
        assert!(normalize("select * from netflix_titles").is_ok());
        assert!(normalize("  SELECT 1").is_ok());
        assert!(normalize("WITH t AS (SELECT 1) SELECT * FROM t").is_ok());
        assert!(normalize("with t as (select 1) select * from t").is_ok());
    }

    #[test]
    fn rejects_stacked_statements() {
        let err = normalize("SELECT 1; SELECT 2;");
        assert!(matches!(err, Err(AgentError::InvalidQuery(_))));
    }

    #[test]
    fn tolerates_a_single_trailing_terminator() {
        assert!(normalize("SELECT 1;").is_ok());
    }

    #[test]
    fn rewrites_raw_directors_expansion() {
        let out = normalize("SELECT value FROM netflix_titles, json_each(directors)")
            .expect("valid query");
        assert!(!out.contains("json_each(directors)"));
        assert!(out.contains(SAFE_DIRECTORS_EXPANSION));
    }

    #[test]
    fn rewrites_ifnull_variant() {
        let out = normalize(
            "SELECT TRIM(value) FROM netflix_titles, json_each(IFNULL(directors, ''))",
        )
        .expect("valid query");
        assert!(!out.contains("json_each(IFNULL(directors, ''))"));
        assert!(out.contains(SAFE_DIRECTORS_EXPANSION));
    }

    #[test]
    fn leaves_queries_without_the_pattern_untouched() {
        let sql = "SELECT title, release_year FROM netflix_titles WHERE release_year > 2015";
        assert_eq!(normalize(sql).expect("valid query"), sql);
    }
}
