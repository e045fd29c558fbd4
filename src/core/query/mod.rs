mod execute;
mod rewrite;

pub use execute::{QueryExecutor, QueryResult, DEFAULT_MAX_ROWS};
pub use rewrite::normalize;
