pub mod agent;
pub mod dataset;
pub mod llm;
pub mod query;
pub mod terminal;
pub mod tickets;
