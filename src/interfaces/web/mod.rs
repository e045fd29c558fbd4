pub mod handlers;
pub mod router;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::core::agent::ToolDispatcher;
use crate::core::tickets::TicketStore;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ToolDispatcher>,
    pub tickets: Arc<TicketStore>,
    pub db_path: PathBuf,
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = router::build_api_router(state, port);
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    info!("flixql API listening on http://{}:{}", host, port);
    axum::serve(listener, app).await?;
    Ok(())
}
