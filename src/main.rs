mod cli;
mod config;
mod core;
mod error;
mod interfaces;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_main().await {
        core::terminal::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
