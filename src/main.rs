mod api;
mod app;
mod auth;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;

use app::App;
use config::Config;
use error::Result;

#[tokio::main]
async fn main() {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let action = cli::parse_args(args.get(1..).unwrap_or_default())?;

    let config = Config::load()?;
    let app = App::new(&config)?;

    app.handle_action(action).await
}
