//! Issue cache CLI application
//!
//! Command-line interface for downloading periodical issues into a local
//! cache, inspecting their state and deleting them again.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use issue_cache::app::ContentService;
use issue_cache::cli::{
    handle_delete, handle_download, handle_file, handle_metadata, handle_status, Cli, Commands,
};
use issue_cache::config::AppConfig;
use issue_cache::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    let mut config = AppConfig::load(cli.global.config.as_deref()).await?;
    if let Some(root) = &cli.global.storage_root {
        config.storage.root = Some(root.clone());
    }

    init_logging(&cli, &config);
    info!("Issue cache v{} starting", env!("CARGO_PKG_VERSION"));

    let service = ContentService::from_config(&config).await?;
    let quiet = cli.global.quiet;

    match cli.command {
        Commands::Download(args) => handle_download(&service, args, quiet).await,
        Commands::Metadata(args) => handle_metadata(&service, args, quiet).await,
        Commands::Delete(args) => handle_delete(&service, args, quiet).await,
        Commands::Status(args) => handle_status(&service, args).await,
        Commands::File(args) => handle_file(&service, args, quiet).await,
    }
}

/// Initialize logging from CLI verbosity, falling back to the configured level
fn init_logging(cli: &Cli, config: &AppConfig) {
    let level = cli
        .log_level()
        .map(|level| level.to_string().to_lowercase())
        .unwrap_or_else(|| config.logging.level.clone());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("issue_cache={}", level)))
        .unwrap_or_else(|_| EnvFilter::new("issue_cache=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(config.logging.colored_output)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    }
}
