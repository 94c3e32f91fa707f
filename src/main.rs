use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sms_spam_report::config::AppConfig;
use sms_spam_report::db::Database;
use sms_spam_report::file_writer::{read_seed_file, write_export_file};
use sms_spam_report::logging::{init_logging, OperationTimer};
use sms_spam_report::models::ReportView;
use sms_spam_report::server::{router, AppState};
use sms_spam_report::repository::SqliteReportRepository;
use sms_spam_report::service::{ReportParams, ReportService};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind, overrides `server.bind_addr`
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Write a CSV export to a file
    Export {
        /// Report view (content or frequency)
        #[arg(short, long, default_value = "content")]
        view: String,

        /// Window start (ISO 8601 with offset, or epoch)
        #[arg(short, long)]
        from: Option<String>,

        /// Window end (ISO 8601 with offset, or epoch)
        #[arg(short, long)]
        to: Option<String>,

        /// Case-insensitive message text filter
        #[arg(long)]
        text_keyword: Option<String>,

        /// Case-insensitive sender phone filter (content view only)
        #[arg(long)]
        phone_num: Option<String>,

        /// Output file
        #[arg(short, long, default_value = "./output/export.csv")]
        output: PathBuf,
    },
    /// Load raw message rows from a CSV file
    Seed {
        /// CSV file with a header matching the table's column names
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load_from(cli.config.as_deref())?;

    // Initialize logging
    let log_file = config.logging.file_path.as_ref().map(PathBuf::from);
    let _guard = init_logging(Some(&config.get_log_level()), log_file.as_deref(), &config.logging.format)?;

    info!("Starting sms-spam-report");

    // Initialize database with configuration
    let db = Arc::new(
        Database::new(&config.get_database_path(), &config.database).context("Failed to open database")?,
    );

    // Process command
    match cli.command {
        Commands::Serve { bind } => serve(&config, db, bind).await?,
        Commands::Export {
            view,
            from,
            to,
            text_keyword,
            phone_num,
            output,
        } => {
            let params = ReportParams {
                from_datetime: from,
                to_datetime: to,
                text_keyword,
                phone_num,
                ..ReportParams::default()
            };
            export(&config, db, &view, &params, &output).await?;
        }
        Commands::Seed { file } => seed(&db, &file)?,
    }

    Ok(())
}

/// Serve the HTTP API until Ctrl-C
async fn serve(config: &AppConfig, db: Arc<Database>, bind: Option<String>) -> Result<()> {
    let bind_addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
    let app = router(AppState::from_database(db, config), config.server.request_body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;

    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Buffered export of one view to a file
async fn export(config: &AppConfig, db: Arc<Database>, view: &str, params: &ReportParams, output: &Path) -> Result<()> {
    let timer = OperationTimer::new("cli_export");
    let view: ReportView = view.parse()?;

    let repository = Arc::new(SqliteReportRepository::new(db, config));
    let service = ReportService::new(repository, config);

    let body = service.export_buffered(view, params).await?;
    let bytes = write_export_file(&body, output)?;

    info!("Exported {} view to {} ({} bytes)", view, output.display(), bytes);
    timer.finish();
    Ok(())
}

/// Bulk-load message rows
fn seed(db: &Database, file: &Path) -> Result<()> {
    let timer = OperationTimer::new("seed");
    let records = read_seed_file(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let inserted = db.insert_messages(&records)?;

    info!("Seeded {} of {} rows from {}", inserted, records.len(), file.display());
    timer.finish();
    Ok(())
}
