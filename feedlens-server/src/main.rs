//! feedlens-server - customer feedback ingestion and analysis service
//!
//! Startup: tracing → configuration → database → model client → HTTP.

use anyhow::Result;
use clap::Parser;
use feedlens_common::config::{load_or_default, resolve_database_path, resolve_port};
use feedlens_server::analysis::{AnalysisService, LanguageModel, OpenAiClient};
use feedlens_server::waitlist::{EphemeralWaitlist, FallbackWaitlist, SqliteWaitlist};
use feedlens_server::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "feedlens-server")]
#[command(about = "Customer feedback ingestion and analysis service")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "FEEDLENS_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Issue an API token for OWNER, print it and exit
    #[arg(long, value_name = "OWNER")]
    add_token: Option<String>,

    /// Label stored with a token issued by --add-token
    #[arg(long, requires = "add_token")]
    token_label: Option<String>,
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The log level lives in the config file, so a config error is reported
    // on stderr before tracing exists
    let config = match load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("feedlens-server: {}", e);
            return Err(e.into());
        }
    };

    init_tracing(&config.logging.level);

    info!(
        "Starting feedlens-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let db_path = resolve_database_path(args.database.as_deref(), &config);
    info!("Database: {}", db_path.display());

    let pool = match feedlens_server::db::init_database_pool(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    if let Some(owner) = args.add_token.as_deref() {
        let token = feedlens_server::db::tokens::issue_token(&pool, owner, args.token_label.as_deref())
            .await?;
        info!(owner_id = %owner.trim(), "API token issued");
        println!("{}", token);
        return Ok(());
    }

    let model: Option<Arc<dyn LanguageModel>> =
        match feedlens_server::config::resolve_llm_api_key(&config) {
            Some(key) => match OpenAiClient::new(&config.llm, key) {
                Ok(client) => {
                    info!(
                        base_url = %config.llm.base_url,
                        chat_model = %config.llm.chat_model,
                        embedding_model = %config.llm.embedding_model,
                        "Language model client ready"
                    );
                    Some(Arc::new(client))
                }
                Err(e) => {
                    warn!("Language model client unavailable, using keyword fallback: {}", e);
                    None
                }
            },
            None => None,
        };

    let analyzer = AnalysisService::new(model, &config.llm);
    let waitlist = FallbackWaitlist::new(
        Arc::new(SqliteWaitlist::new(pool.clone())),
        EphemeralWaitlist::default(),
    );

    let state = AppState::new(pool, analyzer, waitlist, config.limits.clone());
    let app = build_router(state);

    let port = resolve_port(args.port, &config);
    let addr = format!("{}:{}", config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
