use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use keymint::config::Config;
use keymint::db::{self, AppState};
use keymint::email::EmailService;
use keymint::handlers;
use keymint::ratelimit::RateLimiter;

#[derive(Parser)]
#[command(name = "keymint", about = "License issuance and download authorization service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create the database schema and exit
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.default_log_filter().into()),
        )
        .init();

    let pool = db::open_pool(&config.database_path)
        .with_context(|| format!("failed to open database at {}", config.database_path))?;

    {
        let conn = pool.get().context("failed to get database connection")?;
        db::init_db(&conn).context("failed to initialize schema")?;
    }

    if let Some(Command::InitDb) = cli.command {
        tracing::info!(path = %config.database_path, "database initialized");
        return Ok(());
    }

    if config.payment_webhook_secret.is_none() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET is not set; webhook delivery will be rejected");
    }

    let limiter = RateLimiter::in_memory();
    limiter.start_sweeper(Duration::from_secs(60));

    let email = EmailService::new(config.resend_api_key.clone(), config.email_from.clone());

    let addr = config.addr();
    let state = AppState {
        db: pool,
        limiter,
        email,
        config: Arc::new(config),
    };

    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(%addr, "keymint listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
