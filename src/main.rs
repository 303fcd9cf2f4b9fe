//! Painel Worker - Backend service for the client and appointment panel
//!
//! This worker connects to NATS and handles messages from the frontend.

mod auth;
mod cli;
mod config;
mod db;
mod handlers;
mod services;
mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::handlers::HandlerContext;
use crate::services::appointments::AppointmentService;
use crate::services::broadcaster::NatsBroadcaster;
use crate::services::clients::ClientService;
use crate::services::csv_import::ImportPipeline;
use crate::services::import_processor::ImportProcessor;
use crate::services::stats::StatsPublisher;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs directory - use LOGS_DIR env var or default to ../logs (relative to worker)
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "painel-worker.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,painel_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())  // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))  // file
        .init();

    let config = Config::from_env()?;
    info!("Configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => migrate(&config).await,
        Command::IssueToken { user_id, email } => {
            let token = auth::generate_token(user_id, email.as_deref(), &config.jwt_secret)?;
            println!("{}", token);
            Ok(())
        }
    }
}

async fn migrate(config: &Config) -> Result<()> {
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to run migrations")?;
    let pool = db::create_pool(url).await?;
    db::run_migrations(&pool).await
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Painel Worker...");

    let store = db::create_store(&config).await?;

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (&config.nats_user, &config.nats_password) {
        (Some(user), Some(password)) => {
            async_nats::ConnectOptions::new()
                .user_and_password(user.clone(), password.clone())
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    let broadcaster = Arc::new(NatsBroadcaster::new(nats_client.clone()));
    let stats = Arc::new(StatsPublisher::new(store.clone(), broadcaster.clone()));
    let clients = Arc::new(ClientService::new(store.clone(), stats.clone()));
    let appointments = Arc::new(AppointmentService::new(store.clone(), config.utc_offset));
    let imports = Arc::new(ImportPipeline::new(store.clone(), clients.clone(), broadcaster));

    let processor = Arc::new(ImportProcessor::new(nats_client.clone(), imports.clone()).await?);

    let ctx = Arc::new(HandlerContext {
        store,
        clients,
        appointments,
        stats,
        imports,
        queue: processor.clone(),
        jwt_secret: Arc::new(config.jwt_secret.clone()),
        utc_offset: config.utc_offset,
    });

    // Start message handlers
    let handler_result = handlers::start_handlers(nats_client, ctx, processor).await;

    if let Err(e) = handler_result {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}
