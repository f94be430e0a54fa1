use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::{io::AsyncReadExt, net::TcpListener};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod testing;

use config::{AppConfig, Command};
use handlers::AppState;
use models::event::QueueBatch;
use services::{
    assembler::RecordAssembler,
    enumerator::Enumerator,
    metadata_store::{MetadataStore, SqliteMetadataStore},
    reconciler::Reconciler,
    source_client::{HttpMetadataSource, MetadataSource},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    tracing::info!(
        table = %cfg.table_name,
        region = %cfg.source.region,
        profile = cfg.source.profile.as_deref().unwrap_or("default"),
        endpoint = %cfg.source.endpoint,
        "Starting read-set-metadata-sync"
    );

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    let db_path = db_path.split('?').next().unwrap_or(db_path);

    if db_path != ":memory:" {
        let db_path_obj = Path::new(db_path);

        // Create parent directory if needed
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        // SQLx will not create a missing database file on its own
        if !db_path_obj.exists() {
            std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(db_path_obj)
                .with_context(|| format!("creating database file {}", db_path))?;
            tracing::info!("Created database file {}", db_path);
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    let store = SqliteMetadataStore::new(db, cfg.table_name.clone(), cfg.source.retry.clone())?;
    store.migrate().await?;

    // --- Handle migration mode ---
    if command == Command::Migrate {
        tracing::info!("Table `{}` is ready.", store.table());
        return Ok(()); // exit after migration
    }

    let source: Arc<dyn MetadataSource> = Arc::new(HttpMetadataSource::new(&cfg.source)?);
    let store_writer: Arc<dyn MetadataStore> = Arc::new(store.clone());

    match command {
        Command::Serve {
            partial_batch_response,
            ..
        } => {
            let reconciler = Reconciler::new(
                RecordAssembler::new(source),
                store_writer,
                partial_batch_response,
            );
            serve(&cfg, AppState { reconciler, store }).await
        }
        Command::Backfill {
            ref seq_store_id, ..
        } => {
            let options = command.backfill_options().unwrap_or_default();
            tracing::info!("Sequence Store ID: {}", seq_store_id);

            let summary = Enumerator::new(source, store_writer, options)
                .run(seq_store_id)
                .await?;

            println!("{}", serde_json::to_string_pretty(&summary)?);
            if !summary.is_success() {
                anyhow::bail!(
                    "backfill of {} finished with {} failed read sets out of {}",
                    summary.store_id,
                    summary.failed,
                    summary.processed
                );
            }
            tracing::info!(
                "Backfill complete: {} processed, {} written, {} skipped",
                summary.processed,
                summary.written,
                summary.skipped
            );
            Ok(())
        }
        Command::Reconcile {
            file,
            partial_batch_response,
        } => {
            let raw = match file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading batch from {}", path.display()))?,
                None => {
                    let mut raw = String::new();
                    tokio::io::stdin().read_to_string(&mut raw).await?;
                    raw
                }
            };
            let batch: QueueBatch = serde_json::from_str(&raw).context("parsing queue batch")?;

            let reconciler = Reconciler::new(
                RecordAssembler::new(source),
                store_writer,
                partial_batch_response,
            );
            let response = reconciler.handle_batch(&batch).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Command::Migrate => Ok(()),
    }
}

/// Bind the listener and serve the router until the process is stopped.
async fn serve(cfg: &AppConfig, state: AppState) -> Result<()> {
    let app: Router = routes::routes::routes().with_state(state);

    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
