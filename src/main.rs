use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use courier::config::Config;
use courier::core::{
    FileCollector,
    JsonFileStore,
    MetadataStore,
    ResumeLedger,
    SchedulerBuilder,
    SessionStatus,
    StaticToken,
    TokenProvider,
    UploadEvent,
};
use courier::uploaders::{HttpMetadataStore, HttpUploader};
use courier::utils::{format_bytes, format_stats};
use tracing_subscriber::EnvFilter;

/// 用法：courier <config.toml> <path>...
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config.toml".to_string());
    let paths: Vec<PathBuf> = args.map(PathBuf::from).collect();
    if paths.is_empty() {
        anyhow::bail!("usage: courier <config.toml> <path>...");
    }

    let config = Config::load(&config_path).with_context(|| format!("loading {}", config_path))?;
    tracing::info!(config = %config_path, bucket = %config.storage.bucket, "configuration loaded");

    let tokens: Arc<dyn TokenProvider> = Arc::new(StaticToken(config.storage.token.clone()));
    let uploader = HttpUploader::new(config.storage_config(), tokens.clone())?;

    let mut builder = SchedulerBuilder::new(Arc::new(uploader)).config(config.scheduler_config());
    if let Some(dir) = &config.upload.ledger_dir {
        builder = builder.ledger(ResumeLedger::new(Arc::new(JsonFileStore::new(dir))));
    }
    if let Some(metadata) = &config.metadata {
        let store: Arc<dyn MetadataStore> =
            Arc::new(HttpMetadataStore::new(&metadata.base_url, &metadata.table, tokens.clone())?);
        builder = builder.metadata_store(store);
    }
    let handle = builder.spawn();
    let scheduler = handle.scheduler.clone();

    let items = FileCollector::collect_paths(&paths).await;
    let total: u64 = items.iter().map(|item| item.total_bytes).sum();
    tracing::info!(files = items.len(), size = %format_bytes(total), "files collected");

    scheduler.add_items(items).await?;
    let session_id = scheduler.start_upload().await?;
    tracing::info!(session = %session_id, "upload started");

    // 进度日志
    let reporter = {
        let scheduler = scheduler.clone();
        let mut events = scheduler.subscribe_events();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if scheduler.snapshot().status() == SessionStatus::Uploading {
                            tracing::info!("{}", format_stats(&scheduler.stats()));
                        }
                    }
                    event = events.recv() => match event {
                        Ok(UploadEvent::FileCompleted(item)) => {
                            tracing::info!(path = %item.relative_path, url = ?item.result_url, "file completed");
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "progress reporter lagged");
                        }
                        Err(_) => break,
                    }
                }
            }
        })
    };

    let session = tokio::select! {
        session = scheduler.wait_settled() => session?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, pausing upload");
            scheduler.pause_upload().await?
        }
    };

    reporter.abort();
    match session.status() {
        SessionStatus::Completed => tracing::info!(files = session.completed_files(), "all files uploaded"),
        SessionStatus::Paused => tracing::info!(session = %session_id, completed = session.completed_files(), "upload paused"),
        status => {
            for item in session.items().iter().filter(|item| item.error.is_some()) {
                tracing::warn!(path = %item.relative_path, error = ?item.error, "file failed");
            }
            tracing::warn!(?status, failed = session.failed_files(), "upload finished with failures");
        }
    }

    drop(scheduler);
    handle.shutdown().await?;
    Ok(())
}
