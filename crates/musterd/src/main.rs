use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod pipeline;

use config::{Config, PersistenceBackend, ProviderBackend};
use dbus_interface::MusterService;
use muster_core::provider::SyntheticProvider;
use muster_core::{EmbeddingProvider, Gallery, SharedGallery};
use muster_ledger::{AttendanceStore, Ledger, MemoryStore, SqliteStore};
use pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("musterd starting");

    let config = Config::from_env()?;

    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderBackend::Synthetic => Arc::new(SyntheticProvider),
    };

    let report = Gallery::load_dir(provider.as_ref(), &config.gallery_dir)?;
    if report.gallery.is_empty() {
        tracing::warn!(
            dir = %config.gallery_dir.display(),
            "gallery is empty; every face will match as Unknown until a reload"
        );
    }
    tracing::info!(
        entries = report.gallery.len(),
        identities = report.gallery.identity_count(),
        warnings = report.warnings.len(),
        "gallery loaded"
    );
    let gallery = SharedGallery::new(report.gallery);

    let store: Arc<dyn AttendanceStore> = match config.persistence {
        PersistenceBackend::Sqlite => Arc::new(SqliteStore::open(&config.db_path).await?),
        PersistenceBackend::Memory => {
            tracing::warn!("memory persistence selected; attendance will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };
    let ledger = Arc::new(Ledger::new(
        store,
        config.ledger_timezone,
        config.write_timeout,
    ));

    let pipeline = Arc::new(Pipeline::new(
        provider.clone(),
        gallery.clone(),
        ledger.clone(),
        config.match_threshold,
        config.detect_timeout,
    ));

    let service = MusterService::new(
        pipeline,
        ledger,
        gallery,
        provider,
        config.gallery_dir.clone(),
    );

    let _conn = zbus::connection::Builder::session()?
        .name("org.freedesktop.Muster1")?
        .serve_at("/org/freedesktop/Muster1", service)?
        .build()
        .await?;

    tracing::info!(
        threshold = config.match_threshold,
        timezone = %config.ledger_timezone,
        "musterd ready on org.freedesktop.Muster1"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("musterd shutting down");

    Ok(())
}
