use std::sync::Arc;

use anyhow::Context;
use vitrine_core::Config;
use vitrine_db::{create_document_store, DocumentStore};
use vitrine_processing::{FfmpegVideoCodec, WebpImageCodec};
use vitrine_services::{IngestDispatcher, WorkOrderService};
use vitrine_storage::{create_storage, BlobStore};

/// Adapters built from configuration, shared by every command.
pub struct App {
    pub config: Config,
    pub blobs: Arc<dyn BlobStore>,
    pub documents: Arc<dyn DocumentStore>,
}

impl App {
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let blobs = create_storage(&config.storage)
            .await
            .context("Failed to initialize blob storage")?;
        let documents = create_document_store(&config.documents)
            .await
            .context("Failed to initialize document store")?;

        tracing::info!(
            environment = %config.environment,
            storage_backend = ?config.storage.backend,
            document_backend = ?config.documents.backend,
            "Vitrine adapters initialized"
        );
        Ok(Self {
            config,
            blobs,
            documents,
        })
    }

    pub fn dispatcher(&self) -> anyhow::Result<IngestDispatcher> {
        let ingest = &self.config.ingest;
        let image = Arc::new(WebpImageCodec::new(ingest.webp_quality));
        let video = Arc::new(
            FfmpegVideoCodec::new(ingest.ffmpeg_path.clone(), ingest.ffprobe_path.clone())
                .context("Invalid ffmpeg configuration")?,
        );
        Ok(IngestDispatcher::new(
            self.blobs.clone(),
            self.documents.clone(),
            image,
            video,
            ingest.clone(),
        ))
    }

    pub fn work_orders(&self) -> WorkOrderService {
        WorkOrderService::new(self.documents.clone())
    }
}
