//! Shared fixtures for the service integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value as JsonValue};

use vitrine_core::models::{CallerContext, UploadEvent};
use vitrine_core::{ImageVariantSpec, IngestConfig};
use vitrine_db::{
    DbResult, Document, DocumentStore, DocumentTransaction, MemoryDocumentStore, Query, SetOptions,
};
use vitrine_processing::{
    ImageCodec, ImageResize, ImageVariant, ProcessingError, ProcessingResult, StretchMode,
    VideoCodec, VideoMetadata,
};
use vitrine_services::{IngestDispatcher, WorkOrderService};
use vitrine_storage::{BlobStore, MemoryStorage};

/// Image codec that writes placeholder files with the dimensions a real resize would produce.
pub struct FakeImageCodec {
    pub source: (u32, u32),
    pub fail_hash: bool,
    pub fail_decode: AtomicBool,
}

impl FakeImageCodec {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            source: (width, height),
            fail_hash: false,
            fail_decode: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ImageCodec for FakeImageCodec {
    async fn resize_to_webp(
        &self,
        _input: &Path,
        output_dir: &Path,
        variants: &[ImageVariantSpec],
    ) -> ProcessingResult<Vec<ImageVariant>> {
        if self.fail_decode.load(Ordering::SeqCst) {
            return Err(ProcessingError::Decode("corrupt jpeg".to_string()));
        }
        let (w, h) = self.source;
        let mut out = Vec::new();
        for spec in variants {
            let (width, height) = ImageResize::calculate_dimensions(w, h, spec.width, StretchMode::Off);
            let path = output_dir.join(format!("{}.webp", spec.key()));
            tokio::fs::write(&path, vec![0u8; width as usize]).await?;
            out.push(ImageVariant {
                key: spec.key(),
                path,
                width,
                height,
            });
        }
        Ok(out)
    }

    async fn perceptual_hash(&self, _input: &Path) -> ProcessingResult<String> {
        if self.fail_hash {
            return Err(ProcessingError::Encode {
                format: "blurhash",
                message: "too small".to_string(),
            });
        }
        Ok("LEHV6nWB2yk8pyo0adR*.7kCMdnj".to_string())
    }
}

/// Video codec with scripted metadata, per-height delays and failures.
pub struct FakeVideoCodec {
    pub metadata: VideoMetadata,
    pub delays: HashMap<u32, Duration>,
    pub failing_heights: HashSet<u32>,
    pub started: Mutex<Vec<u32>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub fail_probe: bool,
}

impl FakeVideoCodec {
    pub fn new(metadata: VideoMetadata) -> Self {
        Self {
            metadata,
            delays: HashMap::new(),
            failing_heights: HashSet::new(),
            started: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fail_probe: false,
        }
    }

    pub fn started(&self) -> Vec<u32> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoCodec for FakeVideoCodec {
    async fn probe(&self, _input: &Path) -> ProcessingResult<VideoMetadata> {
        if self.fail_probe {
            return Err(ProcessingError::Probe("no video stream found".to_string()));
        }
        Ok(self.metadata.clone())
    }

    async fn extract_poster(
        &self,
        _input: &Path,
        output: &Path,
        _offset_secs: f64,
        _width: u32,
    ) -> ProcessingResult<()> {
        tokio::fs::write(output, b"jpeg-poster").await?;
        Ok(())
    }

    async fn transcode_to_webm(
        &self,
        _input: &Path,
        output_dir: &Path,
        height: u32,
    ) -> ProcessingResult<PathBuf> {
        self.started.lock().unwrap().push(height);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .get(&height)
            .copied()
            .unwrap_or(Duration::from_millis(5));
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_heights.contains(&height) {
            return Err(ProcessingError::Ffmpeg {
                operation: "transcode",
                stderr: format!("encoder crashed at {}p", height),
            });
        }
        let path = output_dir.join(format!("webm_{}.webm", height));
        tokio::fs::write(&path, vec![1u8; height as usize]).await?;
        Ok(path)
    }
}

pub fn sample_video_metadata() -> VideoMetadata {
    VideoMetadata {
        duration: 12.6,
        width: 1920,
        height: 1080,
        codec: "h264".to_string(),
        bitrate: Some(4_500_000),
        framerate: Some(30.0),
    }
}

pub fn test_ingest_config() -> IngestConfig {
    IngestConfig {
        temp_dir: Some(std::env::temp_dir()),
        ..IngestConfig::default()
    }
}

/// Memory store whose transactional `media` overwrites stall after the first one,
/// simulating a slow store under concurrent redelivery.
pub struct SlowOverwriteStore {
    pub inner: Arc<MemoryDocumentStore>,
    overwrites: Arc<AtomicUsize>,
    delay: Duration,
}

impl SlowOverwriteStore {
    pub fn new(inner: Arc<MemoryDocumentStore>, delay: Duration) -> Self {
        Self {
            inner,
            overwrites: Arc::new(AtomicUsize::new(0)),
            delay,
        }
    }
}

#[async_trait]
impl DocumentStore for SlowOverwriteStore {
    async fn get(&self, collection: &str, id: &str) -> DbResult<Option<JsonValue>> {
        self.inner.get(collection, id).await
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: JsonValue,
        options: SetOptions,
    ) -> DbResult<()> {
        self.inner.set(collection, id, data, options).await
    }

    async fn update(&self, collection: &str, id: &str, fields: JsonValue) -> DbResult<()> {
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> DbResult<()> {
        self.inner.delete(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> DbResult<Vec<Document>> {
        self.inner.query(collection, query).await
    }

    async fn begin(&self) -> DbResult<Box<dyn DocumentTransaction>> {
        Ok(Box::new(SlowOverwriteTransaction {
            inner: self.inner.begin().await?,
            overwrites: self.overwrites.clone(),
            delay: self.delay,
        }))
    }
}

struct SlowOverwriteTransaction {
    inner: Box<dyn DocumentTransaction>,
    overwrites: Arc<AtomicUsize>,
    delay: Duration,
}

#[async_trait]
impl DocumentTransaction for SlowOverwriteTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> DbResult<Option<JsonValue>> {
        self.inner.get(collection, id).await
    }

    async fn query(&mut self, collection: &str, query: &Query) -> DbResult<Vec<Document>> {
        self.inner.query(collection, query).await
    }

    async fn set(
        &mut self,
        collection: &str,
        id: &str,
        data: JsonValue,
        options: SetOptions,
    ) -> DbResult<()> {
        if collection == "media" && self.overwrites.fetch_add(1, Ordering::SeqCst) > 0 {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.set(collection, id, data, options).await
    }

    async fn delete(&mut self, collection: &str, id: &str) -> DbResult<()> {
        self.inner.delete(collection, id).await
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.inner.commit().await
    }
}

pub struct Harness {
    pub blobs: Arc<MemoryStorage>,
    pub documents: Arc<MemoryDocumentStore>,
    pub image: Arc<FakeImageCodec>,
    pub video: Arc<FakeVideoCodec>,
    pub dispatcher: IngestDispatcher,
}

pub fn harness(image: FakeImageCodec, video: FakeVideoCodec) -> Harness {
    harness_with_config(image, video, test_ingest_config())
}

pub fn harness_with_config(
    image: FakeImageCodec,
    video: FakeVideoCodec,
    config: IngestConfig,
) -> Harness {
    let blobs = Arc::new(MemoryStorage::default());
    let documents = Arc::new(MemoryDocumentStore::new());
    let image = Arc::new(image);
    let video = Arc::new(video);
    let dispatcher = IngestDispatcher::new(
        blobs.clone(),
        documents.clone(),
        image.clone(),
        video.clone(),
        config,
    );
    Harness {
        blobs,
        documents,
        image,
        video,
        dispatcher,
    }
}

/// Put an original into the bucket and return its finalize event.
pub async fn upload(
    blobs: &MemoryStorage,
    key: &str,
    content_type: &str,
    metadata: &[(&str, &str)],
) -> UploadEvent {
    let data = Bytes::from_static(b"original-bytes");
    let metadata: HashMap<String, String> = metadata
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    blobs
        .put_object(key, data.clone(), content_type, &metadata)
        .await
        .unwrap();

    let mut event = UploadEvent::new(key, content_type, data.len() as u64);
    event.custom_metadata = metadata;
    event
}

pub async fn media_doc(documents: &MemoryDocumentStore, id: &str) -> JsonValue {
    documents.get("media", id).await.unwrap().expect("media document")
}

pub fn caller() -> CallerContext {
    CallerContext::authenticated("user-1")
}

pub fn work_orders() -> (Arc<MemoryDocumentStore>, WorkOrderService) {
    let store = Arc::new(MemoryDocumentStore::new());
    (store.clone(), WorkOrderService::new(store))
}

pub async fn seed_request(store: &MemoryDocumentStore, id: &str, is_work_order: bool) {
    store
        .set(
            "serviceRequests",
            id,
            json!({
                "isWorkOrder": is_work_order,
                "status": "open",
                "title": "Replace gallery lighting",
            }),
            SetOptions::overwrite(),
        )
        .await
        .unwrap();
}
