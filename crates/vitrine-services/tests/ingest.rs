mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use vitrine_db::{DocumentStore, MemoryDocumentStore};
use vitrine_storage::{BlobStore, MemoryStorage};
use vitrine_services::{IngestDispatcher, PipelineError};
use vitrine_worker::HandlerOutcome;

use helpers::{
    harness, harness_with_config, media_doc, sample_video_metadata, test_ingest_config, upload,
    FakeImageCodec, FakeVideoCodec, SlowOverwriteStore,
};

fn derivative_names(doc: &JsonValue) -> Vec<String> {
    doc["paths"]["derivatives"]
        .as_object()
        .map(|d| d.keys().cloned().collect())
        .unwrap_or_default()
}

fn default_video() -> FakeVideoCodec {
    FakeVideoCodec::new(sample_video_metadata())
}

#[tokio::test]
async fn photo_upload_produces_webp_variants() {
    let h = harness(FakeImageCodec::new(2000, 1500), default_video());
    let event = upload(
        &h.blobs,
        "uploads/images/42/photo.jpg",
        "image/jpeg",
        &[("uploadId", "photo1"), ("originalFilename", "Sunset.jpg")],
    )
    .await;

    let outcome = h.dispatcher.dispatch(&event).await.unwrap();
    assert_eq!(
        outcome,
        HandlerOutcome::Processed {
            media_id: "photo1".to_string()
        }
    );

    let doc = media_doc(&h.documents, "photo1").await;
    assert_eq!(doc["processed"], true);
    assert_eq!(doc["type"], "image");
    assert_eq!(doc["originalFilename"], "Sunset.jpg");
    assert_eq!(doc["processing"]["stage"], "done");
    assert_eq!(doc["processing"]["progress"], 100);
    assert_eq!(
        derivative_names(&doc),
        vec!["webp_large", "webp_medium", "webp_small", "webp_thumb"]
    );
    for (name, entry) in doc["paths"]["derivatives"].as_object().unwrap() {
        let path = format!("media/photo1/{}.webp", name);
        assert_eq!(entry["storagePath"], path.as_str());
        let url = entry["downloadURL"].as_str().unwrap();
        assert!(url.starts_with(&format!("memory://bucket/{}?token=", path)), "{}", url);
        assert!(entry["width"].as_u64().unwrap() <= 2000);
    }
    // The largest variant is capped at the source width.
    assert_eq!(doc["width"], 2000);
    assert_eq!(doc["height"], 1500);
    assert_eq!(doc["paths"]["derivatives"]["webp_thumb"]["width"], 320);
    assert_eq!(doc["paths"]["derivatives"]["webp_thumb"]["height"], 240);
    assert!(doc["blurHash"].is_string());
    assert!(doc["paths"]["original"]["downloadURL"].is_null());
    assert_eq!(doc["paths"]["original"]["storagePath"], "uploads/images/42/photo.jpg");

    assert!(!h.blobs.exists("uploads/images/42/photo.jpg").await.unwrap());
    assert_eq!(h.blobs.keys().await.len(), 4);
}

#[tokio::test]
async fn redelivered_event_after_success_changes_nothing() {
    let h = harness(FakeImageCodec::new(800, 600), default_video());
    let event = upload(
        &h.blobs,
        "uploads/images/1/a.png",
        "image/png",
        &[("uploadId", "again")],
    )
    .await;

    h.dispatcher.dispatch(&event).await.unwrap();
    let keys = h.blobs.keys().await;
    let before = media_doc(&h.documents, "again").await;

    let outcome = h.dispatcher.dispatch(&event).await.unwrap();
    assert_eq!(
        outcome,
        HandlerOutcome::AlreadyProcessed {
            media_id: "again".to_string()
        }
    );
    assert_eq!(h.blobs.keys().await, keys);
    assert_eq!(media_doc(&h.documents, "again").await, before);
    assert_eq!(h.documents.count("media").await, 1);
}

#[tokio::test]
async fn concurrent_redelivery_never_resets_a_processed_asset() {
    let blobs = Arc::new(MemoryStorage::default());
    let documents = Arc::new(MemoryDocumentStore::new());
    let store = Arc::new(SlowOverwriteStore::new(documents.clone(), Duration::from_millis(300)));
    let dispatcher = IngestDispatcher::new(
        blobs.clone(),
        store,
        Arc::new(FakeImageCodec::new(800, 600)),
        Arc::new(default_video()),
        test_ingest_config(),
    );
    let event = upload(&blobs, "uploads/images/1/dup.jpg", "image/jpeg", &[("uploadId", "dup")]).await;

    let (first, second) = tokio::join!(dispatcher.dispatch(&event), dispatcher.dispatch(&event));
    let outcomes = [&first, &second];
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Ok(HandlerOutcome::Processed { .. }))),
        "{:?}",
        outcomes
    );

    let doc = media_doc(&documents, "dup").await;
    assert_eq!(doc["processed"], true);
    assert_eq!(doc["processing"]["stage"], "done");
    assert_eq!(derivative_names(&doc).len(), 4);

    let again = dispatcher.dispatch(&event).await.unwrap();
    assert_eq!(
        again,
        HandlerOutcome::AlreadyProcessed {
            media_id: "dup".to_string()
        }
    );
}

#[tokio::test]
async fn failed_run_removes_its_workspace() {
    let workspace_root = tempfile::tempdir().unwrap();
    let config = vitrine_core::IngestConfig {
        temp_dir: Some(workspace_root.path().to_path_buf()),
        ..test_ingest_config()
    };
    let mut video = default_video();
    video.failing_heights.insert(360);
    let h = harness_with_config(FakeImageCodec::new(800, 600), video, config);
    h.image.fail_decode.store(true, Ordering::SeqCst);

    let photo = upload(&h.blobs, "uploads/images/w.jpg", "image/jpeg", &[("uploadId", "w1")]).await;
    assert!(h.dispatcher.dispatch(&photo).await.is_err());
    let clip = upload(&h.blobs, "uploads/videos/w.mp4", "video/mp4", &[("uploadId", "w2")]).await;
    assert!(h.dispatcher.dispatch(&clip).await.is_err());

    let leftovers: Vec<_> = std::fs::read_dir(workspace_root.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}

#[tokio::test]
async fn unfinished_asset_is_reprocessed_from_scratch() {
    let h = harness(FakeImageCodec::new(800, 600), default_video());
    h.image.fail_decode.store(true, Ordering::SeqCst);
    let event = upload(
        &h.blobs,
        "uploads/images/1/b.png",
        "image/png",
        &[("uploadId", "retry")],
    )
    .await;

    assert!(h.dispatcher.dispatch(&event).await.is_err());
    let doc = media_doc(&h.documents, "retry").await;
    assert_eq!(doc["processed"], false);
    assert_eq!(doc["processing"]["stage"], "downloaded");
    assert_eq!(doc["processing"]["progress"], 35);
    // The original stays in place for a retry.
    assert!(h.blobs.exists("uploads/images/1/b.png").await.unwrap());

    h.image.fail_decode.store(false, Ordering::SeqCst);
    let outcome = h.dispatcher.dispatch(&event).await.unwrap();
    assert!(matches!(outcome, HandlerOutcome::Processed { .. }));
    let doc = media_doc(&h.documents, "retry").await;
    assert_eq!(doc["processed"], true);
    assert_eq!(derivative_names(&doc).len(), 4);
}

#[tokio::test]
async fn corrupt_image_is_not_retryable() {
    let h = harness(FakeImageCodec::new(800, 600), default_video());
    h.image.fail_decode.store(true, Ordering::SeqCst);
    let event = upload(&h.blobs, "uploads/images/c.jpg", "image/jpeg", &[("uploadId", "bad")]).await;

    let err = h.dispatcher.dispatch(&event).await.unwrap_err();
    assert!(matches!(err, PipelineError::Codec { .. }));
    assert!(!err.is_retryable());
    assert!(!vitrine_core::EventError::from(err).is_retryable());
}

#[tokio::test]
async fn blurhash_failure_leaves_hash_empty() {
    let mut image = FakeImageCodec::new(640, 480);
    image.fail_hash = true;
    let h = harness(image, default_video());
    let event = upload(&h.blobs, "uploads/images/d.jpg", "image/jpeg", &[("uploadId", "nohash")]).await;

    h.dispatcher.dispatch(&event).await.unwrap();
    let doc = media_doc(&h.documents, "nohash").await;
    assert_eq!(doc["processed"], true);
    assert!(doc["blurHash"].is_null());
    assert!(doc.as_object().unwrap().contains_key("blurHash"));
    assert_eq!(doc["width"], 640);
}

#[tokio::test]
async fn failed_original_delete_does_not_fail_the_run() {
    let h = harness(FakeImageCodec::new(1024, 768), default_video());
    let event = upload(&h.blobs, "uploads/images/e.jpg", "image/jpeg", &[("uploadId", "keep")]).await;
    h.blobs.set_fail_deletes(true);

    let outcome = h.dispatcher.dispatch(&event).await.unwrap();
    assert!(matches!(outcome, HandlerOutcome::Processed { .. }));
    assert_eq!(media_doc(&h.documents, "keep").await["processed"], true);
    assert!(h.blobs.exists("uploads/images/e.jpg").await.unwrap());
}

#[tokio::test]
async fn events_outside_the_upload_prefixes_are_skipped() {
    let h = harness(FakeImageCodec::new(100, 100), default_video());
    let pdf = upload(&h.blobs, "uploads/images/doc.pdf", "application/pdf", &[]).await;
    let derivative = upload(&h.blobs, "media/x/webp_thumb.webp", "image/webp", &[]).await;
    let misplaced = upload(&h.blobs, "uploads/videos/still.jpg", "image/jpeg", &[]).await;

    for event in [pdf, derivative, misplaced] {
        assert_eq!(h.dispatcher.dispatch(&event).await.unwrap(), HandlerOutcome::Skipped);
    }
    assert_eq!(h.documents.count("media").await, 0);
}

#[tokio::test]
async fn missing_original_is_a_precondition_failure() {
    let h = harness(FakeImageCodec::new(100, 100), default_video());
    let event = vitrine_core::models::UploadEvent::new("uploads/images/gone.jpg", "image/jpeg", 10)
        .with_metadata("uploadId", "gone");

    let err = h.dispatcher.dispatch(&event).await.unwrap_err();
    assert!(matches!(err, PipelineError::Precondition(_)));
}

#[tokio::test]
async fn event_without_upload_id_gets_a_generated_media_id() {
    let h = harness(FakeImageCodec::new(100, 100), default_video());
    let event = upload(&h.blobs, "uploads/images/anon.jpg", "image/jpeg", &[]).await;

    let HandlerOutcome::Processed { media_id } = h.dispatcher.dispatch(&event).await.unwrap() else {
        panic!("expected a processed outcome");
    };
    assert!(uuid_like(&media_id), "{}", media_id);
    let doc = h.documents.get("media", &media_id).await.unwrap().unwrap();
    assert!(doc["uploadId"].is_null());
}

fn uuid_like(value: &str) -> bool {
    value.len() == 36 && value.chars().filter(|c| *c == '-').count() == 4
}

#[tokio::test]
async fn video_upload_produces_poster_and_renditions() {
    let mut video = default_video();
    video.metadata.duration = 12.4;
    video.delays.insert(360, Duration::from_millis(40));
    video.delays.insert(720, Duration::from_millis(40));
    let h = harness(FakeImageCodec::new(100, 100), video);
    let event = upload(
        &h.blobs,
        "uploads/videos/7/clip.mp4",
        "video/mp4",
        &[("uploadId", "clip1"), ("originContext", "exhibition"), ("exhibitionId", "ex3")],
    )
    .await;

    let outcome = h.dispatcher.dispatch(&event).await.unwrap();
    assert!(matches!(outcome, HandlerOutcome::Processed { .. }));

    let doc = media_doc(&h.documents, "clip1").await;
    assert_eq!(doc["processed"], true);
    assert_eq!(doc["type"], "video");
    assert_eq!(doc["processing"]["progress"], 100);
    assert_eq!(doc["duration"], 12);
    assert_eq!(doc["width"], 1920);
    assert_eq!(doc["height"], 1080);
    assert_eq!(doc["codec"], "h264");
    assert_eq!(doc["bitrate"], 4_500_000);
    assert_eq!(doc["origin"]["context"], "exhibition");
    assert_eq!(doc["origin"]["exhibitionId"], "ex3");
    assert_eq!(derivative_names(&doc), vec!["webm_1080", "webm_360", "webm_720"]);
    assert_eq!(doc["paths"]["derivatives"]["webm_720"]["width"], 1280);
    assert_eq!(doc["paths"]["derivatives"]["webm_720"]["height"], 720);
    assert_eq!(doc["paths"]["poster"]["storagePath"], "media/clip1/poster.jpg");
    assert!(doc["paths"]["poster"]["downloadURL"]
        .as_str()
        .unwrap()
        .contains("token="));

    assert_eq!(
        h.blobs.keys().await,
        vec![
            "media/clip1/poster.jpg",
            "media/clip1/webm_1080.webm",
            "media/clip1/webm_360.webm",
            "media/clip1/webm_720.webm",
        ]
    );
    assert_eq!(h.video.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn redelivered_video_after_success_changes_nothing() {
    let h = harness(FakeImageCodec::new(100, 100), default_video());
    let event = upload(&h.blobs, "uploads/videos/again.mp4", "video/mp4", &[("uploadId", "vagain")]).await;

    h.dispatcher.dispatch(&event).await.unwrap();
    let keys = h.blobs.keys().await;
    let before = media_doc(&h.documents, "vagain").await;
    let transcodes = h.video.started().len();

    let outcome = h.dispatcher.dispatch(&event).await.unwrap();
    assert_eq!(
        outcome,
        HandlerOutcome::AlreadyProcessed {
            media_id: "vagain".to_string()
        }
    );
    assert_eq!(h.video.started().len(), transcodes);
    assert_eq!(h.blobs.keys().await, keys);
    assert_eq!(media_doc(&h.documents, "vagain").await, before);
}

#[tokio::test]
async fn failed_rendition_stops_new_transcodes() {
    let mut video = default_video();
    video.delays.insert(360, Duration::from_millis(60));
    video.delays.insert(720, Duration::from_millis(5));
    video.failing_heights.insert(720);
    let h = harness(FakeImageCodec::new(100, 100), video);
    let event = upload(&h.blobs, "uploads/videos/broken.mov", "video/quicktime", &[("uploadId", "broken")]).await;

    let err = h.dispatcher.dispatch(&event).await.unwrap_err();
    assert!(matches!(err, PipelineError::Codec { .. }));
    assert!(!err.is_retryable());

    assert_eq!(h.video.started(), vec![360, 720]);
    // The in-flight 360p job was drained and published.
    assert!(h.blobs.exists("media/broken/webm_360.webm").await.unwrap());
    assert!(!h.blobs.exists("media/broken/webm_1080.webm").await.unwrap());
    assert!(h.blobs.exists("uploads/videos/broken.mov").await.unwrap());

    let doc = media_doc(&h.documents, "broken").await;
    assert_eq!(doc["processed"], false);
    assert_eq!(doc["processing"]["progress"], 60);
}

#[tokio::test]
async fn unreadable_video_fails_before_any_upload() {
    let mut video = default_video();
    video.fail_probe = true;
    let h = harness(FakeImageCodec::new(100, 100), video);
    let event = upload(&h.blobs, "uploads/videos/noise.mp4", "video/mp4", &[("uploadId", "noise")]).await;

    let err = h.dispatcher.dispatch(&event).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(h.blobs.keys().await, vec!["uploads/videos/noise.mp4"]);
    assert_eq!(media_doc(&h.documents, "noise").await["processing"]["stage"], "downloaded");
}

#[tokio::test]
async fn store_outage_is_retryable() {
    let h = harness(FakeImageCodec::new(100, 100), default_video());
    let event = upload(&h.blobs, "uploads/images/f.jpg", "image/jpeg", &[("uploadId", "f")]).await;
    h.documents.set_unavailable(true);

    let err = h.dispatcher.dispatch(&event).await.unwrap_err();
    assert!(err.is_retryable());
    h.documents.set_unavailable(false);
    assert!(h.documents.get("media", "f").await.unwrap().is_none());
}
