//! Upload event handler trait
//!
//! The services crate implements this for the ingestion dispatcher. The consumer
//! calls `handle` once per delivery and decides on redelivery from the error.

use async_trait::async_trait;
use serde::Serialize;

use vitrine_core::models::UploadEvent;
use vitrine_core::EventError;

/// What a delivery did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandlerOutcome {
    /// The event matched no pipeline.
    Skipped,
    /// A pipeline ran to completion.
    #[serde(rename_all = "camelCase")]
    Processed { media_id: String },
    /// A redelivered event for an asset that is already processed.
    #[serde(rename_all = "camelCase")]
    AlreadyProcessed { media_id: String },
}

#[async_trait]
pub trait UploadEventHandler: Send + Sync {
    async fn handle(&self, event: &UploadEvent) -> Result<HandlerOutcome, EventError>;
}
