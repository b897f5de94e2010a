//! Vitrine Services Layer
//!
//! Orchestration on top of the storage, document-store and codec adapters: the
//! upload-triggered image and video ingestion pipelines, and the transactional
//! work-order lifecycle over service requests.

pub mod ingest;
pub mod work_orders;

pub use ingest::{BlobStaging, ImagePipeline, IngestDispatcher, PipelineError, VideoPipeline};
pub use work_orders::WorkOrderService;
