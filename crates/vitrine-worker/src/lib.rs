//! Vitrine worker
//!
//! The bounded job runner used by the video pipeline and the worker pool that feeds
//! upload events to a handler with timeouts and redelivery.

pub mod consumer;
pub mod handler;
pub mod runner;

pub use consumer::{ConsumerConfig, ConsumerSummary, UploadEventConsumer};
pub use handler::{HandlerOutcome, UploadEventHandler};
pub use runner::{run_bounded, run_bounded_with_progress, RunnerError};
