//! Vitrine command-line entry points.
//!
//! `vitrine worker` consumes upload events as JSON lines, `vitrine ingest` pushes a
//! local file through the pipelines, and the `work-order` commands drive the
//! work-order lifecycle.

pub mod app;
pub mod events;
pub mod telemetry;

pub use app::App;
pub use telemetry::{init_tracing, LogFormat};
