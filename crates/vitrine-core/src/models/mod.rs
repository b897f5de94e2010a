//! Data models for the application
//!
//! Documents persisted in the document store, the normalized upload event that
//! triggers ingestion, and the payloads of the work-order operations.

mod caller;
mod media;
mod stage;
mod upload_event;
mod work_order;

pub use caller::*;
pub use media::*;
pub use stage::*;
pub use upload_event::*;
pub use work_order::*;
