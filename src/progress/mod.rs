//! Progress observability for queue runs.

pub mod event;
pub mod runtime;
pub mod store;

pub use event::{ProgressEvent, QueueEndedData, QueueStartedData, ShotEventData, VariantEventData};
pub use runtime::{new_queue_id, now_millis, ProgressRuntime};
pub use store::ProgressStore;
