//! Job records: identifiers, lifecycle state and the durable store.

pub mod category;
pub mod events;
pub mod record;
pub mod store;

pub use category::{CategoryKey, EntityId, EntityKind, UnknownName};
pub use events::{JobEvent, JobEventBroadcaster};
pub use record::{JobRecord, JobStatus, OutputRef, TransitionFields};
pub use store::{JobRecordStore, StatusCounts};
