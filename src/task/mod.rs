//! Task lifecycle: records, the registry, update fan-out and execution.

pub mod broadcast;
pub mod executor;
pub mod record;
pub mod registry;

pub use broadcast::{SubscriberId, TaskFrame, SUBSCRIBER_BUFFER};
pub use executor::TaskExecutor;
pub use record::{TaskKind, TaskRecord, TaskSnapshot, TaskStatus};
pub use registry::{spawn_janitor, Subscription, TaskEntry, TaskRegistry};
