mod core;
mod store;
mod types;

pub use core::{EngineSettings, ReminderEngine, DEFAULT_CHECK_INTERVAL};
pub use store::TaskStore;
pub use types::{StoreError, Task, TaskId, TaskStatus, TaskUpsert};
