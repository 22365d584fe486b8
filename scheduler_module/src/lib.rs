pub mod alerts;
pub mod broadcast;
pub mod calendar_sync;
pub mod checklist;
pub mod service;

mod scheduler;

#[cfg(test)]
pub(crate) mod test_support;

pub use alerts::{AlertController, AlertOutcome, AlertSettings};
pub use broadcast::{
    AlertEvent, AlertSink, BroadcastError, BroadcastOptions, BroadcastServer, ClientMessage,
    NullSink,
};
pub use calendar_sync::{
    CalendarSync, FeedFileSync, IcsFileSync, MultiSync, NoopSync, SyncError,
};
pub use scheduler::{
    EngineSettings, ReminderEngine, StoreError, Task, TaskId, TaskStatus, TaskStore, TaskUpsert,
    DEFAULT_CHECK_INTERVAL,
};
