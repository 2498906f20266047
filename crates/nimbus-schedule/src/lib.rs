//! nimbus-schedule: persisted daily word-cloud scheduling.
//!
//! A dynamic set of recurring daily triggers — one permanent default plus
//! per-target overrides — kept consistent between an in-memory trigger
//! registry and the SQLite schedule store.

pub mod registry;
pub mod service;
pub mod store;

pub use registry::{TimerHandle, TriggerKey, TriggerTimers};
pub use nimbus_pipeline::NO_DATA_NOTICE;
pub use service::SchedulingService;
pub use store::{ScheduleRecord, ScheduleStore, StoreError};
