//! In-memory burst aggregation.
//!
//! [`AggregationStore`] keeps one burst per identity key and debounces its
//! flush through a [`Scheduler`]. What a flush does is up to the
//! [`FlushHandler`](burstwatch_core::sink::FlushHandler) it was built with.

pub mod scheduler;
pub mod store;

pub use scheduler::{Scheduler, TimerKey, TimerTask, TokioScheduler};
pub use store::{AggregationStore, IngestOutcome};
