/// Re-export `Config` from `burstwatch-core` for use within this crate.
///
/// Environment parsing lives in `burstwatch-core` so integration tests can
/// build a `Config` without going through the process environment.
pub use burstwatch_core::config::{Config, CountMode};
