//! Internal building blocks for resilience-engine
//!
//! The retry mechanism is re-exported through `lib.rs` as `resilience_engine::retry`
//! because it is usable on its own, outside of recovery plans.

pub mod retry;
