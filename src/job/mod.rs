//! Job records, progress publication and the bounded worker pool that runs renders.

pub mod pool;
pub mod progress;
pub mod state;
