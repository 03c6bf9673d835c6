//! Shared test doubles for the time-series aspect index.

mod backend;
mod builder;
mod wait;

pub use backend::{
    FailingIndexBackend, FlakyIndexBackend, InMemoryIndexBackend, RejectingIndexBackend,
    SlowIndexBackend,
};
pub use builder::{FailingIndexBuilder, RecordingIndexBuilder};
pub use wait::wait_for;
