//! Durable run progress.
//!
//! A run's chunk list is written once when the run is planned; afterwards
//! every chunk transition is persisted before the next protocol step, so a
//! crash leaves at most one chunk per worker `InFlight`, and loading demotes
//! those back to `Pending`.

mod model;
mod repository;

pub use model::{ChunkRecord, ChunkStatus, RunCheckpoint, RunState, RunSummary};
pub use repository::CheckpointRepository;
