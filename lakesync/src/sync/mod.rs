//! Sync engine: entity kinds, relationship resolution, document mapping,
//! and the generic batch controller driven per kind by the orchestrator.

pub mod controller;
pub mod error;
pub mod kind;
pub mod mapper;
pub mod orchestrator;
pub mod relations;

#[cfg(test)]
pub mod testing;

pub use controller::BatchSyncController;
pub use kind::EntityKind;
pub use mapper::mapper_for;
pub use orchestrator::SyncOrchestrator;
