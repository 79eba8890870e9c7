#[macro_use]
extern crate tracing;

pub mod persistence;
pub mod record;
pub mod store;

pub use persistence::{InMemoryPersistence, PersistenceBackend};
pub use record::{ImageRecord, ReplicaEntry, ReplicaMap, SyncStatus};
pub use store::{BlockRangeGuard, MetadataStore};

#[cfg(test)]
mod tests;
