//! Sync status, replica entries, and the flat, serializable snapshot
//! of one image's metadata.
use std::net::IpAddr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Three-valued replica/peer synchronization state. Unknown values are
/// rejected at deserialization by construction: serde's default enum
/// handling errors out on any tag that isn't one of these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
	InSync,
	/// Reserved: not produced by this core, but accepted on input.
	Syncing,
	OutOfSync,
}

impl SyncStatus {
	/// Normalizes a legacy boolean representation of the same concept
	/// into this type.
	pub fn from_synced_bool(synced: bool) -> SyncStatus {
		if synced {
			SyncStatus::InSync
		} else {
			SyncStatus::OutOfSync
		}
	}

	pub fn is_in_sync(&self) -> bool {
		matches!(self, SyncStatus::InSync)
	}
}

/// One entry in a block's replica map, or in the hypervisor map — both
/// shapes carry just a sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaEntry {
	pub status: SyncStatus,
}

impl ReplicaEntry {
	pub fn new(status: SyncStatus) -> Self {
		ReplicaEntry { status }
	}
}

/// Ordered mapping from node address to its replica state. Order matters:
/// replica selection scans in iteration order and prefers the first
/// local in-sync match, falling back to the last non-local in-sync match
/// otherwise.
pub type ReplicaMap = IndexMap<IpAddr, ReplicaEntry>;

/// The flat, self-contained snapshot of one image's metadata: what gets
/// persisted to the opaque KV backend and broadcast to peer hypervisors.
/// This is distinct from the live, lock-guarded [`crate::store::
/// MetadataStore`] representation — it is what you get by taking a
/// consistent copy of that live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
	pub name: String,
	pub size: u64,
	pub used_size: u64,
	pub block_size: u64,
	pub blocks: Vec<ReplicaMap>,
	pub hypervisors: IndexMap<IpAddr, ReplicaEntry>,
}

impl ImageRecord {
	/// Number of blocks implied by `size`/`block_size`. This must always
	/// equal `blocks.len()`.
	pub fn expected_nblocks(&self) -> u64 {
		self.size / self.block_size
	}
}
