//! The Metadata Store: one image's authoritative metadata, block-range
//! locking, persistence, and hypervisor broadcast.
use std::net::IpAddr;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use vdisk_locality::LocalityOracle;
use vdisk_rpc::{RpcCaller, RpcValue};
use vdisk_util::error::Error;

use crate::persistence::PersistenceBackend;
use crate::record::{ImageRecord, ReplicaEntry, ReplicaMap, SyncStatus};

/// RAII view over a contiguous, ascending-order range of block locks.
/// Dropping it releases every lock in the range, so release is guaranteed
/// on every exit path, including early returns during a failed broadcast.
pub struct BlockRangeGuard<'a> {
	start: usize,
	guards: Vec<MutexGuard<'a, ReplicaMap>>,
}

impl<'a> BlockRangeGuard<'a> {
	pub fn start(&self) -> usize {
		self.start
	}

	pub fn end(&self) -> usize {
		self.start + self.guards.len() - 1
	}

	fn slot(&self, block_idx: usize) -> &ReplicaMap {
		&self.guards[block_idx - self.start]
	}

	fn slot_mut(&mut self, block_idx: usize) -> &mut ReplicaMap {
		&mut self.guards[block_idx - self.start]
	}

	pub fn replicas(&self, block_idx: usize) -> &ReplicaMap {
		self.slot(block_idx)
	}

	/// Direct accessor: the caller proves it holds the block's lock by
	/// presenting this guard, rather than the store re-acquiring it
	/// internally.
	pub fn get_sync_status(&self, block_idx: usize, node: &IpAddr) -> Option<SyncStatus> {
		self.slot(block_idx).get(node).map(|e| e.status)
	}

	/// Direct accessor: mutates through the already-held lock.
	pub fn set_sync_status(&mut self, block_idx: usize, node: IpAddr, status: SyncStatus) {
		self.slot_mut(block_idx)
			.entry(node)
			.and_modify(|e| e.status = status)
			.or_insert_with(|| ReplicaEntry::new(status));
	}

	pub fn insert_if_absent(&mut self, block_idx: usize, node: IpAddr, status: SyncStatus) {
		self.slot_mut(block_idx)
			.entry(node)
			.or_insert_with(|| ReplicaEntry::new(status));
	}

	/// Removes `node` from block `block_idx` unless doing so would leave no
	/// `IN_SYNC` replica, in which case the removal is skipped and `false`
	/// is returned.
	pub fn remove_if_safe(&mut self, block_idx: usize, node: &IpAddr) -> bool {
		let map = self.slot_mut(block_idx);
		let other_in_sync = map
			.iter()
			.any(|(n, e)| n != node && e.status.is_in_sync());
		if !other_in_sync {
			return false;
		}
		map.shift_remove(node);
		true
	}
}

/// The live, lock-guarded representation of one image's metadata.
pub struct MetadataStore {
	name: String,
	size: u64,
	used_size: u64,
	block_size: u64,
	blocks: Vec<Mutex<ReplicaMap>>,
	hypervisors: RwLock<IndexMap<IpAddr, ReplicaEntry>>,

	persistence: Arc<dyn PersistenceBackend>,
	transport: Arc<dyn RpcCaller>,
	locality: Arc<LocalityOracle>,
	core_port: u16,
}

impl MetadataStore {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn size(&self) -> u64 {
		self.size
	}

	pub fn used_size(&self) -> u64 {
		self.used_size
	}

	pub fn block_size(&self) -> u64 {
		self.block_size
	}

	pub fn nblocks(&self) -> usize {
		self.blocks.len()
	}

	/// Provisions a brand-new image: produces a fully populated record with
	/// one in-sync replica per block, persists, and broadcasts.
	pub async fn create(
		name: impl Into<String>,
		size: u64,
		block_size: u64,
		initial_location: IpAddr,
		initial_hypervisor: IpAddr,
		persistence: Arc<dyn PersistenceBackend>,
		transport: Arc<dyn RpcCaller>,
		locality: Arc<LocalityOracle>,
		core_port: u16,
	) -> Result<MetadataStore, Error> {
		if size == 0 || block_size == 0 || size % block_size != 0 {
			return Err(Error::InvalidGeometry(format!(
				"size {} must be a positive multiple of block_size {}",
				size, block_size
			)));
		}

		let name = name.into();
		let nblocks = (size / block_size) as usize;
		let blocks = (0..nblocks)
			.map(|_| {
				let mut map = ReplicaMap::new();
				map.insert(initial_location, ReplicaEntry::new(SyncStatus::InSync));
				Mutex::new(map)
			})
			.collect();

		let mut hypervisors = IndexMap::new();
		hypervisors.insert(initial_hypervisor, ReplicaEntry::new(SyncStatus::InSync));

		let store = MetadataStore {
			name,
			size,
			used_size: size,
			block_size,
			blocks,
			hypervisors: RwLock::new(hypervisors),
			persistence,
			transport,
			locality,
			core_port,
		};
		store.flush().await?;
		Ok(store)
	}

	/// Reads an already-provisioned image from the persistence backend.
	pub async fn load(
		name: &str,
		persistence: Arc<dyn PersistenceBackend>,
		transport: Arc<dyn RpcCaller>,
		locality: Arc<LocalityOracle>,
		core_port: u16,
	) -> Result<MetadataStore, Error> {
		let record = persistence.get_metadata(name).await?;
		let blocks = record
			.blocks
			.into_iter()
			.map(Mutex::new)
			.collect::<Vec<_>>();

		Ok(MetadataStore {
			name: record.name,
			size: record.size,
			used_size: record.used_size,
			block_size: record.block_size,
			blocks,
			hypervisors: RwLock::new(record.hypervisors),
			persistence,
			transport,
			locality,
			core_port,
		})
	}

	/// Removes from the backend. Broadcast is not required; peers discover
	/// deletion via a failed lookup.
	pub async fn delete(&self) -> Result<(), Error> {
		self.persistence.delete_metadata(&self.name).await
	}

	/// A point-in-time copy of one block's replica map, taken and released
	/// without being held across any I/O — the "dirty read" fast read path
	/// tolerates a concurrent writer changing the map after the copy is taken. Rust's memory-safety guarantee
	/// still requires briefly taking the block's mutex to produce the
	/// copy; the map is not held locked while the caller acts on it.
	pub async fn snapshot_replicas(&self, block_idx: usize) -> Result<ReplicaMap, Error> {
		if block_idx >= self.nblocks() {
			return Err(Error::InvalidGeometry(format!(
				"block index {} out of bounds for {} blocks",
				block_idx,
				self.nblocks()
			)));
		}
		Ok(self.blocks[block_idx].lock().await.clone())
	}

	fn resolve_end(&self, end: Option<usize>) -> usize {
		end.unwrap_or(self.nblocks() - 1)
	}

	/// Scoped acquisition of every per-block lock in `[start, end]`
	/// inclusive, always in ascending order. `end = None` means "through the
	/// last block."
	pub async fn acquire_range(
		&self,
		start: usize,
		end: Option<usize>,
	) -> Result<BlockRangeGuard<'_>, Error> {
		let end = self.resolve_end(end);
		if start > end || end >= self.nblocks() {
			return Err(Error::InvalidGeometry(format!(
				"block range [{}, {}] out of bounds for {} blocks",
				start,
				end,
				self.nblocks()
			)));
		}
		let mut guards = Vec::with_capacity(end - start + 1);
		for idx in start..=end {
			guards.push(self.blocks[idx].lock().await);
		}
		Ok(BlockRangeGuard { start, guards })
	}

	/// Inserts `node` into every block in `[start, end]` that doesn't
	/// already have it, defaulting to `OUT_OF_SYNC`, then flushes.
	pub async fn add_location(
		&self,
		node: IpAddr,
		start: usize,
		end: Option<usize>,
	) -> Result<(), Error> {
		{
			let mut guard = self.acquire_range(start, end).await?;
			for idx in guard.start()..=guard.end() {
				guard.insert_if_absent(idx, node, SyncStatus::OutOfSync);
			}
		}
		self.flush().await
	}

	/// Removes `node` from every block in `[start, end]` unless doing so
	/// would leave no in-sync replica, in which case that block's removal
	/// is skipped and a diagnostic is logged.
	pub async fn remove_location(
		&self,
		node: IpAddr,
		start: usize,
		end: Option<usize>,
	) -> Result<(), Error> {
		{
			let mut guard = self.acquire_range(start, end).await?;
			for idx in guard.start()..=guard.end() {
				if !guard.remove_if_safe(idx, &node) {
					warn!(
						block = idx,
						node = %node,
						"skipping remove_location: would leave no in-sync replica"
					);
				}
			}
		}
		self.flush().await
	}

	/// Adds a hypervisor with default status `OUT_OF_SYNC`, then flushes.
	pub async fn add_hypervisor(&self, hv: IpAddr) -> Result<(), Error> {
		{
			let mut hypervisors = self.hypervisors.write().await;
			hypervisors
				.entry(hv)
				.or_insert_with(|| ReplicaEntry::new(SyncStatus::OutOfSync));
		}
		self.flush().await
	}

	pub async fn remove_hypervisor(&self, hv: IpAddr) -> Result<(), Error> {
		{
			let mut hypervisors = self.hypervisors.write().await;
			hypervisors.shift_remove(&hv);
		}
		self.flush().await
	}

	/// Atomic publish: persist, then best-effort broadcast to every peer
	/// hypervisor. Per-peer RPC failures are absorbed into that peer's
	/// sync status; they never fail the call. Holds every block lock for
	/// the whole call, so two overlapping flushes can't interleave and
	/// persist a stale snapshot over a newer one.
	pub async fn flush(&self) -> Result<(), Error> {
		let hypervisors_snapshot = self.hypervisors.read().await.clone();
		let guard = self.acquire_range(0, None).await?;
		let record = self.snapshot(&guard, hypervisors_snapshot);

		self.persistence.put_metadata(&self.name, &record).await?;

		let peers: Vec<IpAddr> = record.hypervisors.keys().copied().collect();

		let payload = encode_broadcast_payload(&record)?;

		for peer in peers {
			if self.locality.is_local(&peer) {
				continue;
			}

			{
				let mut hypervisors = self.hypervisors.write().await;
				if let Some(entry) = hypervisors.get_mut(&peer) {
					entry.status = SyncStatus::InSync;
				}
			}

			let result = self
				.transport
				.call(
					&peer.to_string(),
					self.core_port,
					"proxy_update_metadata",
					vec![RpcValue::from(self.name.as_str()), payload.clone()],
				)
				.await;

			if let Err(err) = result {
				warn!(peer = %peer, error = %err, "proxy_update_metadata failed, marking peer out of sync");
				let mut hypervisors = self.hypervisors.write().await;
				if let Some(entry) = hypervisors.get_mut(&peer) {
					entry.status = SyncStatus::OutOfSync;
				}
			}
		}

		Ok(())
	}

	fn snapshot(
		&self,
		guard: &BlockRangeGuard<'_>,
		hypervisors: IndexMap<IpAddr, ReplicaEntry>,
	) -> ImageRecord {
		ImageRecord {
			name: self.name.clone(),
			size: self.size,
			used_size: self.used_size,
			block_size: self.block_size,
			blocks: guard.guards.iter().map(|g| (**g).clone()).collect(),
			hypervisors,
		}
	}
}

fn encode_broadcast_payload(record: &ImageRecord) -> Result<RpcValue, Error> {
	let text = serde_json::to_vec(record)?;
	let compressed = zstd::stream::encode_all(&text[..], 0).map_err(Error::Io)?;
	Ok(RpcValue::encode(&compressed))
}
