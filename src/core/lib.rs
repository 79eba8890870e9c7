//! Facade crate: wires the Locality Oracle, Metadata Store, RPC Transport,
//! and Block I/O Engine behind a single `Disk` entry point, the way a
//! front end (a FUSE layer, a node-storage RPC server — both out of scope
//! here) would construct against this core.
#[macro_use]
extern crate tracing;

use std::net::IpAddr;
use std::sync::Arc;

pub use vdisk_block::BlockIoEngine;
pub use vdisk_locality::LocalityOracle;
pub use vdisk_metadata::{
	BlockRangeGuard, ImageRecord, InMemoryPersistence, MetadataStore, PersistenceBackend,
	ReplicaEntry, ReplicaMap, SyncStatus,
};
pub use vdisk_rpc::{RpcCaller, RpcTransport, RpcValue};
pub use vdisk_util::config::Config;
pub use vdisk_util::error::{Error, Result};
pub use vdisk_util::observer::{IoObserver, NullObserver};
pub use vdisk_util::piece::Piece;

/// The long-lived, process-wide collaborators every open image shares: the
/// persistence backend, RPC transport, locality oracle, configuration, and
/// I/O observer. Built once per process and passed to every `Disk::create`/
/// `Disk::load` call, per the "no implicit module-level state" design note:
/// these are explicitly constructed singletons, not globals.
#[derive(Clone)]
pub struct DiskContext {
	pub persistence: Arc<dyn PersistenceBackend>,
	pub transport: Arc<dyn RpcCaller>,
	pub locality: Arc<LocalityOracle>,
	pub config: Config,
	pub observer: Arc<dyn IoObserver>,
}

impl DiskContext {
	pub fn new(
		persistence: Arc<dyn PersistenceBackend>,
		transport: Arc<dyn RpcCaller>,
		locality: Arc<LocalityOracle>,
		config: Config,
		observer: Arc<dyn IoObserver>,
	) -> Self {
		DiskContext {
			persistence,
			transport,
			locality,
			config,
			observer,
		}
	}
}

/// One open virtual disk image: the live Metadata Store plus a Block I/O
/// Engine bound to it. Everything a guest read/write or a placement
/// mutation needs goes through this type.
pub struct Disk {
	metadata: Arc<MetadataStore>,
	engine: BlockIoEngine,
}

impl Disk {
	/// Provisions a brand-new image.
	pub async fn create(
		ctx: &DiskContext,
		name: impl Into<String>,
		size: u64,
		block_size: u64,
		initial_location: IpAddr,
		initial_hypervisor: IpAddr,
	) -> Result<Disk> {
		let metadata = Arc::new(
			MetadataStore::create(
				name,
				size,
				block_size,
				initial_location,
				initial_hypervisor,
				ctx.persistence.clone(),
				ctx.transport.clone(),
				ctx.locality.clone(),
				ctx.config.core_port,
			)
			.await?,
		);
		Ok(Disk::from_parts(ctx, metadata))
	}

	/// Opens an already-provisioned image.
	pub async fn load(ctx: &DiskContext, name: &str) -> Result<Disk> {
		let metadata = Arc::new(
			MetadataStore::load(
				name,
				ctx.persistence.clone(),
				ctx.transport.clone(),
				ctx.locality.clone(),
				ctx.config.core_port,
			)
			.await?,
		);
		Ok(Disk::from_parts(ctx, metadata))
	}

	fn from_parts(ctx: &DiskContext, metadata: Arc<MetadataStore>) -> Disk {
		let engine = BlockIoEngine::new(
			metadata.clone(),
			ctx.transport.clone(),
			ctx.locality.clone(),
			ctx.config.clone(),
			ctx.observer.clone(),
		);
		Disk { metadata, engine }
	}

	pub fn name(&self) -> &str {
		self.metadata.name()
	}

	pub fn size(&self) -> u64 {
		self.metadata.size()
	}

	pub fn block_size(&self) -> u64 {
		self.metadata.block_size()
	}

	pub fn nblocks(&self) -> usize {
		self.metadata.nblocks()
	}

	pub async fn read(&self, size: u64, offset: u64) -> Result<Vec<u8>> {
		self.engine.read(size, offset).await
	}

	pub async fn write(&self, data: &[u8], offset: u64) -> Result<u64> {
		self.engine.write(data, offset).await
	}

	pub async fn synchronize_block(&self, block_idx: usize) -> Result<()> {
		self.engine.synchronize_block(block_idx).await
	}

	pub async fn acquire_range(
		&self,
		start: usize,
		end: Option<usize>,
	) -> Result<BlockRangeGuard<'_>> {
		self.metadata.acquire_range(start, end).await
	}

	pub async fn add_location(&self, node: IpAddr, start: usize, end: Option<usize>) -> Result<()> {
		self.metadata.add_location(node, start, end).await
	}

	pub async fn remove_location(
		&self,
		node: IpAddr,
		start: usize,
		end: Option<usize>,
	) -> Result<()> {
		self.metadata.remove_location(node, start, end).await
	}

	pub async fn add_hypervisor(&self, hv: IpAddr) -> Result<()> {
		self.metadata.add_hypervisor(hv).await
	}

	pub async fn remove_hypervisor(&self, hv: IpAddr) -> Result<()> {
		self.metadata.remove_hypervisor(hv).await
	}

	pub async fn flush(&self) -> Result<()> {
		self.metadata.flush().await
	}

	pub async fn delete(&self) -> Result<()> {
		self.metadata.delete().await
	}
}
