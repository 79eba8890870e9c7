//! The Block I/O Engine: translates virtual-disk byte ranges into
//! per-block operations, selects replicas, and drives read, write, and
//! replica synchronization.
use std::io::SeekFrom;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use vdisk_locality::LocalityOracle;
use vdisk_metadata::record::{ReplicaMap, SyncStatus};
use vdisk_metadata::MetadataStore;
use vdisk_rpc::{RpcCaller, RpcValue};
use vdisk_util::config::Config;
use vdisk_util::error::Error;
use vdisk_util::metrics::RecordDuration;
use vdisk_util::observer::IoObserver;

use crate::metrics::BlockEngineMetrics;
use crate::pieces::gather_pieces;

/// Picks a source replica for a read or a sync: the first in-sync, local
/// replica encountered in iteration order, falling back to the last-scanned
/// in-sync non-local replica if no local one is in sync.
fn select_replica(replicas: &ReplicaMap, locality: &LocalityOracle) -> Option<IpAddr> {
	let mut fallback = None;
	for (node, entry) in replicas.iter() {
		if !entry.status.is_in_sync() {
			continue;
		}
		if locality.is_local(node) {
			return Some(*node);
		}
		fallback = Some(*node);
	}
	fallback
}

pub struct BlockIoEngine {
	metadata: Arc<MetadataStore>,
	transport: Arc<dyn RpcCaller>,
	locality: Arc<LocalityOracle>,
	config: Config,
	observer: Arc<dyn IoObserver>,
	metrics: BlockEngineMetrics,
}

impl BlockIoEngine {
	pub fn new(
		metadata: Arc<MetadataStore>,
		transport: Arc<dyn RpcCaller>,
		locality: Arc<LocalityOracle>,
		config: Config,
		observer: Arc<dyn IoObserver>,
	) -> Self {
		BlockIoEngine {
			metadata,
			transport,
			locality,
			config,
			observer,
			metrics: BlockEngineMetrics::new(),
		}
	}

	fn local_path(&self, block_idx: usize) -> PathBuf {
		self.config
			.image_root
			.join(self.metadata.name())
			.join(self.config.block_filename(block_idx))
	}

	/// Reads `size` bytes starting at `offset` on the virtual address
	/// space. Issues no block lock of its own: a concurrent
	/// `synchronize_block` may change replica contents mid-read, per the
	/// "dirty read" fast path.
	pub async fn read(&self, size: u64, offset: u64) -> Result<Vec<u8>, Error> {
		if offset + size > self.metadata.size() {
			return Err(Error::InvalidGeometry(format!(
				"read of {} bytes at offset {} exceeds image size {}",
				size,
				offset,
				self.metadata.size()
			)));
		}
		let pieces = gather_pieces(offset, size, self.metadata.block_size())?;

		let mut data = Vec::with_capacity(size as usize);
		for piece in &pieces {
			let replicas = self.metadata.snapshot_replicas(piece.block_idx).await?;
			let source = select_replica(&replicas, &self.locality)
				.ok_or(Error::ReplicaUnavailable(piece.block_idx))?;

			let chunk = self
				.fetch(source, piece.block_idx, piece.offset_in_block, piece.length)
				.bound_record_duration(&self.metrics.block_read_duration)
				.await?;
			self.metrics.bytes_read.add(&opentelemetry::Context::current(), chunk.len() as u64, &[]);
			data.extend_from_slice(&chunk);
		}

		self.observer.record_read(&pieces);
		Ok(data)
	}

	/// Writes `data` at `offset` on the virtual address space. Best-effort
	/// fan-out: a failed replica write is reported and does not fail the
	/// call.
	pub async fn write(&self, data: &[u8], offset: u64) -> Result<u64, Error> {
		let size = data.len() as u64;
		if offset + size > self.metadata.size() {
			return Err(Error::InvalidGeometry(format!(
				"write of {} bytes at offset {} exceeds image size {}",
				size,
				offset,
				self.metadata.size()
			)));
		}
		let pieces = gather_pieces(offset, size, self.metadata.block_size())?;

		let mut cursor = 0usize;
		for piece in &pieces {
			let slice = &data[cursor..cursor + piece.length as usize];
			cursor += piece.length as usize;

			let mut replicas = self.metadata.snapshot_replicas(piece.block_idx).await?;
			if replicas.values().any(|e| !e.status.is_in_sync()) {
				self.synchronize_block(piece.block_idx).await?;
				replicas = self.metadata.snapshot_replicas(piece.block_idx).await?;
			}

			for node in replicas.keys().copied().collect::<Vec<_>>() {
				let result = self
					.store(node, piece.block_idx, piece.offset_in_block, slice)
					.bound_record_duration(&self.metrics.block_write_duration)
					.await;
				match result {
					Ok(()) => {
						self.metrics.bytes_written.add(
							&opentelemetry::Context::current(),
							slice.len() as u64,
							&[],
						);
					}
					Err(err) => {
						warn!(
							block = piece.block_idx,
							node = %node,
							error = %err,
							"replica write failed, leaving for a later synchronize_block"
						);
					}
				}
			}
		}

		self.observer.record_write(&pieces);
		Ok(size)
	}

	/// Brings every out-of-sync replica of `block_idx` up to date from an
	/// in-sync source. Holds the block's lock for the entire operation,
	/// then flushes metadata outside the lock.
	pub async fn synchronize_block(&self, block_idx: usize) -> Result<(), Error> {
		self.metrics.sync_counter.add(&opentelemetry::Context::current(), 1, &[]);
		let start = std::time::Instant::now();

		let result = self.synchronize_block_locked(block_idx).await;
		self.metrics.sync_duration.record(
			&opentelemetry::Context::current(),
			start.elapsed().as_secs_f64(),
			&[],
		);
		if result.is_err() {
			self.metrics.sync_error_counter.add(&opentelemetry::Context::current(), 1, &[]);
		}
		result?;

		self.metadata.flush().await
	}

	async fn synchronize_block_locked(&self, block_idx: usize) -> Result<(), Error> {
		let mut guard = self.metadata.acquire_range(block_idx, Some(block_idx)).await?;
		let replicas = guard.replicas(block_idx).clone();
		let source = select_replica(&replicas, &self.locality)
			.ok_or(Error::DiskBroken(block_idx))?;

		for (node, entry) in replicas.iter() {
			if *node == source || entry.status.is_in_sync() {
				continue;
			}
			self.allocate_dataspace(*node, block_idx).await?;
			let whole_block = self
				.fetch(source, block_idx, 0, self.metadata.block_size())
				.await?;
			self.store(*node, block_idx, 0, &whole_block).await?;
			guard.set_sync_status(block_idx, *node, SyncStatus::InSync);
		}
		Ok(())
	}

	async fn fetch(
		&self,
		node: IpAddr,
		block_idx: usize,
		offset_in_block: u64,
		length: u64,
	) -> Result<Vec<u8>, Error> {
		if self.locality.is_local(&node) {
			self.fetch_local(block_idx, offset_in_block, length).await
		} else {
			self.fetch_remote(node, block_idx, offset_in_block, length)
				.await
		}
	}

	async fn fetch_local(
		&self,
		block_idx: usize,
		offset_in_block: u64,
		length: u64,
	) -> Result<Vec<u8>, Error> {
		let mut file = OpenOptions::new().read(true).open(self.local_path(block_idx)).await?;
		file.seek(SeekFrom::Start(offset_in_block)).await?;
		let mut buf = vec![0u8; length as usize];
		file.read_exact(&mut buf).await?;
		Ok(buf)
	}

	async fn fetch_remote(
		&self,
		node: IpAddr,
		block_idx: usize,
		offset_in_block: u64,
		length: u64,
	) -> Result<Vec<u8>, Error> {
		let resp = self
			.transport
			.call(
				&node.to_string(),
				self.config.proxy_port,
				"read",
				vec![
					RpcValue::from(self.metadata.name()),
					RpcValue::from(self.metadata.block_size()),
					RpcValue::from(block_idx),
					RpcValue::from(offset_in_block),
					RpcValue::from(length),
				],
			)
			.await?;
		resp.decode()
	}

	async fn store(
		&self,
		node: IpAddr,
		block_idx: usize,
		offset_in_block: u64,
		data: &[u8],
	) -> Result<(), Error> {
		if self.locality.is_local(&node) {
			self.store_local(block_idx, offset_in_block, data).await
		} else {
			self.store_remote(node, block_idx, offset_in_block, data)
				.await
		}
	}

	async fn store_local(
		&self,
		block_idx: usize,
		offset_in_block: u64,
		data: &[u8],
	) -> Result<(), Error> {
		let mut file = OpenOptions::new()
			.write(true)
			.open(self.local_path(block_idx))
			.await?;
		file.seek(SeekFrom::Start(offset_in_block)).await?;
		file.write_all(data).await?;
		Ok(())
	}

	async fn store_remote(
		&self,
		node: IpAddr,
		block_idx: usize,
		offset_in_block: u64,
		data: &[u8],
	) -> Result<(), Error> {
		self.transport
			.call(
				&node.to_string(),
				self.config.proxy_port,
				"write",
				vec![
					RpcValue::from(self.metadata.name()),
					RpcValue::from(self.metadata.block_size()),
					RpcValue::from(block_idx),
					RpcValue::from(offset_in_block),
					RpcValue::encode(data),
				],
			)
			.await?;
		Ok(())
	}

	/// Ensures `node` has an allocated block file for `block_idx`.
	/// Locally, creates a sparse file of exactly `block_size` bytes by
	/// seeking to the last byte and writing a single zero.
	async fn allocate_dataspace(&self, node: IpAddr, block_idx: usize) -> Result<(), Error> {
		if self.locality.is_local(&node) {
			let mut file = OpenOptions::new()
				.write(true)
				.create(true)
				.truncate(true)
				.open(self.local_path(block_idx))
				.await?;
			file.seek(SeekFrom::Start(self.metadata.block_size() - 1))
				.await?;
			file.write_all(&[0u8]).await?;
			Ok(())
		} else {
			self.transport
				.call(
					&node.to_string(),
					self.config.proxy_port,
					"allocate_dataspace",
					vec![
						RpcValue::from(self.metadata.name()),
						RpcValue::from(self.metadata.block_size()),
						RpcValue::from(block_idx),
					],
				)
				.await?;
			Ok(())
		}
	}
}
