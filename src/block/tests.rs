use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use vdisk_locality::LocalityOracle;
use vdisk_metadata::{InMemoryPersistence, MetadataStore, SyncStatus};
use vdisk_rpc::{RpcCaller, RpcValue};
use vdisk_util::config::Config;
use vdisk_util::error::Error;
use vdisk_util::observer::NullObserver;

use crate::engine::BlockIoEngine;

const BLOCK_SIZE: u64 = 100;
const IMAGE_SIZE: u64 = 300;

fn addr(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
	IpAddr::V4(Ipv4Addr::new(a, b, c, d))
}

/// Stands in for a remote node-storage RPC peer: an in-memory block store
/// reached the same way a real peer would be, through `read`/`write`/
/// `allocate_dataspace`.
#[derive(Default)]
struct FakeRemoteStorage {
	blocks: Mutex<HashMap<usize, Vec<u8>>>,
}

#[async_trait]
impl RpcCaller for FakeRemoteStorage {
	async fn call(
		&self,
		_server: &str,
		_port: u16,
		method: &str,
		params: Vec<RpcValue>,
	) -> Result<RpcValue, Error> {
		match method {
			"allocate_dataspace" => {
				let block_idx = params[2].as_int().unwrap() as usize;
				self.blocks
					.lock()
					.await
					.entry(block_idx)
					.or_insert_with(|| vec![0u8; BLOCK_SIZE as usize]);
				Ok(RpcValue::Null)
			}
			"read" => {
				let block_idx = params[2].as_int().unwrap() as usize;
				let offset = params[3].as_int().unwrap() as usize;
				let length = params[4].as_int().unwrap() as usize;
				let blocks = self.blocks.lock().await;
				let block = blocks
					.get(&block_idx)
					.cloned()
					.unwrap_or_else(|| vec![0u8; BLOCK_SIZE as usize]);
				Ok(RpcValue::encode(&block[offset..offset + length]))
			}
			"write" => {
				let block_idx = params[2].as_int().unwrap() as usize;
				let offset = params[3].as_int().unwrap() as usize;
				let payload = params[4].clone().decode().unwrap();
				let mut blocks = self.blocks.lock().await;
				let block = blocks
					.entry(block_idx)
					.or_insert_with(|| vec![0u8; BLOCK_SIZE as usize]);
				block[offset..offset + payload.len()].copy_from_slice(&payload);
				Ok(RpcValue::Int(payload.len() as i64))
			}
			other => Err(Error::RemoteError(format!("unknown method {}", other))),
		}
	}
}

/// Creates `<root>/<name>/<blockname>` for every block, pre-zeroed, the way
/// an external provisioning step would before handing the image to this
/// engine.
async fn seed_local_blocks(config: &Config, name: &str, nblocks: usize) {
	let dir = config.image_root.join(name);
	tokio::fs::create_dir_all(&dir).await.unwrap();
	for idx in 0..nblocks {
		let path = dir.join(config.block_filename(idx));
		tokio::fs::write(&path, vec![0u8; BLOCK_SIZE as usize])
			.await
			.unwrap();
	}
}

fn test_config(image_root: PathBuf) -> Config {
	Config {
		image_root,
		meta_root: PathBuf::from("/unused"),
		blockname_format: "block-{}".to_string(),
		core_port: 7111,
		proxy_port: 7112,
		block_stats: false,
		rpc_bind_addr: None,
	}
}

#[tokio::test]
async fn write_then_read_round_trips_across_a_block_boundary() {
	let tmp = mktemp::Temp::new_dir().unwrap();
	let config = test_config(tmp.to_path_buf());
	let local = addr(127, 0, 0, 1);

	seed_local_blocks(&config, "vm-disk-0", 3).await;

	let persistence = Arc::new(InMemoryPersistence::new());
	let transport: Arc<dyn RpcCaller> = Arc::new(FakeRemoteStorage::default());
	let locality = Arc::new(LocalityOracle::with_addresses([local]));

	let store = Arc::new(
		MetadataStore::create(
			"vm-disk-0",
			IMAGE_SIZE,
			BLOCK_SIZE,
			local,
			local,
			persistence,
			transport.clone(),
			locality.clone(),
			config.core_port,
		)
		.await
		.unwrap(),
	);

	let engine = BlockIoEngine::new(
		store,
		transport,
		locality,
		config,
		Arc::new(NullObserver),
	);

	let written = engine.write(b"Hello World!", 95).await.unwrap();
	assert_eq!(written, 12);

	let read_back = engine.read(12, 95).await.unwrap();
	assert_eq!(read_back, b"Hello World!");
}

#[tokio::test]
async fn write_synchronizes_out_of_sync_replicas_only_for_touched_blocks() {
	let tmp = mktemp::Temp::new_dir().unwrap();
	let config = test_config(tmp.to_path_buf());
	let local = addr(127, 0, 0, 1);
	let remote = addr(10, 0, 0, 9);

	seed_local_blocks(&config, "vm-disk-0", 3).await;

	let persistence = Arc::new(InMemoryPersistence::new());
	let transport: Arc<dyn RpcCaller> = Arc::new(FakeRemoteStorage::default());
	let locality = Arc::new(LocalityOracle::with_addresses([local]));

	let store = Arc::new(
		MetadataStore::create(
			"vm-disk-0",
			IMAGE_SIZE,
			BLOCK_SIZE,
			local,
			local,
			persistence,
			transport.clone(),
			locality.clone(),
			config.core_port,
		)
		.await
		.unwrap(),
	);
	store.add_location(remote, 0, None).await.unwrap();

	let engine = BlockIoEngine::new(
		store.clone(),
		transport,
		locality,
		config,
		Arc::new(NullObserver),
	);

	// Straddles blocks 0 and 1 only; block 2 is never touched.
	engine.write(b"Hello World!", 95).await.unwrap();

	assert_eq!(
		store.snapshot_replicas(0).await.unwrap().get(&remote).map(|e| e.status),
		Some(SyncStatus::InSync)
	);
	assert_eq!(
		store.snapshot_replicas(1).await.unwrap().get(&remote).map(|e| e.status),
		Some(SyncStatus::InSync)
	);
	assert_eq!(
		store.snapshot_replicas(2).await.unwrap().get(&remote).map(|e| e.status),
		Some(SyncStatus::OutOfSync)
	);

	let read_back = engine.read(12, 95).await.unwrap();
	assert_eq!(read_back, b"Hello World!");
}

#[tokio::test]
async fn read_fails_with_no_in_sync_replica() {
	let tmp = mktemp::Temp::new_dir().unwrap();
	let config = test_config(tmp.to_path_buf());
	let local = addr(127, 0, 0, 1);

	seed_local_blocks(&config, "vm-disk-0", 3).await;

	let persistence = Arc::new(InMemoryPersistence::new());
	let transport: Arc<dyn RpcCaller> = Arc::new(FakeRemoteStorage::default());
	let locality = Arc::new(LocalityOracle::with_addresses([local]));

	let store = Arc::new(
		MetadataStore::create(
			"vm-disk-0",
			IMAGE_SIZE,
			BLOCK_SIZE,
			local,
			local,
			persistence,
			transport.clone(),
			locality.clone(),
			config.core_port,
		)
		.await
		.unwrap(),
	);
	{
		let mut guard = store.acquire_range(0, Some(0)).await.unwrap();
		guard.set_sync_status(0, local, SyncStatus::OutOfSync);
	}

	let engine = BlockIoEngine::new(store, transport, locality, config, Arc::new(NullObserver));

	let err = engine.read(10, 0).await.unwrap_err();
	assert!(matches!(err, Error::ReplicaUnavailable(0)));
}
