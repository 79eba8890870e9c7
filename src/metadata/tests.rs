use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use vdisk_locality::LocalityOracle;
use vdisk_rpc::{RpcCaller, RpcValue};
use vdisk_util::error::Error;

use crate::persistence::InMemoryPersistence;
use crate::record::SyncStatus;
use crate::store::MetadataStore;

const CORE_PORT: u16 = 9999;

fn addr(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
	IpAddr::V4(Ipv4Addr::new(a, b, c, d))
}

/// A transport fake that always fails calls to a configured set of peers
/// and otherwise succeeds, recording every attempted call.
#[derive(Default)]
struct FakeTransport {
	fail_for: HashSet<IpAddr>,
	calls: Mutex<Vec<(IpAddr, String)>>,
}

impl FakeTransport {
	fn new(fail_for: impl IntoIterator<Item = IpAddr>) -> Self {
		FakeTransport {
			fail_for: fail_for.into_iter().collect(),
			calls: Mutex::new(Vec::new()),
		}
	}

	async fn call_count(&self, peer: IpAddr) -> usize {
		self.calls
			.lock()
			.await
			.iter()
			.filter(|(p, _)| *p == peer)
			.count()
	}
}

#[async_trait]
impl RpcCaller for FakeTransport {
	async fn call(
		&self,
		server: &str,
		_port: u16,
		method: &str,
		_params: Vec<RpcValue>,
	) -> Result<RpcValue, Error> {
		let peer: IpAddr = server.parse().unwrap();
		self.calls.lock().await.push((peer, method.to_string()));
		if self.fail_for.contains(&peer) {
			Err(Error::TransportError("simulated failure".into()))
		} else {
			Ok(RpcValue::Null)
		}
	}
}

async fn new_store(
	local: IpAddr,
	initial_location: IpAddr,
	initial_hypervisor: IpAddr,
	fail_for: impl IntoIterator<Item = IpAddr>,
) -> (MetadataStore, Arc<FakeTransport>) {
	let persistence = Arc::new(InMemoryPersistence::new());
	let transport = Arc::new(FakeTransport::new(fail_for));
	let locality = Arc::new(LocalityOracle::with_addresses([local]));

	let store = MetadataStore::create(
		"vm-disk-0",
		300,
		100,
		initial_location,
		initial_hypervisor,
		persistence,
		transport.clone(),
		locality,
		CORE_PORT,
	)
	.await
	.unwrap();

	(store, transport)
}

#[tokio::test]
async fn create_populates_one_in_sync_replica_per_block() {
	let local = addr(127, 0, 0, 1);
	let (store, _transport) = new_store(local, local, local, []).await;

	assert_eq!(store.nblocks(), 3);
	let guard = store.acquire_range(0, None).await.unwrap();
	for i in 0..3 {
		assert_eq!(guard.get_sync_status(i, &local), Some(SyncStatus::InSync));
	}
}

#[tokio::test]
async fn invalid_geometry_is_rejected() {
	let local = addr(127, 0, 0, 1);
	let persistence = Arc::new(InMemoryPersistence::new());
	let transport = Arc::new(FakeTransport::new([]));
	let locality = Arc::new(LocalityOracle::with_addresses([local]));

	let err = MetadataStore::create(
		"bad", 301, 100, local, local, persistence, transport, locality, CORE_PORT,
	)
	.await
	.unwrap_err();
	assert!(matches!(err, Error::InvalidGeometry(_)));
}

#[tokio::test]
async fn add_then_sync_marks_every_block_out_of_sync_for_new_node() {
	let local = addr(127, 0, 0, 1);
	let replica_b = addr(10, 0, 0, 2);
	let (store, _transport) = new_store(local, local, local, []).await;

	store.add_location(replica_b, 0, None).await.unwrap();

	let guard = store.acquire_range(0, None).await.unwrap();
	for i in 0..store.nblocks() {
		assert_eq!(
			guard.get_sync_status(i, &replica_b),
			Some(SyncStatus::OutOfSync)
		);
	}
}

#[tokio::test]
async fn remove_last_synced_guard_keeps_the_replica_in_place() {
	let local = addr(127, 0, 0, 1);
	let (store, _transport) = new_store(local, local, local, []).await;

	store.remove_location(local, 0, None).await.unwrap();

	let guard = store.acquire_range(0, None).await.unwrap();
	for i in 0..store.nblocks() {
		assert_eq!(guard.get_sync_status(i, &local), Some(SyncStatus::InSync));
	}
}

#[tokio::test]
async fn remove_location_removes_non_last_synced_replica() {
	let local = addr(127, 0, 0, 1);
	let replica_b = addr(10, 0, 0, 2);
	let (store, _transport) = new_store(local, local, local, []).await;

	store.add_location(replica_b, 0, None).await.unwrap();
	{
		let mut guard = store.acquire_range(0, None).await.unwrap();
		for i in 0..store.nblocks() {
			guard.set_sync_status(i, replica_b, SyncStatus::InSync);
		}
	}
	store.remove_location(local, 0, None).await.unwrap();

	let guard = store.acquire_range(0, None).await.unwrap();
	for i in 0..store.nblocks() {
		assert_eq!(guard.get_sync_status(i, &local), None);
		assert_eq!(
			guard.get_sync_status(i, &replica_b),
			Some(SyncStatus::InSync)
		);
	}
}

#[tokio::test]
async fn broadcast_failure_demotes_peer_but_flush_succeeds() {
	let local = addr(127, 0, 0, 1);
	let h2 = addr(10, 0, 0, 5);
	let (store, transport) = new_store(local, local, local, [h2]).await;

	store.add_hypervisor(h2).await.unwrap();
	assert_eq!(transport.call_count(h2).await, 1);

	store.flush().await.unwrap();
	assert_eq!(transport.call_count(h2).await, 2);
}

#[tokio::test]
async fn load_round_trips_through_persistence() {
	let local = addr(127, 0, 0, 1);
	let persistence = Arc::new(InMemoryPersistence::new());
	let transport = Arc::new(FakeTransport::new([]));
	let locality = Arc::new(LocalityOracle::with_addresses([local]));

	MetadataStore::create(
		"disk-a",
		200,
		100,
		local,
		local,
		persistence.clone(),
		transport.clone(),
		locality.clone(),
		CORE_PORT,
	)
	.await
	.unwrap();

	let loaded = MetadataStore::load("disk-a", persistence, transport, locality, CORE_PORT)
		.await
		.unwrap();
	assert_eq!(loaded.size(), 200);
	assert_eq!(loaded.nblocks(), 2);
	assert_eq!(loaded.used_size(), 200);
}

#[tokio::test]
async fn load_missing_image_is_not_found() {
	let local = addr(127, 0, 0, 1);
	let persistence = Arc::new(InMemoryPersistence::new());
	let transport = Arc::new(FakeTransport::new([]));
	let locality = Arc::new(LocalityOracle::with_addresses([local]));

	let err = MetadataStore::load("missing", persistence, transport, locality, CORE_PORT)
		.await
		.unwrap_err();
	assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn acquire_range_rejects_out_of_bounds() {
	let local = addr(127, 0, 0, 1);
	let (store, _transport) = new_store(local, local, local, []).await;

	let err = store.acquire_range(0, Some(10)).await.unwrap_err();
	assert!(matches!(err, Error::InvalidGeometry(_)));
}
