//! The opaque key-value persistence backend. The core treats the real
//! backend as an external collaborator; only the trait shape lives here.
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::Mutex;

use vdisk_util::error::Error;

use crate::record::ImageRecord;

#[async_trait]
pub trait PersistenceBackend: Send + Sync {
	async fn put_metadata(&self, name: &str, record: &ImageRecord) -> Result<(), Error>;
	async fn get_metadata(&self, name: &str) -> Result<ImageRecord, Error>;
	async fn delete_metadata(&self, name: &str) -> Result<(), Error>;
	/// Hypervisors known to hold a copy of this image's metadata. Used by
	/// callers that want to reconcile the persisted reader set against the
	/// live broadcast list; this core does not call it itself.
	async fn get_readers(&self, name: &str) -> Result<Vec<IpAddr>, Error>;
}

/// In-memory stand-in for the real backend, used in tests. Not part of the
/// deployed system: the real backend is an external collaborator.
#[derive(Default)]
pub struct InMemoryPersistence {
	records: Mutex<HashMap<String, ImageRecord>>,
}

impl InMemoryPersistence {
	pub fn new() -> Self {
		InMemoryPersistence::default()
	}
}

#[async_trait]
impl PersistenceBackend for InMemoryPersistence {
	async fn put_metadata(&self, name: &str, record: &ImageRecord) -> Result<(), Error> {
		self.records
			.lock()
			.await
			.insert(name.to_string(), record.clone());
		Ok(())
	}

	async fn get_metadata(&self, name: &str) -> Result<ImageRecord, Error> {
		self.records
			.lock()
			.await
			.get(name)
			.cloned()
			.ok_or_else(|| Error::NotFound(name.to_string()))
	}

	async fn delete_metadata(&self, name: &str) -> Result<(), Error> {
		self.records.lock().await.remove(name);
		Ok(())
	}

	async fn get_readers(&self, name: &str) -> Result<Vec<IpAddr>, Error> {
		let records = self.records.lock().await;
		let record = records
			.get(name)
			.ok_or_else(|| Error::NotFound(name.to_string()))?;
		Ok(record.hypervisors.keys().copied().collect())
	}
}
