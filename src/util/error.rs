//! Error taxonomy for the virtual-disk data-plane core.
use err_derive::Error;

/// All errors that can be produced by the core.
///
/// Propagation policy: `TransportError` and `RemoteError` are
/// meant to be caught close to the RPC call site and turned into a replica
/// demotion rather than bubbled up whole; the rest are surfaced verbatim to
/// the caller.
#[derive(Debug, Error)]
pub enum Error {
	/// `size`/`block_size` constraints violated at image-creation time.
	#[error(display = "invalid geometry: {}", _0)]
	InvalidGeometry(String),

	/// Requested metadata is not present in the persistence backend.
	#[error(display = "not found: {}", _0)]
	NotFound(String),

	/// The persistence backend rejected a read or write.
	#[error(display = "persistence failure: {}", _0)]
	PersistenceFailure(String),

	/// RPC socket or protocol failure. The connection that produced this
	/// error has already been dropped from the pool.
	#[error(display = "transport error: {}", _0)]
	TransportError(String),

	/// The remote peer raised an application-level error.
	#[error(display = "remote error: {}", _0)]
	RemoteError(String),

	/// No `IN_SYNC` replica exists for a block at read time.
	#[error(display = "no in-sync replica available for block {}", _0)]
	ReplicaUnavailable(usize),

	/// No `IN_SYNC` replica exists for a block at sync time: fatal for
	/// that block.
	#[error(display = "disk broken: block {} has no in-sync source replica", _0)]
	DiskBroken(usize),

	#[error(display = "I/O error: {}", _0)]
	Io(#[error(source)] std::io::Error),

	#[error(display = "serialization error: {}", _0)]
	Serialization(String),

	#[error(display = "{}", _0)]
	Message(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	pub fn message<S: Into<String>>(s: S) -> Self {
		Error::Message(s.into())
	}
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Error {
		Error::Serialization(e.to_string())
	}
}

impl From<toml::de::Error> for Error {
	fn from(e: toml::de::Error) -> Error {
		Error::Serialization(e.to_string())
	}
}
