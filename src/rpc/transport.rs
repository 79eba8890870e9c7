//! A pooled request/response channel to a named peer on a named port,
//! with a binary-envelope codec for opaque byte payloads.
use std::collections::{HashMap, VecDeque};
use std::fmt;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use vdisk_util::error::Error;

use crate::envelope::RpcValue;

type Connection = Framed<TcpStream, LengthDelimitedCodec>;
type PoolKey = (String, u16);

#[derive(Debug, Serialize, Deserialize)]
struct RpcRequest {
	method: String,
	params: Vec<RpcValue>,
}

#[derive(Debug, Serialize, Deserialize)]
enum RpcOutcome {
	Ok(RpcValue),
	Err(String),
}

/// Pooled TCP transport keyed by `(server, port)`. Only `pop`/`push`/
/// `create` need to be atomic across concurrent callers; doing all three
/// under one `tokio::sync::Mutex` gets that.
pub struct RpcTransport {
	pools: Mutex<HashMap<PoolKey, VecDeque<Connection>>>,
}

impl fmt::Debug for RpcTransport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RpcTransport").finish_non_exhaustive()
	}
}

impl Default for RpcTransport {
	fn default() -> Self {
		Self::new()
	}
}

impl RpcTransport {
	pub fn new() -> Self {
		RpcTransport {
			pools: Mutex::new(HashMap::new()),
		}
	}

	/// Issues a remote procedure call. [`Error::TransportError`] covers a
	/// connection or protocol failure, in which case the connection is
	/// dropped rather than pooled; [`Error::RemoteError`] is propagated
	/// from the peer's own application-level response, and the connection
	/// is kept alive and returned to the pool.
	pub async fn call(
		&self,
		server: &str,
		port: u16,
		method: &str,
		params: Vec<RpcValue>,
	) -> Result<RpcValue, Error> {
		let mut conn = self.pop_or_create(server, port).await?;

		let request = RpcRequest {
			method: method.to_string(),
			params,
		};
		let payload = serde_json::to_vec(&request)
			.map_err(|e| Error::TransportError(format!("failed to encode request: {}", e)))?;

		if let Err(e) = conn.send(Bytes::from(payload)).await {
			debug!("transport error sending to {}:{}: {}", server, port, e);
			return Err(Error::TransportError(e.to_string()));
		}

		let frame = match conn.next().await {
			Some(Ok(frame)) => frame,
			Some(Err(e)) => {
				debug!("transport error reading from {}:{}: {}", server, port, e);
				return Err(Error::TransportError(e.to_string()));
			}
			None => {
				debug!("connection to {}:{} closed by peer", server, port);
				return Err(Error::TransportError("connection closed by peer".into()));
			}
		};

		let outcome: RpcOutcome = match serde_json::from_slice(&frame) {
			Ok(o) => o,
			Err(e) => {
				return Err(Error::TransportError(format!(
					"malformed response from {}:{}: {}",
					server, port, e
				)))
			}
		};

		// The connection itself is healthy regardless of the application
		// outcome, so it goes back in the pool either way.
		self.push(server, port, conn).await;

		match outcome {
			RpcOutcome::Ok(v) => Ok(v),
			RpcOutcome::Err(msg) => Err(Error::RemoteError(msg)),
		}
	}

	async fn pop_or_create(&self, server: &str, port: u16) -> Result<Connection, Error> {
		{
			let mut pools = self.pools.lock().await;
			let key = (server.to_string(), port);
			if let Some(queue) = pools.get_mut(&key) {
				if let Some(conn) = queue.pop_front() {
					return Ok(conn);
				}
			}
		}

		let stream = TcpStream::connect((server, port))
			.await
			.map_err(|e| Error::TransportError(format!("connecting to {}:{}: {}", server, port, e)))?;
		Ok(Framed::new(stream, LengthDelimitedCodec::new()))
	}

	async fn push(&self, server: &str, port: u16, conn: Connection) {
		let mut pools = self.pools.lock().await;
		pools
			.entry((server.to_string(), port))
			.or_insert_with(VecDeque::new)
			.push_back(conn);
	}
}
