//! Abstracts over "something that can make the RPC call described in spec
//! §4.3" so that [`crate::RpcTransport`] isn't the only thing that can sit
//! behind the Metadata Store or the Block I/O Engine — tests wire up an
//! in-memory fake instead of binding real sockets.
use async_trait::async_trait;

use vdisk_util::error::Error;

use crate::envelope::RpcValue;
use crate::transport::RpcTransport;

#[async_trait]
pub trait RpcCaller: Send + Sync {
	async fn call(
		&self,
		server: &str,
		port: u16,
		method: &str,
		params: Vec<RpcValue>,
	) -> Result<RpcValue, Error>;
}

#[async_trait]
impl RpcCaller for RpcTransport {
	async fn call(
		&self,
		server: &str,
		port: u16,
		method: &str,
		params: Vec<RpcValue>,
	) -> Result<RpcValue, Error> {
		RpcTransport::call(self, server, port, method, params).await
	}
}
