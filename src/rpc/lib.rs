#[macro_use]
extern crate tracing;

pub mod caller;
pub mod envelope;
pub mod transport;

pub use caller::RpcCaller;
pub use envelope::RpcValue;
pub use transport::RpcTransport;
