//! The self-describing value type carried over the wire, plus the
//! opaque-bytes envelope used to smuggle binary payloads (block data,
//! compressed metadata) through the otherwise text-structured protocol.
//!
//! `encode`/`decode` wrap and unwrap raw bytes as a base64 string tagged
//! distinctly from an ordinary string, so a `Map`/`List` built of plain
//! `RpcValue`s can carry them without ambiguity.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use vdisk_util::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcValue {
	/// Must come before `Map` so untagged deserialization prefers it for
	/// objects shaped like `{"$bytes": "..."}`.
	Bytes {
		#[serde(rename = "$bytes")]
		b64: String,
	},
	Null,
	Bool(bool),
	Int(i64),
	Str(String),
	List(Vec<RpcValue>),
	Map(BTreeMap<String, RpcValue>),
}

impl RpcValue {
	/// Wraps an opaque byte payload for transport.
	pub fn encode(bytes: &[u8]) -> RpcValue {
		RpcValue::Bytes {
			b64: base64::encode(bytes),
		}
	}

	/// Unwraps a payload produced by [`RpcValue::encode`].
	pub fn decode(self) -> Result<Vec<u8>, Error> {
		match self {
			RpcValue::Bytes { b64 } => base64::decode(&b64)
				.map_err(|e| Error::Serialization(format!("invalid byte envelope: {}", e))),
			other => Err(Error::Serialization(format!(
				"expected a byte envelope, found {:?}",
				other
			))),
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			RpcValue::Str(s) => Some(s.as_str()),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			RpcValue::Int(i) => Some(*i),
			_ => None,
		}
	}
}

impl From<&str> for RpcValue {
	fn from(s: &str) -> RpcValue {
		RpcValue::Str(s.to_string())
	}
}

impl From<String> for RpcValue {
	fn from(s: String) -> RpcValue {
		RpcValue::Str(s)
	}
}

impl From<i64> for RpcValue {
	fn from(i: i64) -> RpcValue {
		RpcValue::Int(i)
	}
}

impl From<u64> for RpcValue {
	fn from(i: u64) -> RpcValue {
		RpcValue::Int(i as i64)
	}
}

impl From<usize> for RpcValue {
	fn from(i: usize) -> RpcValue {
		RpcValue::Int(i as i64)
	}
}
