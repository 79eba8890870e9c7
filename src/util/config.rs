//! Contains types related to the virtual-disk core's configuration.
//!
//! Actually reading a config file from disk, from the CLI, or from the
//! environment is the job of an external loader; this module
//! only carries the typed shape that loader hands to the core, plus a
//! helper to parse an in-memory TOML string (e.g. for tests).
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Error;

/// The set of options the core consumes.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
	/// Base directory for local block files.
	pub image_root: PathBuf,

	/// Reserved for persistence backends that need a path of their own.
	pub meta_root: PathBuf,

	/// Integer-substitution template for per-block filenames, e.g.
	/// `"block-{}"`. MUST yield distinct filenames for distinct indices;
	/// the core does not validate this, it is a configuration contract.
	pub blockname_format: String,

	/// TCP port where peer hypervisors listen for `proxy_update_metadata`.
	pub core_port: u16,

	/// TCP port where node-storage RPC listens.
	pub proxy_port: u16,

	/// Whether to emit per-block I/O counts to the observer.
	#[serde(default)]
	pub block_stats: bool,

	/// Address to bind for the RPC transport's own listener, if this node
	/// also accepts incoming calls. Not required by the core itself (it
	/// only ever dials out), but carried here since a deployment needs it
	/// to stand up the matching server.
	pub rpc_bind_addr: Option<SocketAddr>,
}

impl Config {
	/// Parses configuration already read into memory. Reading the bytes
	/// off disk, from `--config`, or from the environment is out of
	/// scope for the core; this just turns a TOML string into a `Config`.
	pub fn from_str(toml_str: &str) -> Result<Config, Error> {
		Ok(toml::from_str(toml_str)?)
	}

	/// Substitutes `block_idx` into `blockname_format`, the same way the
	/// original `UKAIConfig['blockname_format'] % num` does.
	pub fn block_filename(&self, block_idx: usize) -> String {
		if self.blockname_format.contains("{}") {
			self.blockname_format.replacen("{}", &block_idx.to_string(), 1)
		} else {
			format!("{}{}", self.blockname_format, block_idx)
		}
	}
}
