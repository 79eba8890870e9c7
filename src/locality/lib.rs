//! The Locality Oracle: decides whether a node address refers to the
//! host this process is running on, by consulting the host's own
//! network-interface addresses.
#[macro_use]
extern crate tracing;

use std::collections::HashSet;
use std::net::IpAddr;

use vdisk_util::error::Error;

/// Enumerates a host's own addresses once, at construction time, and
/// answers `is_local` against that snapshot for the rest of the process
/// lifetime: callers get a stable-enough answer per call, not a live one
/// that tracks interface reconfiguration.
#[derive(Debug, Clone)]
pub struct LocalityOracle {
	local_addrs: HashSet<IpAddr>,
}

impl LocalityOracle {
	/// Enumerates the host's network interfaces across all address
	/// families. Interface enumeration failing is a fatal startup error.
	pub fn from_system() -> Result<Self, Error> {
		let mut local_addrs = HashSet::new();
		for iface in pnet_datalink::interfaces() {
			for ip_network in iface.ips {
				local_addrs.insert(ip_network.ip());
			}
		}
		if local_addrs.is_empty() {
			return Err(Error::message(
				"interface enumeration returned no addresses; refusing to start",
			));
		}
		debug!("locality oracle resolved {} local address(es)", local_addrs.len());
		Ok(LocalityOracle { local_addrs })
	}

	/// Builds an oracle from an explicit address set, bypassing real
	/// interface enumeration. Used by tests and by callers that already
	/// know their own addresses (e.g. from configuration).
	pub fn with_addresses<I: IntoIterator<Item = IpAddr>>(addrs: I) -> Self {
		LocalityOracle {
			local_addrs: addrs.into_iter().collect(),
		}
	}

	/// Returns true iff `node` exactly matches one of this host's
	/// configured addresses.
	pub fn is_local(&self, node: &IpAddr) -> bool {
		self.local_addrs.contains(node)
	}
}
