//! Metrics for the Block I/O Engine, covering exactly the operations this
//! engine performs: no resync queue, no reference counting, no corruption
//! detection.
use opentelemetry::{global, metrics::*};

pub struct BlockEngineMetrics {
	pub(crate) bytes_read: Counter<u64>,
	pub(crate) block_read_duration: Histogram<f64>,
	pub(crate) bytes_written: Counter<u64>,
	pub(crate) block_write_duration: Histogram<f64>,
	pub(crate) sync_counter: Counter<u64>,
	pub(crate) sync_duration: Histogram<f64>,
	pub(crate) sync_error_counter: Counter<u64>,
}

impl BlockEngineMetrics {
	pub fn new() -> Self {
		let meter = global::meter("vdisk/block");
		Self {
			bytes_read: meter
				.u64_counter("block.bytes_read")
				.with_description("Number of bytes read from disk or peers")
				.init(),
			block_read_duration: meter
				.f64_histogram("block.read_duration")
				.with_description("Duration of block read operations")
				.init(),
			bytes_written: meter
				.u64_counter("block.bytes_written")
				.with_description("Number of bytes written to disk or peers")
				.init(),
			block_write_duration: meter
				.f64_histogram("block.write_duration")
				.with_description("Duration of block write operations")
				.init(),
			sync_counter: meter
				.u64_counter("block.sync_counter")
				.with_description("Number of calls to synchronize_block")
				.init(),
			sync_duration: meter
				.f64_histogram("block.sync_duration")
				.with_description("Duration of synchronize_block operations")
				.init(),
			sync_error_counter: meter
				.u64_counter("block.sync_error_counter")
				.with_description("Number of synchronize_block calls that found no source replica")
				.init(),
		}
	}
}

impl Default for BlockEngineMetrics {
	fn default() -> Self {
		Self::new()
	}
}
