//! The seam an external I/O statistics module plugs into.
//!
//! The core only ever reports piece-level I/O through this trait; it does
//! not keep histograms, per-descriptor counters, or any other accounting
//! state itself. `block_stats` in [`crate::config::Config`] is read by
//! implementors of this trait, not by the core.
use crate::Piece;

/// Receives notice of every read/write the Block I/O Engine dispatches, in
/// terms of the pieces it was split into.
pub trait IoObserver: Send + Sync {
	fn record_read(&self, pieces: &[Piece]) {
		let _ = pieces;
	}

	fn record_write(&self, pieces: &[Piece]) {
		let _ = pieces;
	}
}

/// Default observer: does nothing. Used when the caller doesn't wire up an
/// external statistics collector.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl IoObserver for NullObserver {}
