#[macro_use]
extern crate tracing;

pub mod engine;
pub mod metrics;
pub mod pieces;

pub use engine::BlockIoEngine;
pub use pieces::gather_pieces;

#[cfg(test)]
mod tests;
