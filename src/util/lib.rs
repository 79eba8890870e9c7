#[macro_use]
extern crate tracing;

pub mod config;
pub mod error;
pub mod metrics;
pub mod observer;
pub mod piece;
pub mod time;

pub use config::Config;
pub use error::{Error, Result};
pub use piece::Piece;
