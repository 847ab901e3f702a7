//! Helpers shared across the deskgram crates.

pub mod error;

pub use error::FromMessage;
