//! Common utilities and types shared across the fleet crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
