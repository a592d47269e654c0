//! rotastream core - shared types, configuration, and error handling

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
pub mod units;

pub use config::*;
pub use constants::*;
pub use error::{Error, Result};
pub use types::*;
pub use units::{ensure_directory, parse_size};
