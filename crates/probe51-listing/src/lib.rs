//! Listing-file support
//!
//! Builds the line→address table a debug session needs to translate between
//! source lines and target memory addresses.

pub mod map;
pub mod reader;

pub use map::AddressLineMap;
pub use reader::{parse_listing, read_listing};

use thiserror::Error;

/// Listing result type
pub type Result<T> = std::result::Result<T, Error>;

/// Listing errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read listing file: {0}")]
    Io(#[from] std::io::Error),

    #[error("listing contains no code addresses: {0}")]
    NoCode(String),
}
