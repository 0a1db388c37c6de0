#![deny(unused_must_use)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

pub mod config;
pub mod storage;
pub mod transaction;
pub mod utils;

use thiserror::Error;

/// The error type which is returned from this crate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("block store exhausted")]
    OutOfBlocks,
}

/// A specialized `Result` type for this crate.
pub type Result<T = ()> = std::result::Result<T, Error>;
