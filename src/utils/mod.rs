//! Shared utilities and error types

pub mod error;

pub use error::{DecodeError, FetchError, LoadError, Result, ScoutError};
