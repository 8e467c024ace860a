//! Foundation types for conch.
//!
//! This crate contains the error type and result alias shared by all conch
//! crates.

pub mod error;
