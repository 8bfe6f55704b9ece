//! Shared test utilities for sensordb crates.
//!
//! - [`TestDir`] - Scratch directory for store and config files
//! - [`strategies`] - Proptest generators for readings, ranges and names
//! - [`fixtures`] - Canned sensor data

#![deny(unsafe_code)]
// Test utilities are allowed to use unwrap for simplicity
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod test_dir;
pub use test_dir::TestDir;

pub mod fixtures;
pub mod strategies;
