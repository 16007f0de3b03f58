//! Content store backends.

pub mod memory;
