// # Config Source Implementations
//
// This module provides implementations of the ConfigSource trait for
// different configuration backends.

pub mod file;
pub mod memory;

pub use file::FileConfigSource;
pub use memory::StaticConfigSource;
