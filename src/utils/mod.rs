//! # Utility Functions (`utils`)
//!
//! Helpers around the layers that are not part of a forward/backward pass.

pub mod serialization;

pub use serialization::{load_configs, save_configs};
