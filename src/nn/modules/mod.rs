//! # Neural Network Layer Modules
//!
//! Stateful layers. Each one owns its state buffers, borrows the network's
//! activation/gradient buffers per call, and pairs every backward with the
//! forward that produced its [`ForwardPass`](crate::nn::ForwardPass).

// --- Re-export Layer Implementations ---
pub mod dropout;
pub use dropout::{Dropout, DropoutConfig};

pub mod pooling;
pub use pooling::{MaxPool2d, MaxPoolConfig};
