//! # Bindings
//!
//! Foreign-language surfaces over the layer core, each behind its own feature.

#[cfg(feature = "python")]
pub mod python;
