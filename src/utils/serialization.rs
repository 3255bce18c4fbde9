//! # Layer Config Serialization
//!
//! Saves and loads a network's layer descriptions. Uses `serde` for
//! serialization and `bincode` as the binary format.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::nn::{AnyLayer, LayerConfig};
use crate::tensor::TensorError;

// --- Error Type ---
#[derive(thiserror::Error, Debug)]
pub enum SerializationError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization Error (Bincode): {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Invalid config for layer {index}: {source}")]
    InvalidLayer {
        index: usize,
        #[source]
        source: TensorError,
    },
}

/// Writes `configs` to `path`, replacing any existing file.
pub fn save_configs<P: AsRef<Path>>(
    configs: &[LayerConfig],
    path: P,
) -> Result<(), SerializationError> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, configs)?;
    writer.flush()?;
    Ok(())
}

/// Reads the configs written by [`save_configs`] without validating them.
pub fn load_configs<P: AsRef<Path>>(path: P) -> Result<Vec<LayerConfig>, SerializationError> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    Ok(bincode::deserialize_from(reader)?)
}

/// Reads configs from `path` and builds every layer, in order.
///
/// Verbose configs print their layer summary while building, which yields the
/// usual layer table on stderr.
pub fn load_layers<P: AsRef<Path>>(path: P) -> Result<Vec<AnyLayer>, SerializationError> {
    load_configs(path)?
        .iter()
        .enumerate()
        .map(|(index, config)| {
            config
                .build()
                .map_err(|source| SerializationError::InvalidLayer { index, source })
        })
        .collect()
}
