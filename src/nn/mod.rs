//! # Neural Network Module (`nn`)
//!
//! Layer primitives that sit between an upstream activation producer and a
//! downstream consumer: the stateless im2col transform in [`functional`] and
//! the stateful max-pooling and dropout layers in [`modules`].

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

use crate::tensor::{TensorData, TensorError};

// --- Submodules ---
pub mod functional;
pub mod modules;
pub mod pass;

// Re-export common items
pub use functional::{col2im, im2col, im2col_array, ConvGeometry};
pub use modules::*;
pub use pass::{ForwardPass, Mode};

// --- Core Trait: Layer ---

/// Shape bookkeeping shared by all stateful layers.
///
/// `Display` renders the one-line summary printed when a layer is built
/// verbosely.
pub trait Layer: Debug + Display + Send {
    fn name(&self) -> &'static str;

    fn batch(&self) -> usize;

    /// Elements per sample consumed by `forward`.
    fn inputs(&self) -> usize;

    /// Elements per sample produced by `forward`.
    fn outputs(&self) -> usize;
}

/// Serializable description of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerConfig {
    MaxPool(MaxPoolConfig),
    Dropout(DropoutConfig),
}

impl LayerConfig {
    /// Validates and builds the described layer.
    pub fn build(&self) -> Result<AnyLayer, TensorError> {
        Ok(match self {
            LayerConfig::MaxPool(config) => AnyLayer::MaxPool(config.build()?),
            LayerConfig::Dropout(config) => AnyLayer::Dropout(config.build()?),
        })
    }
}

/// A layer built from a [`LayerConfig`].
///
/// `forward` and `backward` follow the buffer conventions of the wrapped
/// layer: max pooling reads `input` and writes its own output buffer, and
/// takes its output gradient from [`MaxPool2d::delta_mut`]; dropout masks
/// `input` and the gradient in place.
#[derive(Debug)]
pub enum AnyLayer {
    MaxPool(MaxPool2d),
    Dropout(Dropout),
}

impl AnyLayer {
    /// Runs the forward pass. `mode` only matters to dropout.
    pub fn forward(
        &mut self,
        input: &mut [TensorData],
        mode: Mode,
    ) -> Result<ForwardPass, TensorError> {
        match self {
            AnyLayer::MaxPool(layer) => layer.forward(input),
            AnyLayer::Dropout(layer) => layer.forward(input, mode),
        }
    }

    /// Runs the backward pass matching `pass`.
    ///
    /// For max pooling `delta` receives the input gradient; for dropout it is
    /// the gradient being masked in place.
    pub fn backward(
        &mut self,
        pass: ForwardPass,
        delta: Option<&mut [TensorData]>,
    ) -> Result<(), TensorError> {
        match self {
            AnyLayer::MaxPool(layer) => layer.backward(pass, delta),
            AnyLayer::Dropout(layer) => layer.backward(pass, delta),
        }
    }

    /// The layer's own output buffer; `None` for layers that work in place.
    pub fn output(&self) -> Option<&[TensorData]> {
        match self {
            AnyLayer::MaxPool(layer) => Some(layer.output()),
            AnyLayer::Dropout(_) => None,
        }
    }

    pub fn as_max_pool_mut(&mut self) -> Option<&mut MaxPool2d> {
        match self {
            AnyLayer::MaxPool(layer) => Some(layer),
            AnyLayer::Dropout(_) => None,
        }
    }

    pub fn as_dropout_mut(&mut self) -> Option<&mut Dropout> {
        match self {
            AnyLayer::Dropout(layer) => Some(layer),
            AnyLayer::MaxPool(_) => None,
        }
    }

    fn inner(&self) -> &dyn Layer {
        match self {
            AnyLayer::MaxPool(layer) => layer as &dyn Layer,
            AnyLayer::Dropout(layer) => layer as &dyn Layer,
        }
    }
}

impl Layer for AnyLayer {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn batch(&self) -> usize {
        self.inner().batch()
    }

    fn inputs(&self) -> usize {
        self.inner().inputs()
    }

    fn outputs(&self) -> usize {
        self.inner().outputs()
    }
}

impl fmt::Display for AnyLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self.inner(), f)
    }
}

impl From<MaxPool2d> for AnyLayer {
    fn from(layer: MaxPool2d) -> Self {
        AnyLayer::MaxPool(layer)
    }
}

impl From<Dropout> for AnyLayer {
    fn from(layer: Dropout) -> Self {
        AnyLayer::Dropout(layer)
    }
}

impl From<MaxPoolConfig> for LayerConfig {
    fn from(config: MaxPoolConfig) -> Self {
        LayerConfig::MaxPool(config)
    }
}

impl From<DropoutConfig> for LayerConfig {
    fn from(config: DropoutConfig) -> Self {
        LayerConfig::Dropout(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_reports_shapes() {
        let pool = LayerConfig::from(MaxPoolConfig::new(2, 4, 4, 3, 2, 2, 0))
            .build()
            .unwrap();
        assert_eq!(pool.name(), "max");
        assert_eq!(pool.batch(), 2);
        assert_eq!(pool.inputs(), 48);
        assert_eq!(pool.outputs(), 12);

        let dropout = LayerConfig::from(DropoutConfig::new(2, 10, 0.25))
            .build()
            .unwrap();
        assert_eq!(dropout.name(), "dropout");
        assert_eq!(dropout.inputs(), dropout.outputs());
    }

    #[test]
    fn built_layers_run_forward_and_backward() {
        let mut pool = LayerConfig::from(MaxPoolConfig::new(1, 2, 2, 1, 2, 2, 0))
            .build()
            .unwrap();
        let mut input = vec![1.0, 9.0, 3.0, 4.0];
        let pass = pool.forward(&mut input, Mode::Train).unwrap();
        assert_eq!(pool.output(), Some(&[9.0][..]));

        pool.as_max_pool_mut().unwrap().delta_mut()[0] = 2.0;
        let mut input_delta = vec![0.0; 4];
        pool.backward(pass, Some(input_delta.as_mut_slice())).unwrap();
        assert_eq!(input_delta, vec![0.0, 2.0, 0.0, 0.0]);
        assert!(pool.as_dropout_mut().is_none());

        let mut dropout = LayerConfig::from(DropoutConfig::new(1, 4, 0.5).seed(11))
            .build()
            .unwrap();
        assert_eq!(dropout.output(), None);
        let mut x = vec![1.0; 4];
        let pass = dropout.forward(&mut x, Mode::Train).unwrap();
        let mut delta = vec![1.0; 4];
        dropout.backward(pass, Some(delta.as_mut_slice())).unwrap();
        assert_eq!(delta, x);
        assert!(dropout.to_string().starts_with("dropout       p = 0.50"));
    }

    #[test]
    fn build_rejects_invalid_config() {
        let config = LayerConfig::from(DropoutConfig::new(1, 4, 1.0));
        assert!(matches!(
            config.build(),
            Err(TensorError::InvalidProbability(p)) if p == 1.0
        ));
    }
}
