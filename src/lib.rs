//! # rustnet Core Library
//!
//! Layer primitives for a darknet-style feed-forward/back-propagation network:
//!
//! - [`nn::im2col`]: unfolds an image so a convolution becomes one matrix multiply
//! - [`nn::MaxPool2d`]: max pooling that records which input won every window
//! - [`nn::Dropout`]: inverted dropout that replays its mask on backward
//!
//! All of them read and write flat `f32` buffers laid out as
//! `[batch, channel, height, width]` (see [`tensor::Layout`]). The network
//! driver, GEMM kernel and weight updates live outside this crate.
//!
//! ```rust
//! use rustnet::nn::{MaxPool2d, Mode, DropoutConfig};
//!
//! let mut pool = MaxPool2d::new(1, 4, 4, 1, 2, 2, 0)?;
//! let input: Vec<f32> = (1..=16).map(|x| x as f32).collect();
//! let pass = pool.forward(&input)?;
//! assert_eq!(pool.output(), &[6.0, 8.0, 14.0, 16.0]);
//!
//! pool.delta_mut().fill(1.0);
//! let mut input_delta = vec![0.0; 16];
//! pool.backward(pass, Some(input_delta.as_mut_slice()))?;
//! assert_eq!(input_delta.iter().sum::<f32>(), 4.0);
//!
//! let mut dropout = DropoutConfig::new(1, 4, 0.5).seed(42).build()?;
//! let mut x = pool.output().to_vec();
//! let _pass = dropout.forward(&mut x, Mode::Eval)?;
//! assert_eq!(x, pool.output());
//! # Ok::<(), rustnet::tensor::TensorError>(())
//! ```

pub mod bindings;
pub mod nn;
pub mod tensor;
pub mod utils;

pub use nn::{AnyLayer, Dropout, ForwardPass, Layer, LayerConfig, MaxPool2d, Mode};
pub use tensor::{Layout, TensorData, TensorError};
