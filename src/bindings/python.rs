//! # Python Bindings for rustnet
//!
//! This module uses PyO3 to expose the layer core to Python as the `rustnet`
//! module. Buffers cross the boundary as flat lists of floats in the same
//! `[batch, channel, height, width]` layout the Rust API uses.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::nn::{self, ConvGeometry, Dropout, ForwardPass, MaxPool2d, Mode};
use crate::tensor::{TensorData, TensorError};

// --- Helper to Convert Rust Errors to Python Exceptions ---
impl std::convert::From<TensorError> for PyErr {
    fn from(err: TensorError) -> PyErr {
        match err {
            TensorError::StalePass => PyRuntimeError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

fn missing_forward() -> PyErr {
    PyRuntimeError::new_err("backward called before forward")
}

// --- Functional (`rustnet.im2col`) ---

/// Unfolds a `channels x height x width` image into its column matrix.
#[pyfunction]
#[pyo3(signature = (image, channels, height, width, ksize, stride=1, pad=0))]
fn im2col(
    image: Vec<TensorData>,
    channels: usize,
    height: usize,
    width: usize,
    ksize: usize,
    stride: usize,
    pad: usize,
) -> PyResult<Vec<TensorData>> {
    let geometry = ConvGeometry::new(channels, height, width, ksize, stride, pad)?;
    let mut cols = vec![0.0; geometry.col_len()];
    nn::im2col(&geometry, &image, &mut cols)?;
    Ok(cols)
}

// --- Layers (`rustnet.MaxPool2d`, `rustnet.Dropout`) ---

#[pyclass(name = "MaxPool2d")]
#[derive(Debug)]
struct PyMaxPool2d {
    layer: MaxPool2d,
    // Token of the latest forward, consumed by backward.
    pass: Option<ForwardPass>,
}

#[pymethods]
impl PyMaxPool2d {
    #[new]
    #[pyo3(signature = (batch, height, width, channels, size, stride, padding=0))]
    fn new(
        batch: usize,
        height: usize,
        width: usize,
        channels: usize,
        size: usize,
        stride: usize,
        padding: usize,
    ) -> PyResult<Self> {
        let layer = MaxPool2d::new(batch, height, width, channels, size, stride, padding)?;
        Ok(PyMaxPool2d { layer, pass: None })
    }

    fn forward(&mut self, input: Vec<TensorData>) -> PyResult<Vec<TensorData>> {
        self.pass = Some(self.layer.forward(&input)?);
        Ok(self.layer.output().to_vec())
    }

    /// Takes the gradient of the output, returns the gradient of the input.
    fn backward(&mut self, delta: Vec<TensorData>) -> PyResult<Vec<TensorData>> {
        let pass = self.pass.take().ok_or_else(missing_forward)?;
        let layer_delta = self.layer.delta_mut();
        if layer_delta.len() != delta.len() {
            return Err(TensorError::LengthMismatch {
                buffer: "delta",
                expected: layer_delta.len(),
                got: delta.len(),
            }
            .into());
        }
        layer_delta.copy_from_slice(&delta);
        let mut input_delta = vec![0.0; self.layer.input_layout().len()];
        self.layer.backward(pass, Some(input_delta.as_mut_slice()))?;
        Ok(input_delta)
    }

    fn resize(&mut self, width: usize, height: usize) -> PyResult<()> {
        self.layer.resize(width, height)?;
        Ok(())
    }

    fn __call__(&mut self, input: Vec<TensorData>) -> PyResult<Vec<TensorData>> {
        self.forward(input)
    }

    fn __repr__(&self) -> String {
        self.layer.to_string()
    }
}

#[pyclass(name = "Dropout")]
#[derive(Debug)]
struct PyDropout {
    layer: Dropout,
    pass: Option<ForwardPass>,
    training: bool,
}

#[pymethods]
impl PyDropout {
    #[new]
    #[pyo3(signature = (batch, inputs, p=0.5, seed=None))]
    fn new(batch: usize, inputs: usize, p: f32, seed: Option<u64>) -> PyResult<Self> {
        let mut config = nn::DropoutConfig::new(batch, inputs, p);
        config.seed = seed;
        Ok(PyDropout {
            layer: config.build()?,
            pass: None,
            training: true,
        })
    }

    /// Set the module to training mode.
    fn train(&mut self) {
        self.training = true;
    }

    /// Set the module to evaluation mode.
    fn eval(&mut self) {
        self.training = false;
    }

    fn forward(&mut self, mut input: Vec<TensorData>) -> PyResult<Vec<TensorData>> {
        self.pass = Some(self.layer.forward(&mut input, Mode::from(self.training))?);
        Ok(input)
    }

    fn backward(&mut self, mut delta: Vec<TensorData>) -> PyResult<Vec<TensorData>> {
        let pass = self.pass.take().ok_or_else(missing_forward)?;
        self.layer.backward(pass, Some(delta.as_mut_slice()))?;
        Ok(delta)
    }

    fn resize(&mut self, inputs: usize) -> PyResult<()> {
        self.layer.resize(inputs)?;
        Ok(())
    }

    fn __call__(&mut self, input: Vec<TensorData>) -> PyResult<Vec<TensorData>> {
        self.forward(input)
    }

    fn __repr__(&self) -> String {
        self.layer.to_string()
    }
}

// --- Main Python Module Definition (`rustnet`) ---
#[pymodule]
fn rustnet(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(im2col, m)?)?;
    m.add_class::<PyMaxPool2d>()?;
    m.add_class::<PyDropout>()?;
    Ok(())
}
