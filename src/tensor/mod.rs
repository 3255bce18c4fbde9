//! # Tensor Module
//!
//! Flat activation/gradient buffers and the addressing scheme every layer in
//! this crate shares. There is no owning tensor type here on purpose: layers
//! borrow the caller's `[TensorData]` slices and own only their state buffers
//! (see [`storage::Storage`]).

// --- Submodules ---
pub mod layout;
pub mod storage;

// --- Re-exports ---
pub use layout::Layout;
pub use storage::Storage;

// --- Error Handling ---
#[derive(thiserror::Error, Debug)]
pub enum TensorError {
    #[error("Buffer length mismatch for {buffer}: expected {expected}, got {got}")]
    LengthMismatch {
        buffer: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("{param} must be positive")]
    NonPositive { param: &'static str },
    #[error("Dropout probability must lie in [0, 1), got {0}")]
    InvalidProbability(f32),
    #[error(
        "Window of size {size} at stride {stride} leaves no output for an input extent of {extent} with padding {pad}"
    )]
    WindowTooLarge {
        size: usize,
        stride: usize,
        extent: usize,
        pad: usize,
    },
    #[error("Backward called without a matching forward pass on this layer")]
    StalePass,
    #[error("ndarray error: {0}")]
    NdarrayError(#[from] ndarray::ShapeError),
}

// Element type of every activation and gradient buffer.
pub type TensorData = f32;

/// Checks that a caller-provided buffer has exactly the length a layer expects.
pub(crate) fn check_len(
    buffer: &'static str,
    expected: usize,
    got: usize,
) -> Result<(), TensorError> {
    if expected != got {
        return Err(TensorError::LengthMismatch {
            buffer,
            expected,
            got,
        });
    }
    Ok(())
}

/// Rejects zero-valued geometry parameters (kernel size, stride, extents).
pub(crate) fn check_positive(param: &'static str, value: usize) -> Result<(), TensorError> {
    if value == 0 {
        return Err(TensorError::NonPositive { param });
    }
    Ok(())
}

/// Number of window positions along one axis spanning `padded` cells.
///
/// Computes `(padded - size) / stride + 1` with the division truncating toward
/// zero, so a window that overhangs the padded extent by less than one stride
/// still yields a single position. `None` when no position remains.
pub(crate) fn window_count(padded: usize, size: usize, stride: usize) -> Option<usize> {
    let count = (padded as isize - size as isize) / stride as isize + 1;
    (count > 0).then_some(count as usize)
}
