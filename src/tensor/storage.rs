//! # Layer Storage
//!
//! Owned, resizable state buffers (outputs, deltas, pooling indexes, dropout
//! draws). Activation and gradient buffers coming from the network are never
//! stored here; they are borrowed per call.

use ndarray::{ArrayView4, ArrayViewMut4};

use super::{Layout, TensorError};

/// A flat buffer exclusively owned by one layer instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Storage<T> {
    data: Vec<T>,
}

impl<T: Clone + Default> Storage<T> {
    /// Allocates `len` default-initialized elements.
    pub fn zeros(len: usize) -> Self {
        Storage {
            data: vec![T::default(); len],
        }
    }

    /// Reallocates to `len` elements. Previous contents are not preserved.
    pub fn resize(&mut self, len: usize) {
        self.data.clear();
        self.data.resize(len, T::default());
    }

    /// Resets every element to its default value without reallocating.
    pub fn fill_default(&mut self) {
        self.data.fill(T::default());
    }
}

impl<T> Storage<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    // ndarray accepts a slice longer than the shape, so lengths are compared here.
    fn check_layout(&self, layout: Layout) -> Result<(), TensorError> {
        if layout.len() != self.data.len() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.data.len()],
                got: layout.dims().to_vec(),
            });
        }
        Ok(())
    }

    /// Shaped read-only view over the buffer.
    pub fn view(&self, layout: Layout) -> Result<ArrayView4<'_, T>, TensorError> {
        self.check_layout(layout)?;
        Ok(ArrayView4::from_shape(layout.dims(), &self.data)?)
    }

    /// Shaped mutable view over the buffer.
    pub fn view_mut(&mut self, layout: Layout) -> Result<ArrayViewMut4<'_, T>, TensorError> {
        self.check_layout(layout)?;
        Ok(ArrayViewMut4::from_shape(layout.dims(), &mut self.data)?)
    }
}
