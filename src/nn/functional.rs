//! # Neural Network Functional Interface (`nn::functional`)
//!
//! Stateless layout transforms feeding a convolution's matrix multiply.
//!
//! `im2col` materializes every sliding-window patch of an image as one column
//! of a `(channels * ksize * ksize) x (height_col * width_col)` matrix, so that
//! convolving with `n` filters becomes a single GEMM of the `n x
//! (channels * ksize * ksize)` weight matrix against it. Padding is implicit:
//! padded coordinates read as `0.0` and are never stored.

use ndarray::{Array2, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::tensor::{check_len, check_positive, window_count, Layout, TensorData, TensorError};

/// Validated geometry of an im2col/col2im transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "GeometryParams", into = "GeometryParams")]
pub struct ConvGeometry {
    channels: usize,
    height: usize,
    width: usize,
    ksize: usize,
    stride: usize,
    pad: usize,
    height_col: usize,
    width_col: usize,
}

#[derive(Serialize, Deserialize)]
struct GeometryParams {
    channels: usize,
    height: usize,
    width: usize,
    ksize: usize,
    stride: usize,
    pad: usize,
}

impl TryFrom<GeometryParams> for ConvGeometry {
    type Error = TensorError;

    fn try_from(p: GeometryParams) -> Result<Self, Self::Error> {
        ConvGeometry::new(p.channels, p.height, p.width, p.ksize, p.stride, p.pad)
    }
}

impl From<ConvGeometry> for GeometryParams {
    fn from(g: ConvGeometry) -> Self {
        GeometryParams {
            channels: g.channels,
            height: g.height,
            width: g.width,
            ksize: g.ksize,
            stride: g.stride,
            pad: g.pad,
        }
    }
}

fn col_extent(extent: usize, ksize: usize, stride: usize, pad: usize) -> Result<usize, TensorError> {
    window_count(extent + 2 * pad, ksize, stride).ok_or(TensorError::WindowTooLarge {
        size: ksize,
        stride,
        extent,
        pad,
    })
}

impl ConvGeometry {
    /// # Arguments
    /// * `channels`, `height`, `width`: Shape of the (unpadded) input image.
    /// * `ksize`: Side of the square kernel.
    /// * `stride`: Step between neighbouring windows.
    /// * `pad`: Zero padding added on every side.
    pub fn new(
        channels: usize,
        height: usize,
        width: usize,
        ksize: usize,
        stride: usize,
        pad: usize,
    ) -> Result<Self, TensorError> {
        check_positive("channels", channels)?;
        check_positive("height", height)?;
        check_positive("width", width)?;
        check_positive("ksize", ksize)?;
        check_positive("stride", stride)?;
        Ok(ConvGeometry {
            channels,
            height,
            width,
            ksize,
            stride,
            pad,
            height_col: col_extent(height, ksize, stride, pad)?,
            width_col: col_extent(width, ksize, stride, pad)?,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn ksize(&self) -> usize {
        self.ksize
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn pad(&self) -> usize {
        self.pad
    }

    /// Output spatial height of the convolution.
    pub fn height_col(&self) -> usize {
        self.height_col
    }

    /// Output spatial width of the convolution.
    pub fn width_col(&self) -> usize {
        self.width_col
    }

    /// Rows of the column matrix: one per (channel, kernel row, kernel col).
    pub fn rows(&self) -> usize {
        self.channels * self.ksize * self.ksize
    }

    /// Columns of the column matrix: one per window position.
    pub fn cols(&self) -> usize {
        self.height_col * self.width_col
    }

    pub fn col_len(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn image_layout(&self) -> Layout {
        Layout::image(self.channels, self.height, self.width)
    }

    /// Visits every column-matrix cell with the image offset it reads, if any.
    fn for_each_cell(&self, mut visit: impl FnMut(usize, Option<usize>)) {
        let layout = self.image_layout();
        let k = self.ksize;
        let pad = self.pad as isize;
        for c in 0..self.rows() {
            let w_offset = c % k;
            let h_offset = (c / k) % k;
            let c_im = c / k / k;
            for h in 0..self.height_col {
                let im_row = (h_offset + h * self.stride) as isize - pad;
                for w in 0..self.width_col {
                    let im_col = (w_offset + w * self.stride) as isize - pad;
                    let col_index = (c * self.height_col + h) * self.width_col + w;
                    visit(col_index, layout.checked_offset(0, c_im, im_row, im_col));
                }
            }
        }
    }
}

/// Unfolds `data_im` into the pre-sized column matrix `data_col`.
///
/// `data_im` holds one `channels x height x width` image; `data_col` must hold
/// exactly [`ConvGeometry::col_len`] elements. Every cell is overwritten.
pub fn im2col(
    geometry: &ConvGeometry,
    data_im: &[TensorData],
    data_col: &mut [TensorData],
) -> Result<(), TensorError> {
    check_len("image", geometry.image_layout().len(), data_im.len())?;
    check_len("column matrix", geometry.col_len(), data_col.len())?;
    geometry.for_each_cell(|col_index, im_index| {
        data_col[col_index] = im_index.map_or(0.0, |i| data_im[i]);
    });
    Ok(())
}

/// Folds a column matrix back onto an image, accumulating overlapping windows.
///
/// This is the adjoint of [`im2col`]: it routes column gradients to the pixels
/// they were read from. Cells that read padding are dropped. `data_im` is added
/// to, not overwritten.
pub fn col2im(
    geometry: &ConvGeometry,
    data_col: &[TensorData],
    data_im: &mut [TensorData],
) -> Result<(), TensorError> {
    check_len("column matrix", geometry.col_len(), data_col.len())?;
    check_len("image", geometry.image_layout().len(), data_im.len())?;
    geometry.for_each_cell(|col_index, im_index| {
        if let Some(i) = im_index {
            data_im[i] += data_col[col_index];
        }
    });
    Ok(())
}

/// Allocating variant of [`im2col`] over a `[channels, height, width]` array.
pub fn im2col_array(
    image: ArrayView3<'_, TensorData>,
    ksize: usize,
    stride: usize,
    pad: usize,
) -> Result<Array2<TensorData>, TensorError> {
    let (channels, height, width) = image.dim();
    let geometry = ConvGeometry::new(channels, height, width, ksize, stride, pad)?;
    // iter() walks in logical order, so non-contiguous views flatten correctly.
    let data_im: Vec<TensorData> = image.iter().copied().collect();
    let mut data_col = vec![0.0; geometry.col_len()];
    im2col(&geometry, &data_im, &mut data_col)?;
    Ok(Array2::from_shape_vec(
        (geometry.rows(), geometry.cols()),
        data_col,
    )?)
}
