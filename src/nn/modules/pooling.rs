//! # Max Pooling Layer Module

use ndarray::{ArrayView4, ArrayViewMut4};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::nn::pass::{ForwardPass, Mode, PassTracker};
use crate::nn::Layer;
use crate::tensor::{
    check_len, check_positive, window_count, Layout, Storage, TensorData, TensorError,
};

/// Construction parameters for [`MaxPool2d`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxPoolConfig {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    /// Side of the square pooling window.
    pub size: usize,
    pub stride: usize,
    /// Total padding; split as `padding / 2` before the first window.
    pub padding: usize,
    /// Print the layer summary on stderr when built.
    #[serde(default)]
    pub verbose: bool,
}

impl MaxPoolConfig {
    pub fn new(
        batch: usize,
        height: usize,
        width: usize,
        channels: usize,
        size: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        MaxPoolConfig {
            batch,
            height,
            width,
            channels,
            size,
            stride,
            padding,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn build(&self) -> Result<MaxPool2d, TensorError> {
        let layer = MaxPool2d::new(
            self.batch,
            self.height,
            self.width,
            self.channels,
            self.size,
            self.stride,
            self.padding,
        )?;
        if self.verbose {
            eprintln!("{}", layer);
        }
        Ok(layer)
    }
}

/// Spatial downsampling that keeps, per output, the input index of the maximum.
///
/// Input shape: `(batch, channels, height, width)` flattened.
/// Output shape: `(batch, channels, out_h, out_w)` with
/// `out = (in + padding - size) / stride + 1`.
///
/// The layer owns its output, delta and index buffers. The network writes the
/// gradient of this layer's output into [`MaxPool2d::delta_mut`] before calling
/// [`MaxPool2d::backward`].
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    input: Layout,
    output: Layout,
    size: usize,
    stride: usize,
    pad: usize,

    output_buf: Storage<TensorData>,
    delta: Storage<TensorData>,
    // Flat input offset that produced each output; None when the whole window was padding.
    indexes: Storage<Option<usize>>,

    passes: PassTracker,
}

fn pooled_extent(extent: usize, size: usize, stride: usize, pad: usize) -> Result<usize, TensorError> {
    window_count(extent + pad, size, stride).ok_or(TensorError::WindowTooLarge {
        size,
        stride,
        extent,
        pad,
    })
}

impl MaxPool2d {
    /// Creates a max pooling layer and allocates its buffers.
    ///
    /// # Arguments
    /// * `batch`, `height`, `width`, `channels`: Input shape.
    /// * `size`: Side of the square window.
    /// * `stride`: Step between windows.
    /// * `padding`: Total padding, `padding / 2` of it before the first window.
    pub fn new(
        batch: usize,
        height: usize,
        width: usize,
        channels: usize,
        size: usize,
        stride: usize,
        padding: usize,
    ) -> Result<Self, TensorError> {
        check_positive("batch", batch)?;
        check_positive("channels", channels)?;
        check_positive("height", height)?;
        check_positive("width", width)?;
        check_positive("size", size)?;
        check_positive("stride", stride)?;

        let input = Layout::new(batch, channels, height, width);
        let output = Layout::new(
            batch,
            channels,
            pooled_extent(height, size, stride, padding)?,
            pooled_extent(width, size, stride, padding)?,
        );
        Ok(MaxPool2d {
            input,
            output,
            size,
            stride,
            pad: padding,
            output_buf: Storage::zeros(output.len()),
            delta: Storage::zeros(output.len()),
            indexes: Storage::zeros(output.len()),
            passes: PassTracker::new(),
        })
    }

    /// Adapts the layer to a new input width and height.
    ///
    /// Buffers are reallocated without preserving their contents and any
    /// outstanding [`ForwardPass`] becomes stale. Unchanged dimensions are a
    /// no-op.
    pub fn resize(&mut self, width: usize, height: usize) -> Result<(), TensorError> {
        if width == self.input.width && height == self.input.height {
            return Ok(());
        }
        check_positive("height", height)?;
        check_positive("width", width)?;
        let out_h = pooled_extent(height, self.size, self.stride, self.pad)?;
        let out_w = pooled_extent(width, self.size, self.stride, self.pad)?;

        self.input.height = height;
        self.input.width = width;
        self.output.height = out_h;
        self.output.width = out_w;

        let len = self.output.len();
        self.indexes.resize(len);
        self.output_buf.resize(len);
        self.delta.resize(len);
        self.passes.invalidate();
        Ok(())
    }

    /// Pools `input` into the layer's output buffer.
    ///
    /// Windows are scanned row by row; the first strictly greatest value wins
    /// ties. Padding cells count as negative infinity, so a window lying
    /// entirely in the padding outputs negative infinity with no source index.
    pub fn forward(&mut self, input: &[TensorData]) -> Result<ForwardPass, TensorError> {
        check_len("input", self.input.len(), input.len())?;

        let (in_layout, out_layout) = (self.input, self.output);
        let offset = -((self.pad / 2) as isize);
        let output = self.output_buf.as_mut_slice();
        let indexes = self.indexes.as_mut_slice();

        for b in 0..out_layout.batch {
            for k in 0..out_layout.channels {
                for i in 0..out_layout.height {
                    for j in 0..out_layout.width {
                        let out_index = out_layout.offset(b, k, i, j);

                        let mut max = TensorData::NEG_INFINITY;
                        let mut max_i = None;
                        for n in 0..self.size {
                            for m in 0..self.size {
                                let cur_h = offset + (i * self.stride + n) as isize;
                                let cur_w = offset + (j * self.stride + m) as isize;
                                let index = in_layout.checked_offset(b, k, cur_h, cur_w);
                                let val = index.map_or(TensorData::NEG_INFINITY, |idx| input[idx]);
                                if val > max {
                                    max = val;
                                    max_i = index;
                                }
                            }
                        }
                        output[out_index] = max;
                        indexes[out_index] = max_i;
                    }
                }
            }
        }
        Ok(self.passes.begin(Mode::Train))
    }

    /// Routes the layer's delta back to the inputs selected by `pass`.
    ///
    /// Each output gradient is **added** to `input_delta` at its recorded source
    /// index. `None` means gradient propagation is disabled upstream. Outputs
    /// whose window had no valid input route nothing.
    pub fn backward(
        &mut self,
        pass: ForwardPass,
        input_delta: Option<&mut [TensorData]>,
    ) -> Result<(), TensorError> {
        self.passes.finish(pass)?;
        let Some(input_delta) = input_delta else {
            return Ok(());
        };
        check_len("input delta", self.input.len(), input_delta.len())?;

        for (&index, &grad) in self.indexes.as_slice().iter().zip(self.delta.as_slice()) {
            if let Some(index) = index {
                input_delta[index] += grad;
            }
        }
        Ok(())
    }

    pub fn input_layout(&self) -> Layout {
        self.input
    }

    pub fn output_layout(&self) -> Layout {
        self.output
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn padding(&self) -> usize {
        self.pad
    }

    /// Output activations of the latest forward.
    pub fn output(&self) -> &[TensorData] {
        self.output_buf.as_slice()
    }

    /// Output activations shaped `(batch, channels, out_h, out_w)`.
    pub fn output_view(&self) -> Result<ArrayView4<'_, TensorData>, TensorError> {
        self.output_buf.view(self.output)
    }

    /// Source index per output from the latest forward.
    pub fn indexes(&self) -> &[Option<usize>] {
        self.indexes.as_slice()
    }

    pub fn delta(&self) -> &[TensorData] {
        self.delta.as_slice()
    }

    /// Gradient of the loss w.r.t. this layer's output, filled by the network.
    pub fn delta_mut(&mut self) -> &mut [TensorData] {
        self.delta.as_mut_slice()
    }

    pub fn delta_view_mut(&mut self) -> Result<ArrayViewMut4<'_, TensorData>, TensorError> {
        self.delta.view_mut(self.output)
    }

    /// Clears the delta buffer ahead of the next backward sweep.
    pub fn zero_delta(&mut self) {
        self.delta.fill_default();
    }
}

impl Layer for MaxPool2d {
    fn name(&self) -> &'static str {
        "max"
    }

    fn batch(&self) -> usize {
        self.input.batch
    }

    fn inputs(&self) -> usize {
        self.input.sample_len()
    }

    fn outputs(&self) -> usize {
        self.output.sample_len()
    }
}

impl fmt::Display for MaxPool2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max          {} x {} / {}  {:4} x{:4} x{:4}   ->  {:4} x{:4} x{:4}",
            self.size,
            self.size,
            self.stride,
            self.input.width,
            self.input.height,
            self.input.channels,
            self.output.width,
            self.output.height,
            self.output.channels,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<TensorData> {
        (1..=len).map(|x| x as TensorData).collect()
    }

    #[test]
    fn quadrant_maxima() {
        let mut pool = MaxPool2d::new(1, 4, 4, 1, 2, 2, 0).unwrap();
        let input = ramp(16);
        let _pass = pool.forward(&input).unwrap();
        assert_eq!(pool.output(), &[6.0, 8.0, 14.0, 16.0]);
        for (out, index) in pool.output().iter().zip(pool.indexes()) {
            let index = index.expect("every window has a valid input");
            assert_eq!(input[index], *out);
        }
        assert_eq!(pool.indexes(), &[Some(5), Some(7), Some(13), Some(15)]);
    }

    #[test]
    fn backward_routes_to_recorded_indexes() {
        let mut pool = MaxPool2d::new(1, 4, 4, 1, 2, 2, 0).unwrap();
        let pass = pool.forward(&ramp(16)).unwrap();
        pool.delta_mut().fill(1.0);

        let mut input_delta = vec![0.0; 16];
        pool.backward(pass, Some(input_delta.as_mut_slice())).unwrap();

        let nonzero: Vec<usize> = (0..16).filter(|&i| input_delta[i] != 0.0).collect();
        assert_eq!(nonzero, vec![5, 7, 13, 15]);
        assert!(nonzero.iter().all(|&i| input_delta[i] == 1.0));
    }

    #[test]
    fn backward_accumulates_overlapping_windows() {
        // 3x3 windows with stride 1 on a 3x4 input overlap in columns 1..=2;
        // the peak at (1, 1) wins both.
        let mut pool = MaxPool2d::new(1, 3, 4, 1, 3, 1, 0).unwrap();
        let mut input = ramp(12);
        input[5] = 100.0;
        let pass = pool.forward(&input).unwrap();
        assert_eq!(pool.output(), &[100.0, 100.0]);
        assert_eq!(pool.indexes(), &[Some(5), Some(5)]);
        pool.delta_mut().copy_from_slice(&[0.5, 2.0]);

        let mut input_delta = vec![1.0; 12];
        pool.backward(pass, Some(input_delta.as_mut_slice())).unwrap();
        assert_eq!(input_delta[5], 3.5);
        assert_eq!(input_delta.iter().filter(|&&d| d == 1.0).count(), 11);
    }

    #[test]
    fn ties_keep_first_scanned_index() {
        let mut pool = MaxPool2d::new(1, 2, 2, 1, 2, 2, 0).unwrap();
        let _pass = pool.forward(&[3.0, 7.0, 7.0, 7.0]).unwrap();
        assert_eq!(pool.output(), &[7.0]);
        assert_eq!(pool.indexes(), &[Some(1)]);
    }

    #[test]
    fn padding_shifts_windows_by_half() {
        // padding 2 on a 3x3 input with 2x2 windows: out = (3 + 2 - 2)/1 + 1 = 4,
        // windows start one cell above/left of the image.
        let mut pool = MaxPool2d::new(1, 3, 3, 1, 2, 1, 2).unwrap();
        assert_eq!(pool.output_layout().height, 4);
        let _pass = pool.forward(&ramp(9)).unwrap();
        assert_eq!(
            pool.output(),
            &[1.0, 2.0, 3.0, 3.0, 4.0, 5.0, 6.0, 6.0, 7.0, 8.0, 9.0, 9.0, 7.0, 8.0, 9.0, 9.0]
        );
        assert_eq!(pool.indexes()[0], Some(0));
        assert_eq!(pool.indexes()[15], Some(8));
    }

    #[test]
    fn window_entirely_in_padding_yields_negative_infinity() {
        // padding 5 -> windows start 2 cells before the 1x1 image; with stride 2
        // only the centre window (1, 1) covers it.
        let mut pool = MaxPool2d::new(1, 1, 1, 1, 2, 2, 5).unwrap();
        assert_eq!(pool.output_layout().width, 3);
        let pass = pool.forward(&[4.0]).unwrap();
        assert_eq!(pool.output()[0], f32::NEG_INFINITY);
        assert_eq!(pool.indexes()[0], None);
        assert_eq!(pool.output()[4], 4.0);
        assert_eq!(pool.indexes()[4], Some(0));
        assert_eq!(pool.indexes().iter().filter(|i| i.is_none()).count(), 8);

        pool.delta_mut().fill(1.0);
        let mut input_delta = vec![0.0];
        pool.backward(pass, Some(input_delta.as_mut_slice())).unwrap();
        assert_eq!(input_delta, vec![1.0]);
    }

    #[test]
    fn negative_infinity_input_is_never_selected() {
        let mut pool = MaxPool2d::new(1, 1, 2, 1, 1, 1, 0).unwrap();
        let _pass = pool.forward(&[f32::NEG_INFINITY, -1.0]).unwrap();
        assert_eq!(pool.indexes(), &[None, Some(1)]);
    }

    #[test]
    fn batches_and_channels_are_pooled_independently() {
        let mut pool = MaxPool2d::new(2, 2, 2, 3, 2, 2, 0).unwrap();
        let input = ramp(24);
        let _pass = pool.forward(&input).unwrap();
        let expected: Vec<TensorData> = (1..=6).map(|p| (p * 4) as TensorData).collect();
        assert_eq!(pool.output(), &expected[..]);

        let view = pool.output_view().unwrap();
        assert_eq!(view.shape(), &[2, 3, 1, 1]);
        assert_eq!(view[[1, 2, 0, 0]], 24.0);
    }

    #[test]
    fn shaped_delta_routes_per_channel() {
        // 2 channels of 2x2, one window each: winners are the last cell of each channel.
        let mut pool = MaxPool2d::new(1, 2, 2, 2, 2, 2, 0).unwrap();
        let pass = pool.forward(&ramp(8)).unwrap();
        {
            let mut delta = pool.delta_view_mut().unwrap();
            assert_eq!(delta.shape(), &[1, 2, 1, 1]);
            delta[[0, 0, 0, 0]] = 1.5;
            delta[[0, 1, 0, 0]] = -2.0;
        }
        assert_eq!(pool.delta(), &[1.5, -2.0]);

        let mut input_delta = vec![0.0; 8];
        pool.backward(pass, Some(input_delta.as_mut_slice())).unwrap();
        assert_eq!(input_delta, vec![0.0, 0.0, 0.0, 1.5, 0.0, 0.0, 0.0, -2.0]);

        pool.zero_delta();
        assert_eq!(pool.delta(), &[0.0, 0.0]);
        let pass = pool.forward(&ramp(8)).unwrap();
        pool.backward(pass, Some(input_delta.as_mut_slice())).unwrap();
        assert_eq!(input_delta, vec![0.0, 0.0, 0.0, 1.5, 0.0, 0.0, 0.0, -2.0]);
    }

    #[test]
    fn backward_without_gradient_buffer_is_noop() {
        let mut pool = MaxPool2d::new(1, 4, 4, 1, 2, 2, 0).unwrap();
        let pass = pool.forward(&ramp(16)).unwrap();
        pool.delta_mut().fill(1.0);
        assert!(pool.backward(pass, None).is_ok());
    }

    #[test]
    fn backward_requires_latest_forward() {
        let mut pool = MaxPool2d::new(1, 4, 4, 1, 2, 2, 0).unwrap();
        let stale = pool.forward(&ramp(16)).unwrap();
        let _fresh = pool.forward(&ramp(16)).unwrap();
        let mut input_delta = vec![0.0; 16];
        assert!(matches!(
            pool.backward(stale, Some(input_delta.as_mut_slice())),
            Err(TensorError::StalePass)
        ));
    }

    #[test]
    fn resize_recomputes_output_and_invalidates_pass() {
        let mut pool = MaxPool2d::new(1, 4, 4, 2, 2, 2, 0).unwrap();
        let pass = pool.forward(&ramp(32)).unwrap();
        pool.resize(6, 8).unwrap();
        assert_eq!(pool.input_layout(), Layout::new(1, 2, 8, 6));
        assert_eq!(pool.output_layout(), Layout::new(1, 2, 4, 3));
        assert_eq!(pool.output().len(), 24);
        assert_eq!(pool.delta().len(), 24);
        assert_eq!(pool.indexes().len(), 24);

        let mut input_delta = vec![0.0; 96];
        assert!(matches!(
            pool.backward(pass, Some(input_delta.as_mut_slice())),
            Err(TensorError::StalePass)
        ));
        assert!(matches!(
            pool.forward(&ramp(32)),
            Err(TensorError::LengthMismatch { expected: 96, got: 32, .. })
        ));
    }

    #[test]
    fn resize_to_same_dimensions_is_noop() {
        let mut pool = MaxPool2d::new(1, 4, 4, 1, 2, 2, 0).unwrap();
        let pass = pool.forward(&ramp(16)).unwrap();
        pool.resize(4, 4).unwrap();
        pool.delta_mut().fill(1.0);
        let mut input_delta = vec![0.0; 16];
        pool.backward(pass, Some(input_delta.as_mut_slice())).unwrap();
        assert_eq!(input_delta.iter().sum::<f32>(), 4.0);
    }

    #[test]
    fn construction_rejects_invalid_geometry() {
        assert!(matches!(
            MaxPool2d::new(1, 4, 4, 1, 2, 0, 0),
            Err(TensorError::NonPositive { param: "stride" })
        ));
        assert!(matches!(
            MaxPool2d::new(1, 4, 4, 1, 0, 1, 0),
            Err(TensorError::NonPositive { param: "size" })
        ));
        assert!(matches!(
            MaxPool2d::new(1, 2, 2, 1, 3, 1, 0),
            Err(TensorError::WindowTooLarge { size: 3, stride: 1, extent: 2, pad: 0 })
        ));
        assert!(matches!(
            MaxPool2d::new(1, 2, 2, 1, 4, 2, 0),
            Err(TensorError::WindowTooLarge { size: 4, stride: 2, .. })
        ));
    }

    #[test]
    fn window_overhanging_by_less_than_stride_pools_what_it_covers() {
        let mut pool = MaxPool2d::new(1, 1, 1, 1, 2, 2, 0).unwrap();
        assert_eq!(pool.output_layout(), Layout::new(1, 1, 1, 1));
        let pass = pool.forward(&[-3.0]).unwrap();
        assert_eq!(pool.output(), &[-3.0]);
        assert_eq!(pool.indexes(), &[Some(0)]);

        pool.delta_mut().fill(2.0);
        let mut input_delta = vec![0.5];
        pool.backward(pass, Some(input_delta.as_mut_slice())).unwrap();
        assert_eq!(input_delta, vec![2.5]);

        // 3x3 under a 2x2 window at stride 2: the last row and column overhang.
        let mut pool = MaxPool2d::new(1, 3, 3, 1, 2, 2, 0).unwrap();
        assert_eq!(pool.output_layout(), Layout::new(1, 1, 1, 1));
        let _pass = pool.forward(&ramp(9)).unwrap();
        assert_eq!(pool.output(), &[5.0]);
        assert_eq!(pool.indexes(), &[Some(4)]);
    }

    #[test]
    fn summary_line() {
        let pool = MaxPoolConfig::new(1, 4, 4, 3, 2, 2, 0).build().unwrap();
        assert_eq!(
            pool.to_string(),
            "max          2 x 2 / 2     4 x   4 x   3   ->     2 x   2 x   3"
        );
    }
}
