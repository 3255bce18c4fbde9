//! # Tensor Layout
//!
//! Addressing for 4D `[batch, channel, height, width]` tensors stored in one
//! flat buffer, channel-major and row-major within a channel:
//!
//! ```text
//! index = col + width * (row + height * (channel + channels * batch))
//! ```

use serde::{Deserialize, Serialize};

/// Dimensions of a flattened `[batch, channel, height, width]` tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layout {
    pub batch: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl Layout {
    pub const fn new(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Layout {
            batch,
            channels,
            height,
            width,
        }
    }

    /// Single image (batch of one).
    pub const fn image(channels: usize, height: usize, width: usize) -> Self {
        Self::new(1, channels, height, width)
    }

    /// Total number of elements.
    pub const fn len(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements per sample (`channels * height * width`).
    pub const fn sample_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Dimensions in `[batch, channel, height, width]` order, as ndarray expects them.
    pub const fn dims(&self) -> [usize; 4] {
        [self.batch, self.channels, self.height, self.width]
    }

    /// Flat offset of `(batch, channel, row, col)`.
    #[inline(always)]
    pub fn offset(&self, batch: usize, channel: usize, row: usize, col: usize) -> usize {
        debug_assert!(
            batch < self.batch && channel < self.channels && row < self.height && col < self.width,
            "({}, {}, {}, {}) outside {:?}",
            batch,
            channel,
            row,
            col,
            self
        );
        col + self.width * (row + self.height * (channel + self.channels * batch))
    }

    /// Inverse of [`Layout::offset`].
    pub fn coords(&self, offset: usize) -> (usize, usize, usize, usize) {
        debug_assert!(offset < self.len(), "offset {} outside {:?}", offset, self);
        let col = offset % self.width;
        let rest = offset / self.width;
        let row = rest % self.height;
        let rest = rest / self.height;
        let channel = rest % self.channels;
        let batch = rest / self.channels;
        (batch, channel, row, col)
    }

    /// Whether a signed spatial coordinate lies inside `[0, height) x [0, width)`.
    #[inline(always)]
    pub fn contains(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.height && (col as usize) < self.width
    }

    /// Offset of a possibly out-of-extent spatial coordinate; `None` when the
    /// coordinate falls in the padding.
    #[inline(always)]
    pub fn checked_offset(
        &self,
        batch: usize,
        channel: usize,
        row: isize,
        col: isize,
    ) -> Option<usize> {
        if self.contains(row, col) {
            Some(self.offset(batch, channel, row as usize, col as usize))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_channel_major_then_row_major() {
        let layout = Layout::new(2, 3, 4, 5);
        assert_eq!(layout.offset(0, 0, 0, 0), 0);
        assert_eq!(layout.offset(0, 0, 0, 1), 1);
        assert_eq!(layout.offset(0, 0, 1, 0), 5);
        assert_eq!(layout.offset(0, 1, 0, 0), 20);
        assert_eq!(layout.offset(1, 0, 0, 0), 60);
        assert_eq!(layout.offset(1, 2, 3, 4), layout.len() - 1);
    }

    #[test]
    fn coords_inverts_offset() {
        let layout = Layout::new(2, 3, 4, 5);
        for offset in 0..layout.len() {
            let (b, c, row, col) = layout.coords(offset);
            assert_eq!(layout.offset(b, c, row, col), offset);
        }
    }

    #[test]
    fn checked_offset_rejects_padding() {
        let layout = Layout::image(1, 3, 3);
        assert_eq!(layout.checked_offset(0, 0, -1, 0), None);
        assert_eq!(layout.checked_offset(0, 0, 0, -1), None);
        assert_eq!(layout.checked_offset(0, 0, 3, 0), None);
        assert_eq!(layout.checked_offset(0, 0, 0, 3), None);
        assert_eq!(layout.checked_offset(0, 0, 2, 2), Some(8));
    }

    #[test]
    fn sizes() {
        let layout = Layout::new(2, 3, 4, 5);
        assert_eq!(layout.len(), 120);
        assert_eq!(layout.sample_len(), 60);
        assert_eq!(layout.dims(), [2, 3, 4, 5]);
        assert!(Layout::image(0, 4, 4).is_empty());
    }
}
