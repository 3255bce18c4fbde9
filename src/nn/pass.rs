//! # Forward/Backward Pairing
//!
//! Every stateful layer hands out a [`ForwardPass`] from `forward` and takes it
//! back in `backward`. The token is not `Clone`, so each forward pays for at
//! most one backward, and the layer rejects tokens issued by another instance,
//! by an older forward, or before a resize that changed its shape.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::tensor::TensorError;

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Whether the surrounding network is training or running inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

impl Mode {
    pub fn is_training(self) -> bool {
        matches!(self, Mode::Train)
    }
}

impl From<bool> for Mode {
    fn from(train: bool) -> Self {
        if train {
            Mode::Train
        } else {
            Mode::Eval
        }
    }
}

/// Proof that a layer ran forward; consumed by the matching backward.
#[must_use = "pass the token to the layer's backward, or drop it to skip backward"]
#[derive(Debug)]
pub struct ForwardPass {
    layer: u64,
    epoch: u64,
    mode: Mode,
}

impl ForwardPass {
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

/// Per-instance bookkeeping behind [`ForwardPass`].
#[derive(Debug)]
pub(crate) struct PassTracker {
    layer: u64,
    epoch: u64,
}

impl PassTracker {
    pub(crate) fn new() -> Self {
        PassTracker {
            layer: NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed),
            epoch: 0,
        }
    }

    /// Starts a new forward; any token handed out earlier becomes stale.
    pub(crate) fn begin(&mut self, mode: Mode) -> ForwardPass {
        self.epoch += 1;
        ForwardPass {
            layer: self.layer,
            epoch: self.epoch,
            mode,
        }
    }

    /// Called when the layer's shape changes.
    pub(crate) fn invalidate(&mut self) {
        self.epoch += 1;
    }

    /// Accepts the token of the latest forward on this instance.
    pub(crate) fn finish(&mut self, pass: ForwardPass) -> Result<Mode, TensorError> {
        if pass.layer != self.layer || pass.epoch != self.epoch {
            return Err(TensorError::StalePass);
        }
        Ok(pass.mode)
    }
}

// A cloned layer is a new instance: tokens issued by its source are not valid on it.
impl Clone for PassTracker {
    fn clone(&self) -> Self {
        PassTracker::new()
    }
}
