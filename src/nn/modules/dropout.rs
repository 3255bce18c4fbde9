//! # Dropout Layer Module

use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

use crate::nn::pass::{ForwardPass, Mode, PassTracker};
use crate::nn::Layer;
use crate::tensor::{check_len, check_positive, Storage, TensorData, TensorError};

/// Construction parameters for [`Dropout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropoutConfig {
    pub batch: usize,
    pub inputs: usize,
    pub probability: f32,
    /// Seed for the layer's generator; `None` seeds from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Print the layer summary on stderr when built.
    #[serde(default)]
    pub verbose: bool,
}

impl DropoutConfig {
    pub fn new(batch: usize, inputs: usize, probability: f32) -> Self {
        DropoutConfig {
            batch,
            inputs,
            probability,
            seed: None,
            verbose: false,
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn build(&self) -> Result<Dropout, TensorError> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let layer = Dropout::with_rng(self.batch, self.inputs, self.probability, rng)?;
        if self.verbose {
            eprintln!("{}", layer);
        }
        Ok(layer)
    }
}

/// Inverted dropout.
///
/// During training each element is zeroed with probability `p` and survivors
/// are scaled by `1 / (1 - p)`, so inference needs no rescaling and the layer
/// is the identity there. The draw behind every decision is kept so that
/// backward masks the gradient exactly like forward masked the activations.
///
/// The generator is injected per instance; tests seed it for determinism.
#[derive(Debug, Clone)]
pub struct Dropout<R = StdRng> {
    probability: f32,
    scale: f32,
    batch: usize,
    inputs: usize,
    // Draw used for every element on the latest training forward.
    draws: Storage<f32>,
    uniform: Uniform<f32>,
    rng: R,
    passes: PassTracker,
}

impl Dropout<StdRng> {
    /// Creates a dropout layer seeded from OS entropy.
    ///
    /// # Arguments
    /// * `batch`: Samples per forward call.
    /// * `inputs`: Elements per sample (the layer never changes shape).
    /// * `probability`: Chance of zeroing an element, in `[0, 1)`.
    pub fn new(batch: usize, inputs: usize, probability: f32) -> Result<Self, TensorError> {
        Self::with_rng(batch, inputs, probability, StdRng::from_entropy())
    }
}

impl<R: Rng> Dropout<R> {
    /// Creates a dropout layer drawing from `rng`.
    pub fn with_rng(
        batch: usize,
        inputs: usize,
        probability: f32,
        rng: R,
    ) -> Result<Self, TensorError> {
        // Also rejects NaN.
        if !(0.0..1.0).contains(&probability) {
            return Err(TensorError::InvalidProbability(probability));
        }
        check_positive("batch", batch)?;
        check_positive("inputs", inputs)?;
        Ok(Dropout {
            probability,
            scale: 1.0 / (1.0 - probability),
            batch,
            inputs,
            draws: Storage::zeros(batch * inputs),
            uniform: Uniform::new(0.0, 1.0),
            rng,
            passes: PassTracker::new(),
        })
    }

    /// Adapts the layer to a new per-sample element count.
    ///
    /// The draw buffer is reallocated without preserving its contents and any
    /// outstanding [`ForwardPass`] becomes stale. An unchanged count is a no-op.
    pub fn resize(&mut self, inputs: usize) -> Result<(), TensorError> {
        if inputs == self.inputs {
            return Ok(());
        }
        check_positive("inputs", inputs)?;
        self.inputs = inputs;
        self.draws.resize(self.batch * inputs);
        self.passes.invalidate();
        Ok(())
    }

    /// Masks `input` in place when training; leaves it untouched otherwise.
    pub fn forward(
        &mut self,
        input: &mut [TensorData],
        mode: Mode,
    ) -> Result<ForwardPass, TensorError> {
        check_len("input", self.batch * self.inputs, input.len())?;
        if !mode.is_training() {
            return Ok(self.passes.begin(mode));
        }

        for (x, draw) in input.iter_mut().zip(self.draws.as_mut_slice()) {
            let r = self.rng.sample(&self.uniform);
            *draw = r;
            if r < self.probability {
                *x = 0.0;
            } else {
                *x *= self.scale;
            }
        }
        Ok(self.passes.begin(mode))
    }

    /// Masks `delta` in place with the draws recorded by `pass`'s forward.
    ///
    /// `None` means gradient propagation is disabled upstream. After an
    /// inference-mode forward the gradient passes through unchanged.
    pub fn backward(
        &mut self,
        pass: ForwardPass,
        delta: Option<&mut [TensorData]>,
    ) -> Result<(), TensorError> {
        let mode = self.passes.finish(pass)?;
        let Some(delta) = delta else {
            return Ok(());
        };
        check_len("delta", self.batch * self.inputs, delta.len())?;
        if !mode.is_training() {
            return Ok(());
        }

        for (d, &r) in delta.iter_mut().zip(self.draws.as_slice()) {
            if r < self.probability {
                *d = 0.0;
            } else {
                *d *= self.scale;
            }
        }
        Ok(())
    }
}

impl<R> Dropout<R> {
    pub fn probability(&self) -> f32 {
        self.probability
    }

    /// `1 / (1 - p)`.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Draws from the latest training forward.
    pub fn draws(&self) -> &[f32] {
        self.draws.as_slice()
    }
}

impl<R: Debug + Send> Layer for Dropout<R> {
    fn name(&self) -> &'static str {
        "dropout"
    }

    fn batch(&self) -> usize {
        self.batch
    }

    fn inputs(&self) -> usize {
        self.inputs
    }

    fn outputs(&self) -> usize {
        self.inputs
    }
}

impl<R> fmt::Display for Dropout<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dropout       p = {:.2}               {:4}  ->  {:4}",
            self.probability, self.inputs, self.inputs
        )
    }
}
