//! Turning logits into predicted ids.

use candle_core::{Tensor, D};

use crate::errors::Result;

/// Maps logits `[batch, vocab_size]` to ids `[batch]` (dtype `u32`).
pub trait PredictionFn: Send + Sync {
    fn predict(&self, logits: &Tensor) -> Result<Tensor>;
}

/// Picks the highest scoring vocabulary entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgMax;

impl PredictionFn for ArgMax {
    fn predict(&self, logits: &Tensor) -> Result<Tensor> {
        Ok(logits.argmax(D::Minus1)?)
    }
}

impl<F> PredictionFn for F
where
    F: Fn(&Tensor) -> candle_core::Result<Tensor> + Send + Sync,
{
    fn predict(&self, logits: &Tensor) -> Result<Tensor> {
        Ok(self(logits)?)
    }
}
