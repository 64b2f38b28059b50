//! Core traits and types shared across attention implementations.
//!
//! An attention function compares a decoder state shaped `[batch, state_dim]`
//! with encoder outputs shaped `[batch, source_len, feature_dim]`. It returns
//! normalised scores `[batch, source_len]` (each row sums to one over the
//! unmasked positions) and the score-weighted context `[batch, feature_dim]`.

pub mod config;
pub mod errors;

use candle_core::Tensor;

pub use config::{AttentionKind, Config};
pub use errors::AttentionError;

/// Scores and context produced by one attention call.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// Normalised attention weights, `[batch, source_len]`.
    pub scores: Tensor,
    /// Weighted sum of the encoder outputs, `[batch, feature_dim]`.
    pub context: Tensor,
}

/// Maps `(state, inputs)` to `(scores, context)`.
///
/// `inputs` is the full encoder output. Implementations must treat it as
/// read-only: decoders hand the same tensor to every step.
pub trait AttentionFn: Send + Sync {
    /// Attend over `inputs` conditioned on `state`.
    fn attend(&self, state: &Tensor, inputs: &Tensor) -> Result<AttentionOutput, AttentionError>;
}

impl<F> AttentionFn for F
where
    F: Fn(&Tensor, &Tensor) -> Result<AttentionOutput, AttentionError> + Send + Sync,
{
    fn attend(&self, state: &Tensor, inputs: &Tensor) -> Result<AttentionOutput, AttentionError> {
        self(state, inputs)
    }
}
