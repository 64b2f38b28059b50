//! Portable attention layers over encoder outputs.
//!
//! Both layers project the encoder outputs into keys and the decoder state
//! into a query, score every source position, normalise the scores with a
//! softmax (after masking positions past each example's valid length) and
//! mix the encoder outputs with the resulting weights.

pub mod bahdanau;
pub mod dot;

use std::sync::Arc;

use candle_core::{DType, Tensor, D};
use candle_nn::{ops::softmax, VarBuilder};

pub use bahdanau::BahdanauAttention;
pub use dot::DotAttention;

use crate::core::{AttentionError, AttentionFn, AttentionKind, AttentionOutput, Config};
use crate::masks::padding_mask_from_lengths;

/// Builds the attention layer selected by `config` under `vb`.
pub fn build_attention(
    config: &Config,
    state_dim: usize,
    feature_dim: usize,
    vb: VarBuilder,
) -> Result<Arc<dyn AttentionFn>, AttentionError> {
    config.validate()?;
    let layer: Arc<dyn AttentionFn> = match config.kind {
        AttentionKind::Dot => Arc::new(DotAttention::new(
            state_dim,
            feature_dim,
            config.num_units,
            vb,
        )?),
        AttentionKind::Bahdanau => Arc::new(BahdanauAttention::new(
            state_dim,
            feature_dim,
            config.num_units,
            vb,
        )?),
    };
    Ok(layer)
}

/// Shape of one attention call: `(batch, source_len, feature_dim)`.
pub(crate) fn check_inputs(
    state: &Tensor,
    inputs: &Tensor,
    values_length: Option<&[usize]>,
) -> Result<(usize, usize, usize), AttentionError> {
    let (batch, source_len, feature_dim) =
        inputs.dims3().map_err(|_| AttentionError::InvalidShape {
            context: format!(
                "inputs must have shape [batch, source_len, feature_dim], got {:?}",
                inputs.dims()
            ),
        })?;
    let (state_batch, _) = state.dims2().map_err(|_| AttentionError::InvalidShape {
        context: format!(
            "state must have shape [batch, state_dim], got {:?}",
            state.dims()
        ),
    })?;
    if state_batch != batch {
        return Err(AttentionError::InvalidShape {
            context: format!("state batch {state_batch} does not match inputs batch {batch}"),
        });
    }
    if source_len == 0 {
        return Err(AttentionError::InvalidShape {
            context: "inputs must contain at least one source position".to_string(),
        });
    }
    if !matches!(
        inputs.dtype(),
        DType::F16 | DType::BF16 | DType::F32 | DType::F64
    ) {
        return Err(AttentionError::UnsupportedDType {
            requested: format!("{:?}", inputs.dtype()),
        });
    }
    if let Some(lengths) = values_length {
        if lengths.len() != batch {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "values_length has {} entries for a batch of {batch}",
                    lengths.len()
                ),
            });
        }
    }
    Ok((batch, source_len, feature_dim))
}

/// Softmax-normalises `raw_scores` `[batch, source_len]` and mixes `inputs`.
pub(crate) fn weigh_inputs(
    raw_scores: &Tensor,
    inputs: &Tensor,
    values_length: Option<&[usize]>,
) -> Result<AttentionOutput, AttentionError> {
    let mut logits = raw_scores.to_dtype(DType::F32)?;
    if let Some(lengths) = values_length {
        let source_len = inputs.dim(1)?;
        let mask = padding_mask_from_lengths(inputs.device(), lengths, source_len)?;
        logits = logits.broadcast_add(&mask)?;
    }
    let scores = softmax(&logits, D::Minus1)?.to_dtype(inputs.dtype())?;
    let context = scores.unsqueeze(2)?.broadcast_mul(inputs)?.sum(1)?;
    Ok(AttentionOutput { scores, context })
}
