//! Attention score post-processing: fixed-width padding, partial reversal and slicing.

use candle_core::{Tensor, D};

use crate::errors::{DecoderError, Result};

/// Right-pads `[batch, len]` scores with zeros up to `max_len` columns.
///
/// Fails when `len > max_len`: the configured width is too small for the source.
pub fn pad_scores(scores: &Tensor, max_len: usize) -> Result<Tensor> {
    let (_, len) = scores.dims2()?;
    if len > max_len {
        return Err(DecoderError::ScoresTooLong {
            actual: len,
            max: max_len,
        });
    }
    if len == max_len {
        return Ok(scores.clone());
    }
    Ok(scores.pad_with_zeros(1, 0, max_len - len)?)
}

/// Reverses the first `lengths[b]` entries of row `b`; later entries stay in place.
pub fn reverse_scores(scores: &Tensor, lengths: &[usize]) -> Result<Tensor> {
    let (batch, width) = scores.dims2()?;
    if lengths.len() != batch {
        return Err(DecoderError::shape(
            "reverse_scores_lengths",
            format!("{} lengths for a batch of {batch}", lengths.len()),
        ));
    }

    let mut index = Vec::with_capacity(batch * width);
    for (example, &length) in lengths.iter().enumerate() {
        if length > width {
            return Err(DecoderError::ReverseLength {
                example,
                length,
                width,
            });
        }
        index.extend((0..length).rev().map(|i| i as u32));
        index.extend((length..width).map(|i| i as u32));
    }
    let index = Tensor::from_vec(index, (batch, width), scores.device())?;
    Ok(scores.gather(&index, 1)?)
}

/// Narrows time-major scores `[time, batch, max_len]` to `[time, batch, source_len]`.
pub fn slice_scores(scores: &Tensor, source_len: usize) -> Result<Tensor> {
    let width = scores.dim(D::Minus1)?;
    if source_len > width {
        return Err(DecoderError::ScoresTooLong {
            actual: source_len,
            max: width,
        });
    }
    Ok(scores.narrow(D::Minus1, 0, source_len)?)
}
