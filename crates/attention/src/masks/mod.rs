//! Mask utilities shared by attention implementations.
//!
//! All masks produced here are additive tensors with dtype `f32`, shaped
//! `[batch, source_len]`. Values are either `0.0` (keep) or
//! `f32::NEG_INFINITY` (discard) so that adding a mask to raw scores before the
//! softmax gives padded positions zero weight.

pub mod padding;

pub use padding::padding_mask_from_lengths;

#[cfg(test)]
mod tests;
