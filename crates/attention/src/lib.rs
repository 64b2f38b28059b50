//! Attention functions for sequence decoders.
//!
//! The crate defines the [`AttentionFn`] interface used by decoders: given the
//! decoder state `[batch, state_dim]` and the encoder outputs
//! `[batch, source_len, feature_dim]`, produce normalised scores
//! `[batch, source_len]` and a context vector `[batch, feature_dim]`.
//!
//! Two reference layers are provided, multiplicative ([`DotAttention`]) and
//! additive ([`BahdanauAttention`]), both optionally restricted to each
//! example's valid source length through the additive masks in [`masks`].

pub mod core;
pub mod masks;
pub mod reference;

pub use core::{AttentionError, AttentionFn, AttentionKind, AttentionOutput, Config};
pub use reference::{build_attention, BahdanauAttention, DotAttention};
