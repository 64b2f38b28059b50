//! Autoregressive decoders for sequence-to-sequence models.
//!
//! A decoder is a recurrent cell driven one step at a time by
//! [`dynamic_decode`]. At each step the cell consumes the current input and
//! state, its output is projected to vocabulary logits, a [`PredictionFn`]
//! picks ids and an [`InputFn`] produces the next input together with
//! per-example finished flags. Outputs are returned time-major.
//!
//! [`AttentionDecoder`] additionally attends over the encoder outputs at every
//! step through an [`attention::AttentionFn`].

pub mod attention_decoder;
pub mod base;
pub mod basic;
pub mod cell;
pub mod config;
pub mod errors;
pub mod input;
pub mod output;
pub mod prediction;
pub mod scores;

pub use attention_decoder::{AttentionDecoder, AttentionDecoderOutput};
pub use base::{dynamic_decode, DecodeResult, Decoder, Initialized, StepResult};
pub use basic::{BasicDecoder, BasicDecoderOutput};
pub use cell::{ConfiguredCell, ConfiguredState, GruCell, LstmCell, RecurrentCell};
pub use config::{CellConfig, CellKind, DecoderConfig, DEFAULT_ATTENTION_INPUTS_MAX_LEN};
pub use errors::{DecoderError, Result};
pub use input::{
    finished_flags, finished_tensor, GreedyEmbeddingInputFn, InputFn, NextInputs, TrainingInputFn,
};
pub use output::{FieldSpec, OutputSpec, StepOutput};
pub use prediction::{ArgMax, PredictionFn};
pub use scores::{pad_scores, reverse_scores, slice_scores};
