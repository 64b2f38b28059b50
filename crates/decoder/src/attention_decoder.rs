//! Recurrent decoder that attends over an encoder's output sequence.
//!
//! Each step runs the cell, attends over `attention_inputs` with the cell
//! output as query, mixes cell output and context through a `tanh` layer
//! sized to the cell width (Luong et al., 2015) and projects the mix to
//! vocabulary logits. The context of step `t` is appended to the input of
//! step `t + 1`; step 0 receives a zero context.
//!
//! Attention scores are right-padded to `attention_inputs_max_len` so every
//! step emits the same width; [`AttentionDecoder::build`] slices them back to
//! the source length after the loop.

use std::sync::Arc;

use attention::{AttentionFn, AttentionOutput};
use candle_core::{DType, Tensor};
use candle_nn::VarBuilder;
use layers::{ActivationKind, FullyConnected, PrecisionPolicy};

use crate::base::{dynamic_decode, DecodeResult, Decoder, Initialized, StepResult};
use crate::cell::RecurrentCell;
use crate::config::DecoderConfig;
use crate::errors::{DecoderError, Result};
use crate::input::{InputFn, NextInputs};
use crate::output::{FieldSpec, OutputSpec, StepOutput};
use crate::prediction::{ArgMax, PredictionFn};
use crate::scores::{pad_scores, reverse_scores, slice_scores};

/// Outputs of one attention decoder step (or, after decoding, of all steps).
#[derive(Debug, Clone)]
pub struct AttentionDecoderOutput {
    /// `[batch, vocab_size]`.
    pub logits: Tensor,
    /// `[batch]`, `u32`.
    pub predicted_ids: Tensor,
    /// The `tanh` mix of cell output and context, `[batch, cell_output_size]`.
    pub cell_output: Tensor,
    /// `[batch, attention_inputs_max_len]` per step; `[.., source_len]` after `build`.
    pub attention_scores: Tensor,
    /// `[batch, feature_dim]`.
    pub attention_context: Tensor,
}

impl StepOutput for AttentionDecoderOutput {
    fn fields(&self) -> Vec<(&'static str, &Tensor)> {
        vec![
            ("logits", &self.logits),
            ("predicted_ids", &self.predicted_ids),
            ("cell_output", &self.cell_output),
            ("attention_scores", &self.attention_scores),
            ("attention_context", &self.attention_context),
        ]
    }

    fn predicted_ids(&self) -> &Tensor {
        &self.predicted_ids
    }

    fn from_fields(fields: Vec<Tensor>) -> Result<Self> {
        let count = fields.len();
        let [logits, predicted_ids, cell_output, attention_scores, attention_context]: [Tensor; 5] =
            fields.try_into().map_err(|_| {
                DecoderError::shape(
                    "attention_decoder.output",
                    format!("expected 5 fields, got {count}"),
                )
            })?;
        Ok(Self {
            logits,
            predicted_ids,
            cell_output,
            attention_scores,
            attention_context,
        })
    }
}

pub struct AttentionDecoder<C: RecurrentCell> {
    cell: C,
    input_fn: Arc<dyn InputFn>,
    initial_state: C::State,
    vocab_size: usize,
    attention_inputs: Tensor,
    attention_fn: Arc<dyn AttentionFn>,
    max_decode_length: usize,
    reverse_scores_lengths: Option<Vec<usize>>,
    attention_inputs_max_len: usize,
    prediction_fn: Arc<dyn PredictionFn>,
    attention_mix: FullyConnected,
    logits: FullyConnected,
    policy: PrecisionPolicy,
}

impl<C: RecurrentCell> std::fmt::Debug for AttentionDecoder<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttentionDecoder")
            .field("vocab_size", &self.vocab_size)
            .field("attention_inputs", &self.attention_inputs.dims())
            .field("max_decode_length", &self.max_decode_length)
            .field("attention_inputs_max_len", &self.attention_inputs_max_len)
            .field("reverse_scores", &self.reverse_scores_lengths.is_some())
            .finish()
    }
}

impl<C: RecurrentCell> AttentionDecoder<C> {
    /// Wires the collaborators together and creates the `attention_mix` and
    /// `logits` projections under `vb`.
    ///
    /// `attention_inputs` must be shaped `[batch, source_len, feature_dim]`.
    /// The cell consumes the input fn's output followed by the context, so its
    /// input width must be the input fn's width plus `feature_dim`. A cell no
    /// wider than `feature_dim` is rejected here; any other mismatch is
    /// reported by [`Decoder::initialize`] before the cell ever runs.
    pub fn new(
        config: &DecoderConfig,
        cell: C,
        input_fn: impl InputFn + 'static,
        initial_state: C::State,
        attention_inputs: Tensor,
        attention_fn: Arc<dyn AttentionFn>,
        vb: VarBuilder,
    ) -> Result<Self> {
        config.validate()?;
        let (batch, source_len, feature_dim) = attention_inputs.dims3().map_err(|_| {
            DecoderError::shape(
                "attention_inputs",
                format!(
                    "expected [batch, source_len, feature_dim], got {:?}",
                    attention_inputs.dims()
                ),
            )
        })?;
        if batch == 0 || feature_dim == 0 {
            return Err(DecoderError::shape(
                "attention_inputs",
                format!("batch and feature dimensions must be non-zero, got {:?}", attention_inputs.dims()),
            ));
        }

        if cell.input_size() <= feature_dim {
            return Err(DecoderError::shape(
                "cell_input",
                format!(
                    "cell input width {} leaves no room for inputs next to a {feature_dim}-wide context",
                    cell.input_size()
                ),
            ));
        }

        let policy = PrecisionPolicy::from_parameter_dtype(vb.dtype());
        let cell_size = cell.output_size();
        let attention_mix = FullyConnected::new(
            cell_size + feature_dim,
            cell_size,
            ActivationKind::Tanh,
            vb.pp("attention_mix"),
        )?;
        let logits = FullyConnected::new(
            cell_size,
            config.vocab_size,
            ActivationKind::Identity,
            vb.pp("logits"),
        )?;

        log::info!(
            "attention decoder init batch={} source_len={} feature_dim={} cell_size={} vocab_size={} max_decode_length={} attention_inputs_max_len={}",
            batch,
            source_len,
            feature_dim,
            cell_size,
            config.vocab_size,
            config.max_decode_length,
            config.attention_inputs_max_len
        );

        Ok(Self {
            cell,
            input_fn: Arc::new(input_fn),
            initial_state,
            vocab_size: config.vocab_size,
            attention_inputs,
            attention_fn,
            max_decode_length: config.max_decode_length,
            reverse_scores_lengths: None,
            attention_inputs_max_len: config.attention_inputs_max_len,
            prediction_fn: Arc::new(ArgMax),
            attention_mix,
            logits,
            policy,
        })
    }

    /// Emits each example's first `lengths[b]` scores in reverse order, for
    /// sources that were fed to the encoder reversed.
    pub fn with_reverse_scores_lengths(mut self, lengths: Vec<usize>) -> Result<Self> {
        if lengths.len() != self.batch_size() {
            return Err(DecoderError::shape(
                "reverse_scores_lengths",
                format!("{} lengths for a batch of {}", lengths.len(), self.batch_size()),
            ));
        }
        if let Some((example, &length)) = lengths
            .iter()
            .enumerate()
            .find(|(_, length)| **length > self.attention_inputs_max_len)
        {
            return Err(DecoderError::ReverseLength {
                example,
                length,
                width: self.attention_inputs_max_len,
            });
        }
        self.reverse_scores_lengths = Some(lengths);
        Ok(self)
    }

    /// Replaces the default arg-max prediction. The function must return `u32` ids.
    pub fn with_prediction_fn(mut self, prediction_fn: impl PredictionFn + 'static) -> Self {
        self.prediction_fn = Arc::new(prediction_fn);
        self
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn attention_inputs(&self) -> &Tensor {
        &self.attention_inputs
    }

    pub fn source_len(&self) -> usize {
        self.attention_inputs.dims()[1]
    }

    pub fn feature_dim(&self) -> usize {
        self.attention_inputs.dims()[2]
    }

    pub fn attention_inputs_max_len(&self) -> usize {
        self.attention_inputs_max_len
    }

    /// Runs the decode loop and slices attention scores back to the source length.
    pub fn build(&self) -> Result<DecodeResult<AttentionDecoderOutput, C::State>> {
        let mut result = dynamic_decode(self)?;
        result.outputs.attention_scores =
            slice_scores(&result.outputs.attention_scores, self.source_len())?;
        Ok(result)
    }

    fn check_width(&self, context: &'static str, tensor: &Tensor, width: usize) -> Result<()> {
        match tensor.dims() {
            [batch, actual] if *batch == self.batch_size() && *actual == width => Ok(()),
            dims => Err(DecoderError::shape(
                context,
                format!("expected [{}, {width}], got {:?}", self.batch_size(), dims),
            )),
        }
    }
}

impl<C: RecurrentCell> Decoder for AttentionDecoder<C> {
    type Output = AttentionDecoderOutput;
    type State = C::State;

    fn batch_size(&self) -> usize {
        self.attention_inputs.dims()[0]
    }

    fn max_decode_length(&self) -> usize {
        self.max_decode_length
    }

    fn output_spec(&self) -> OutputSpec {
        let storage = self.policy.storage();
        let attention_dtype = self.attention_inputs.dtype();
        OutputSpec::new(vec![
            FieldSpec::new("logits", vec![self.vocab_size], storage),
            FieldSpec::new("predicted_ids", vec![], DType::U32),
            FieldSpec::new("cell_output", vec![self.cell.output_size()], storage),
            FieldSpec::new(
                "attention_scores",
                vec![self.attention_inputs_max_len],
                attention_dtype,
            ),
            FieldSpec::new("attention_context", vec![self.feature_dim()], attention_dtype),
        ])
    }

    fn initialize(&self) -> Result<Initialized<C::State>> {
        let NextInputs { inputs, finished } = self.input_fn.next_inputs(0, None)?;
        let batch = inputs.dim(0)?;
        let empty_context =
            Tensor::zeros((batch, self.feature_dim()), inputs.dtype(), inputs.device())?;
        let inputs = Tensor::cat(&[&inputs, &empty_context], 1)?;
        self.check_width("cell_input", &inputs, self.cell.input_size())?;
        Ok(Initialized {
            finished,
            inputs,
            state: self.initial_state.clone(),
        })
    }

    fn step(
        &self,
        time: usize,
        inputs: &Tensor,
        state: C::State,
    ) -> Result<StepResult<AttentionDecoderOutput, C::State>> {
        self.check_width("cell_input", inputs, self.cell.input_size())?;
        let (cell_output, state) = self.cell.step(inputs, state)?;
        self.check_width("cell_output", &cell_output, self.cell.output_size())?;

        let AttentionOutput { scores, context } =
            self.attention_fn.attend(&cell_output, &self.attention_inputs)?;
        self.check_width("attention_context", &context, self.feature_dim())?;

        let mix_input = Tensor::cat(&[&cell_output, &context], 1)?;
        let mixed = self.attention_mix.forward(&mix_input, &self.policy)?;
        let logits = self.logits.forward(&mixed, &self.policy)?;

        let mut attention_scores = pad_scores(&scores, self.attention_inputs_max_len)?;
        if let Some(lengths) = &self.reverse_scores_lengths {
            attention_scores = reverse_scores(&attention_scores, lengths)?;
        }

        let predicted_ids = self.prediction_fn.predict(&logits)?;
        let outputs = AttentionDecoderOutput {
            logits,
            predicted_ids,
            cell_output: mixed,
            attention_scores,
            attention_context: context,
        };

        let NextInputs { inputs, finished } = self.input_fn.next_inputs(time + 1, Some(&outputs))?;
        let next_inputs = Tensor::cat(&[&inputs, &outputs.attention_context], 1)?;

        Ok(StepResult {
            outputs,
            state,
            next_inputs,
            finished,
        })
    }
}
