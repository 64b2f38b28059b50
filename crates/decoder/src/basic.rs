//! Decoder without attention: cell output projected straight to logits.

use std::sync::Arc;

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

#[derive(Debug, Clone)]
pub struct BasicDecoderOutput {
    /// `[batch, vocab_size]`.
    pub logits: Tensor,
    /// `[batch]`, `u32`.
    pub predicted_ids: Tensor,
    /// Raw cell output, `[batch, cell_output_size]`.
    pub cell_output: Tensor,
}

impl StepOutput for BasicDecoderOutput {
    fn fields(&self) -> Vec<(&'static str, &Tensor)> {
        vec![
            ("logits", &self.logits),
            ("predicted_ids", &self.predicted_ids),
            ("cell_output", &self.cell_output),
        ]
    }

    fn predicted_ids(&self) -> &Tensor {
        &self.predicted_ids
    }

    fn from_fields(fields: Vec<Tensor>) -> Result<Self> {
        let count = fields.len();
        let [logits, predicted_ids, cell_output]: [Tensor; 3] =
            fields.try_into().map_err(|_| {
                DecoderError::shape("basic_decoder.output", format!("expected 3 fields, got {count}"))
            })?;
        Ok(Self {
            logits,
            predicted_ids,
            cell_output,
        })
    }
}

pub struct BasicDecoder<C: RecurrentCell> {
    cell: C,
    input_fn: Arc<dyn InputFn>,
    initial_state: C::State,
    batch_size: usize,
    vocab_size: usize,
    max_decode_length: usize,
    prediction_fn: Arc<dyn PredictionFn>,
    logits: FullyConnected,
    policy: PrecisionPolicy,
}

impl<C: RecurrentCell> std::fmt::Debug for BasicDecoder<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicDecoder")
            .field("batch_size", &self.batch_size)
            .field("vocab_size", &self.vocab_size)
            .field("max_decode_length", &self.max_decode_length)
            .finish()
    }
}

impl<C: RecurrentCell> BasicDecoder<C> {
    pub fn new(
        config: &DecoderConfig,
        cell: C,
        input_fn: impl InputFn + 'static,
        initial_state: C::State,
        batch_size: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        config.validate()?;
        if batch_size == 0 {
            return Err(DecoderError::Config(vec!["batch_size must be non-zero".into()]));
        }
        let policy = PrecisionPolicy::from_parameter_dtype(vb.dtype());
        let logits = FullyConnected::new(
            cell.output_size(),
            config.vocab_size,
            ActivationKind::Identity,
            vb.pp("logits"),
        )?;
        log::info!(
            "basic decoder init batch={} cell_size={} vocab_size={} max_decode_length={}",
            batch_size,
            cell.output_size(),
            config.vocab_size,
            config.max_decode_length
        );
        Ok(Self {
            cell,
            input_fn: Arc::new(input_fn),
            initial_state,
            batch_size,
            vocab_size: config.vocab_size,
            max_decode_length: config.max_decode_length,
            prediction_fn: Arc::new(ArgMax),
            logits,
            policy,
        })
    }

    pub fn with_prediction_fn(mut self, prediction_fn: impl PredictionFn + 'static) -> Self {
        self.prediction_fn = Arc::new(prediction_fn);
        self
    }

    pub fn build(&self) -> Result<DecodeResult<BasicDecoderOutput, C::State>> {
        dynamic_decode(self)
    }
}

impl<C: RecurrentCell> Decoder for BasicDecoder<C> {
    type Output = BasicDecoderOutput;
    type State = C::State;

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn max_decode_length(&self) -> usize {
        self.max_decode_length
    }

    fn output_spec(&self) -> OutputSpec {
        let storage = self.policy.storage();
        OutputSpec::new(vec![
            FieldSpec::new("logits", vec![self.vocab_size], storage),
            FieldSpec::new("predicted_ids", vec![], DType::U32),
            FieldSpec::new("cell_output", vec![self.cell.output_size()], storage),
        ])
    }

    fn initialize(&self) -> Result<Initialized<C::State>> {
        let NextInputs { inputs, finished } = self.input_fn.next_inputs(0, None)?;
        match inputs.dims() {
            [batch, width] if *batch == self.batch_size && *width == self.cell.input_size() => {}
            dims => {
                return Err(DecoderError::shape(
                    "cell_input",
                    format!(
                        "expected [{}, {}], got {:?}",
                        self.batch_size,
                        self.cell.input_size(),
                        dims
                    ),
                ))
            }
        }
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
    ) -> Result<StepResult<BasicDecoderOutput, C::State>> {
        let (cell_output, state) = self.cell.step(inputs, state)?;
        let logits = self.logits.forward(&cell_output, &self.policy)?;
        let predicted_ids = self.prediction_fn.predict(&logits)?;
        let outputs = BasicDecoderOutput {
            logits,
            predicted_ids,
            cell_output,
        };
        let NextInputs {
            inputs: next_inputs,
            finished,
        } = self.input_fn.next_inputs(time + 1, Some(&outputs))?;
        Ok(StepResult {
            outputs,
            state,
            next_inputs,
            finished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::GruCell;
    use crate::input::TrainingInputFn;
    use candle_core::Device;
    use candle_nn::VarMap;

    #[test]
    fn teacher_forced_decode_stops_at_longest_sequence() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let cell = GruCell::new(4, 6, vb.pp("cell"))?;
        let state = cell.zero_state(2)?;
        let inputs = Tensor::randn(0f32, 1.0, (2, 5, 4), &device)?;
        let input_fn = TrainingInputFn::new(inputs, vec![3, 2])?;
        let config = DecoderConfig::new(7, 10);

        let decoder = BasicDecoder::new(&config, cell, input_fn, state, 2, vb)?;
        let result = decoder.build()?;

        assert_eq!(result.sequence_lengths, vec![3, 2]);
        assert_eq!(result.outputs.logits.dims(), &[3, 2, 7]);
        assert_eq!(result.outputs.predicted_ids.dims(), &[3, 2]);
        assert_eq!(result.outputs.cell_output.dims(), &[3, 2, 6]);

        let tail = result.outputs.logits.get(2)?.get(1)?.to_vec1::<f32>()?;
        assert!(tail.iter().all(|value| *value == 0.0));
        Ok(())
    }

    #[test]
    fn input_width_is_checked_before_the_cell_runs() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let cell = GruCell::new(5, 6, vb.pp("cell"))?;
        let state = cell.zero_state(2)?;
        let inputs = Tensor::randn(0f32, 1.0, (2, 3, 4), &device)?;
        let input_fn = TrainingInputFn::new(inputs, vec![3, 3])?;

        let decoder = BasicDecoder::new(&DecoderConfig::new(7, 4), cell, input_fn, state, 2, vb)?;
        assert!(matches!(
            decoder.build(),
            Err(DecoderError::Shape {
                context: "cell_input",
                ..
            })
        ));
        Ok(())
    }
}
