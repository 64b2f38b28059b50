//! Input functions: where each step's input comes from and when an example is done.
//!
//! Teacher forcing ([`TrainingInputFn`]) replays ground-truth inputs; free
//! running ([`GreedyEmbeddingInputFn`]) feeds back the embedding of the id
//! predicted at the previous step.

use candle_core::{DType, Device, Tensor};

use crate::errors::{DecoderError, Result};
use crate::output::StepOutput;

/// Input for the next step plus per-example finished flags (`u8`, `[batch]`).
#[derive(Debug, Clone)]
pub struct NextInputs {
    pub inputs: Tensor,
    pub finished: Tensor,
}

/// Produces the input of step `time`.
///
/// `previous` is `None` for the initial call (time 0) and holds the outputs of
/// step `time - 1` afterwards.
pub trait InputFn: Send + Sync {
    fn next_inputs(&self, time: usize, previous: Option<&dyn StepOutput>) -> Result<NextInputs>;
}

impl<F> InputFn for F
where
    F: Fn(usize, Option<&dyn StepOutput>) -> Result<NextInputs> + Send + Sync,
{
    fn next_inputs(&self, time: usize, previous: Option<&dyn StepOutput>) -> Result<NextInputs> {
        self(time, previous)
    }
}

/// Builds a `u8` finished tensor from host flags.
pub fn finished_tensor(flags: &[bool], device: &Device) -> Result<Tensor> {
    let data: Vec<u8> = flags.iter().map(|done| u8::from(*done)).collect();
    Ok(Tensor::from_vec(data, flags.len(), device)?)
}

/// Reads finished flags back to the host.
pub fn finished_flags(finished: &Tensor) -> Result<Vec<bool>> {
    let flags = finished.to_dtype(DType::U8)?.to_vec1::<u8>()?;
    Ok(flags.into_iter().map(|flag| flag != 0).collect())
}

/// Teacher forcing: step `t` receives `inputs[:, t, :]`.
///
/// Example `b` is finished once `t >= sequence_length[b]`. Past the last time
/// step of `inputs` the function feeds zeros.
#[derive(Debug, Clone)]
pub struct TrainingInputFn {
    inputs: Tensor,
    sequence_length: Vec<usize>,
}

impl TrainingInputFn {
    pub fn new(inputs: Tensor, sequence_length: Vec<usize>) -> Result<Self> {
        let (batch, _, _) = inputs.dims3().map_err(|_| {
            DecoderError::shape(
                "training_input.inputs",
                format!("expected [batch, time, dim], got {:?}", inputs.dims()),
            )
        })?;
        if sequence_length.len() != batch {
            return Err(DecoderError::shape(
                "training_input.sequence_length",
                format!("{} lengths for a batch of {batch}", sequence_length.len()),
            ));
        }
        Ok(Self {
            inputs,
            sequence_length,
        })
    }
}

impl InputFn for TrainingInputFn {
    fn next_inputs(&self, time: usize, _previous: Option<&dyn StepOutput>) -> Result<NextInputs> {
        let (batch, steps, dim) = self.inputs.dims3()?;
        let inputs = if time < steps {
            self.inputs.narrow(1, time, 1)?.squeeze(1)?.contiguous()?
        } else {
            Tensor::zeros((batch, dim), self.inputs.dtype(), self.inputs.device())?
        };
        let flags: Vec<bool> = self.sequence_length.iter().map(|len| time >= *len).collect();
        let finished = finished_tensor(&flags, self.inputs.device())?;
        Ok(NextInputs { inputs, finished })
    }
}

/// Free running: step `t > 0` receives the embedding of the previous prediction.
///
/// The initial call embeds `start_token` for every example. An example is
/// reported finished on the step whose prediction equals `end_token`.
#[derive(Debug, Clone)]
pub struct GreedyEmbeddingInputFn {
    embedding: Tensor,
    start_token: u32,
    end_token: u32,
    batch_size: usize,
}

impl GreedyEmbeddingInputFn {
    /// `embedding` is the `[vocab_size, dim]` lookup table.
    pub fn new(embedding: Tensor, start_token: u32, end_token: u32, batch_size: usize) -> Result<Self> {
        let (vocab_size, _) = embedding.dims2().map_err(|_| {
            DecoderError::shape(
                "greedy_input.embedding",
                format!("expected [vocab_size, dim], got {:?}", embedding.dims()),
            )
        })?;
        for (name, token) in [("start_token", start_token), ("end_token", end_token)] {
            if token as usize >= vocab_size {
                return Err(DecoderError::Config(vec![format!(
                    "{name} {token} is outside the vocabulary of {vocab_size}"
                )]));
            }
        }
        Ok(Self {
            embedding,
            start_token,
            end_token,
            batch_size,
        })
    }

    fn embed(&self, ids: &Tensor) -> Result<Tensor> {
        Ok(self.embedding.index_select(ids, 0)?)
    }
}

impl InputFn for GreedyEmbeddingInputFn {
    fn next_inputs(&self, time: usize, previous: Option<&dyn StepOutput>) -> Result<NextInputs> {
        let device = self.embedding.device();
        match previous {
            None => {
                let ids = Tensor::full(self.start_token, self.batch_size, device)?;
                let finished = Tensor::zeros(self.batch_size, DType::U8, device)?;
                Ok(NextInputs {
                    inputs: self.embed(&ids)?,
                    finished,
                })
            }
            Some(outputs) => {
                let ids = outputs.predicted_ids().to_dtype(DType::U32)?;
                if ids.dims() != [self.batch_size].as_slice() {
                    return Err(DecoderError::shape(
                        "greedy_input.predicted_ids",
                        format!(
                            "time {time}: expected [{}], got {:?}",
                            self.batch_size,
                            ids.dims()
                        ),
                    ));
                }
                let finished = ids.eq(self.end_token)?;
                Ok(NextInputs {
                    inputs: self.embed(&ids)?,
                    finished,
                })
            }
        }
    }
}
