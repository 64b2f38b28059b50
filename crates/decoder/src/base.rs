//! The time-stepped decode loop shared by every decoder.
//!
//! [`dynamic_decode`] calls [`Decoder::initialize`] once, then
//! [`Decoder::step`] until every example is finished or
//! [`Decoder::max_decode_length`] steps have run. Decoders never decide
//! termination themselves; they only forward the flags their input function
//! reports. Flags are sticky: once an example is finished it stays finished,
//! and the rows it emits afterwards are zeroed.

use candle_core::Tensor;

use crate::errors::{DecoderError, Result};
use crate::input::finished_flags;
use crate::output::{stack_steps, zero_finished, OutputSpec, StepOutput};

/// Values returned by [`Decoder::initialize`].
#[derive(Debug, Clone)]
pub struct Initialized<S> {
    /// `u8` flags shaped `[batch]`.
    pub finished: Tensor,
    pub inputs: Tensor,
    pub state: S,
}

/// Values returned by [`Decoder::step`].
#[derive(Debug, Clone)]
pub struct StepResult<O, S> {
    pub outputs: O,
    pub state: S,
    pub next_inputs: Tensor,
    /// `u8` flags shaped `[batch]`.
    pub finished: Tensor,
}

/// Result of a full decode.
#[derive(Debug, Clone)]
pub struct DecodeResult<O, S> {
    /// Outputs stacked time-major, each field shaped `[time, batch, ...]`.
    pub outputs: O,
    pub final_state: S,
    /// Number of steps each example emitted before it finished.
    pub sequence_lengths: Vec<usize>,
}

impl<O, S> DecodeResult<O, S> {
    /// Number of steps the loop ran.
    pub fn steps(&self) -> usize {
        self.sequence_lengths.iter().copied().max().unwrap_or(0)
    }
}

/// A decoder driven by [`dynamic_decode`].
pub trait Decoder {
    type Output: StepOutput;
    type State;

    fn batch_size(&self) -> usize;

    fn max_decode_length(&self) -> usize;

    /// Per-field shape and dtype every step must produce.
    fn output_spec(&self) -> OutputSpec;

    fn initialize(&self) -> Result<Initialized<Self::State>>;

    fn step(
        &self,
        time: usize,
        inputs: &Tensor,
        state: Self::State,
    ) -> Result<StepResult<Self::Output, Self::State>>;
}

pub fn dynamic_decode<D: Decoder>(decoder: &D) -> Result<DecodeResult<D::Output, D::State>> {
    let batch = decoder.batch_size();
    let max_steps = decoder.max_decode_length();
    let spec = decoder.output_spec();

    let Initialized {
        finished,
        mut inputs,
        mut state,
    } = decoder.initialize()?;
    let mut done = checked_flags(&finished, batch)?;
    let mut sequence_lengths = vec![0usize; batch];
    let mut steps = Vec::with_capacity(max_steps.min(64));

    let mut time = 0;
    while time < max_steps && !done.iter().all(|finished| *finished) {
        let StepResult {
            outputs,
            state: next_state,
            next_inputs,
            finished,
        } = decoder.step(time, &inputs, state)?;
        spec.validate(&outputs, batch)?;

        steps.push(zero_finished(&outputs, &done)?);
        for (length, finished) in sequence_lengths.iter_mut().zip(&done) {
            if !*finished {
                *length += 1;
            }
        }
        for (flag, now_finished) in done.iter_mut().zip(checked_flags(&finished, batch)?) {
            *flag |= now_finished;
        }
        log::trace!("decode step={} finished={:?}", time, done);

        state = next_state;
        inputs = next_inputs;
        time += 1;
    }

    log::debug!(
        "decode finished steps={} max_decode_length={} all_finished={} lengths={:?}",
        time,
        max_steps,
        done.iter().all(|finished| *finished),
        sequence_lengths
    );

    if steps.is_empty() {
        return Err(DecoderError::EmptyDecode);
    }
    Ok(DecodeResult {
        outputs: stack_steps(&steps)?,
        final_state: state,
        sequence_lengths,
    })
}

fn checked_flags(finished: &Tensor, batch: usize) -> Result<Vec<bool>> {
    let flags = finished_flags(finished)?;
    if flags.len() != batch {
        return Err(DecoderError::shape(
            "decoder.finished",
            format!("expected {batch} finished flags, got {}", flags.len()),
        ));
    }
    Ok(flags)
}
