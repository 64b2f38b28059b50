//! Per-step decoder outputs and the shape/dtype contracts they are checked against.
//!
//! Every decoder step returns a struct of named tensors whose leading axis is
//! the batch. The base loop validates each step against the decoder's
//! [`OutputSpec`] and finally stacks the steps field by field along a new
//! leading time axis, giving time-major `[time, batch, ...]` sequences.

use candle_core::{DType, Tensor};

use crate::errors::{DecoderError, Result};

/// Named tensors emitted by one decoder step.
pub trait StepOutput {
    /// All fields in declaration order, each shaped `[batch, ...]`.
    fn fields(&self) -> Vec<(&'static str, &Tensor)>;

    /// Ids chosen by the prediction function, shaped `[batch]`.
    fn predicted_ids(&self) -> &Tensor;

    /// Rebuilds an output from tensors listed in [`StepOutput::fields`] order.
    fn from_fields(fields: Vec<Tensor>) -> Result<Self>
    where
        Self: Sized;
}

/// Per-example shape and dtype of one output field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Shape excluding the batch axis; empty for scalars.
    pub dims: Vec<usize>,
    pub dtype: DType,
}

impl FieldSpec {
    pub fn new(name: &'static str, dims: Vec<usize>, dtype: DType) -> Self {
        Self { name, dims, dtype }
    }
}

/// Static description of every field a decoder emits per step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    fields: Vec<FieldSpec>,
}

impl OutputSpec {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Per-example shape of `name`.
    pub fn output_size(&self, name: &str) -> Option<&[usize]> {
        self.field(name).map(|field| field.dims.as_slice())
    }

    /// Numeric type of `name`.
    pub fn output_dtype(&self, name: &str) -> Option<DType> {
        self.field(name).map(|field| field.dtype)
    }

    /// Checks that `output` matches this spec for a batch of `batch` examples.
    pub fn validate(&self, output: &dyn StepOutput, batch: usize) -> Result<()> {
        let fields = output.fields();
        if fields.len() != self.fields.len() {
            return Err(DecoderError::shape(
                "decoder.output",
                format!(
                    "expected {} fields, step produced {}",
                    self.fields.len(),
                    fields.len()
                ),
            ));
        }
        for (spec, (name, tensor)) in self.fields.iter().zip(fields) {
            if spec.name != name {
                return Err(DecoderError::shape(
                    "decoder.output",
                    format!("expected field '{}', found '{}'", spec.name, name),
                ));
            }
            let mut expected = Vec::with_capacity(spec.dims.len() + 1);
            expected.push(batch);
            expected.extend_from_slice(&spec.dims);
            if tensor.dims() != expected.as_slice() {
                return Err(DecoderError::shape(
                    "decoder.output",
                    format!(
                        "field '{}' expected shape {:?}, got {:?}",
                        name,
                        expected,
                        tensor.dims()
                    ),
                ));
            }
            if tensor.dtype() != spec.dtype {
                return Err(DecoderError::shape(
                    "decoder.output",
                    format!(
                        "field '{}' expected dtype {:?}, got {:?}",
                        name,
                        spec.dtype,
                        tensor.dtype()
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Replaces the rows of already finished examples with zeros.
pub(crate) fn zero_finished<O: StepOutput>(output: &O, finished: &[bool]) -> Result<O> {
    let fields = output.fields();
    if !finished.iter().any(|done| *done) {
        return O::from_fields(fields.into_iter().map(|(_, t)| t.clone()).collect());
    }

    let mut zeroed = Vec::with_capacity(fields.len());
    for (_, tensor) in fields {
        let flags: Vec<u8> = finished.iter().map(|done| u8::from(*done)).collect();
        let mut mask_shape = vec![1usize; tensor.rank()];
        mask_shape[0] = finished.len();
        let mask = Tensor::from_vec(flags, mask_shape, tensor.device())?
            .broadcast_as(tensor.shape())?;
        zeroed.push(mask.where_cond(&tensor.zeros_like()?, tensor)?);
    }
    O::from_fields(zeroed)
}

/// Stacks per-step outputs along a new leading time axis.
pub(crate) fn stack_steps<O: StepOutput>(steps: &[O]) -> Result<O> {
    let first = steps.first().ok_or(DecoderError::EmptyDecode)?;
    let width = first.fields().len();
    let mut columns: Vec<Vec<Tensor>> = vec![Vec::with_capacity(steps.len()); width];
    for step in steps {
        for (column, (_, tensor)) in columns.iter_mut().zip(step.fields()) {
            column.push(tensor.clone());
        }
    }
    let stacked = columns
        .iter()
        .map(|column| Tensor::stack(column.as_slice(), 0))
        .collect::<candle_core::Result<Vec<_>>>()?;
    O::from_fields(stacked)
}
