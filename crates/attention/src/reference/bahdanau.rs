//! Additive (Bahdanau) attention.

use std::sync::OnceLock;

use candle_core::Tensor;
use candle_nn::{Init, VarBuilder};
use layers::{Linear, LinearConfig, LinearLayer, PrecisionPolicy};

use super::{check_inputs, weigh_inputs};
use crate::core::{AttentionError, AttentionFn, AttentionOutput};

/// Scores each source position with `v . tanh(W_k x_t + W_q s)`.
#[derive(Debug)]
pub struct BahdanauAttention {
    keys: Linear,
    query: Linear,
    v: Tensor,
    policy: PrecisionPolicy,
    values_length: Option<Vec<usize>>,
    first_call: OnceLock<()>,
}

impl BahdanauAttention {
    /// Creates the projections plus the `v` scoring vector under `vb`.
    pub fn new(
        state_dim: usize,
        feature_dim: usize,
        num_units: usize,
        vb: VarBuilder,
    ) -> Result<Self, AttentionError> {
        let policy = PrecisionPolicy::from_parameter_dtype(vb.dtype());
        let keys = Linear::from_var_builder(
            LinearConfig::new(feature_dim, num_units),
            vb.pp("keys"),
        )?;
        let query = Linear::from_var_builder(
            LinearConfig::new(state_dim, num_units),
            vb.pp("query"),
        )?;
        let bound = 1.0 / (num_units as f64).sqrt();
        let v = vb.get_with_hints(
            num_units,
            "v",
            Init::Uniform {
                lo: -bound,
                up: bound,
            },
        )?;
        Ok(Self {
            keys,
            query,
            v,
            policy,
            values_length: None,
            first_call: OnceLock::new(),
        })
    }

    /// Restricts attention to the first `lengths[b]` positions of example `b`.
    pub fn with_values_length(mut self, lengths: Vec<usize>) -> Self {
        self.values_length = Some(lengths);
        self
    }

    pub fn num_units(&self) -> usize {
        self.keys.config().output_dim
    }
}

impl AttentionFn for BahdanauAttention {
    fn attend(&self, state: &Tensor, inputs: &Tensor) -> Result<AttentionOutput, AttentionError> {
        let lengths = self.values_length.as_deref();
        let (batch, source_len, feature_dim) = check_inputs(state, inputs, lengths)?;
        if self.first_call.set(()).is_ok() {
            log::info!(
                "attention::bahdanau init batch={} source_len={} feature_dim={} num_units={} masked={}",
                batch,
                source_len,
                feature_dim,
                self.num_units(),
                lengths.is_some()
            );
        }

        let keys = self.keys.forward(inputs, &self.policy)?;
        let query = self.query.forward(state, &self.policy)?;
        let v = self.policy.cast_for_matmul(&self.v)?;
        let hidden = self
            .policy
            .cast_for_matmul(&keys.broadcast_add(&query.unsqueeze(1)?)?)?
            .tanh()?;
        let raw_scores = hidden.broadcast_mul(&v)?.sum(2)?;
        weigh_inputs(&raw_scores, inputs, lengths)
    }
}
