//! Fully connected layer: an affine projection followed by an activation.
//!
//! Decoders use two of these per step: a `tanh` layer mixing recurrent output
//! with attention context, and an identity layer producing vocabulary logits.

use std::{fmt, sync::Arc};

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;

use crate::{
    activations::{builtin, Activation, ActivationKind},
    dtypes::PrecisionPolicy,
    linear::{Linear, LinearConfig, LinearLayer},
};

/// Projection plus activation, created under a single variable scope.
#[derive(Clone)]
pub struct FullyConnected {
    linear: Linear,
    activation: Arc<dyn Activation>,
}

impl fmt::Debug for FullyConnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullyConnected")
            .field("config", self.linear.config())
            .field("activation", &self.activation.kind())
            .finish()
    }
}

impl FullyConnected {
    /// Builds a layer mapping `input_dim` to `output_dim` features under `vb`.
    pub fn new(
        input_dim: usize,
        output_dim: usize,
        activation: ActivationKind,
        vb: VarBuilder,
    ) -> Result<Self> {
        let linear = Linear::from_var_builder(LinearConfig::new(input_dim, output_dim), vb)?;
        Ok(Self::from_linear(linear, activation))
    }

    fn from_linear(linear: Linear, activation: ActivationKind) -> Self {
        Self {
            linear,
            activation: builtin(activation),
        }
    }

    pub fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        let projected = self.linear.forward(input, policy)?;
        self.activation.forward(&projected, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn tanh_layer_output_is_bounded() -> Result<()> {
        let device = Device::Cpu;
        let weight = Tensor::full(10f32, (2, 3), &device)?;
        let bias = Tensor::zeros(2, DType::F32, &device)?;
        let linear = Linear::new(LinearConfig::new(3, 2), weight, bias)?;
        let layer = FullyConnected::from_linear(linear, ActivationKind::Tanh);

        let input = Tensor::from_slice(&[1f32, 1.0, 1.0, -1.0, -1.0, -1.0], (2, 3), &device)?;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::F32);
        let values = layer.forward(&input, &policy)?.to_vec2::<f32>()?;

        assert!(values[0].iter().all(|v| (v - 1.0).abs() < 1e-5));
        assert!(values[1].iter().all(|v| (v + 1.0).abs() < 1e-5));
        Ok(())
    }
}
