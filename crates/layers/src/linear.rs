//! Linear and affine projection helpers.
//!
//! Linear layers accept inputs shaped `(batch, in_dim)` or
//! `(batch, seq, in_dim)` and return the same layout with `out_dim` features.
//! Weights are cast to [`PrecisionPolicy::compute`] for the matmul and results
//! are cast back with [`PrecisionPolicy::cast_to_storage`]. Parameters are
//! normally created through a [`VarBuilder`] so that a `VarMap` owns them and
//! Candle's autograd tracks gradients through every forward pass.

use candle_core::{DType, Error, Result, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::{checks, dtypes::PrecisionPolicy};

/// Configuration shared by dense projection layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
}

impl LinearConfig {
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
        }
    }
}

/// Shared interface for affine projections.
pub trait LinearLayer: Send + Sync {
    /// Returns the static configuration used to validate inputs.
    fn config(&self) -> &LinearConfig;

    /// Applies the linear projection, promoting to the compute dtype when needed.
    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor>;
}

/// Xavier/Glorot uniform initialiser for a `(fan_out, fan_in)` weight.
fn xavier_uniform(fan_in: usize, fan_out: usize) -> Init {
    let bound = (6.0f64 / (fan_in + fan_out) as f64).sqrt();
    Init::Uniform {
        lo: -bound,
        up: bound,
    }
}

/// Dense affine projection with bias and a mixed-precision aware forward pass.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Tensor,
    bias: Tensor,
}

impl Linear {
    /// Constructs a linear layer from pre-existing parameters.
    pub(crate) fn new(config: LinearConfig, weight: Tensor, bias: Tensor) -> Result<Self> {
        Self::validate_weight(&config, &weight)?;
        Self::validate_bias(&config, &bias)?;
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Creates (or fetches) the `weight` and `bias` variables under `vb`.
    ///
    /// Weights start Xavier-uniform, biases at zero.
    pub fn from_var_builder(config: LinearConfig, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get_with_hints(
            (config.output_dim, config.input_dim),
            "weight",
            xavier_uniform(config.input_dim, config.output_dim),
        )?;
        let bias = vb.get_with_hints(config.output_dim, "bias", Init::Const(0.0))?;
        Self::new(config, weight, bias)
    }

    fn validate_weight(config: &LinearConfig, weight: &Tensor) -> Result<()> {
        checks::expect_rank("linear.weight", weight, 2)?;
        checks::expect_shape(
            "linear.weight",
            weight,
            &[config.output_dim, config.input_dim],
        )?;
        checks::expect_dtype_in(
            "linear.weight",
            weight,
            &[DType::F16, DType::BF16, DType::F32, DType::F64],
        )
    }

    fn validate_bias(config: &LinearConfig, bias: &Tensor) -> Result<()> {
        checks::expect_shape("linear.bias", bias, &[config.output_dim])?;
        checks::expect_dtype_in(
            "linear.bias",
            bias,
            &[DType::F16, DType::BF16, DType::F32, DType::F64],
        )
    }

    fn validate_input(&self, hidden: &Tensor) -> Result<()> {
        match hidden.dims() {
            [batch, seq, _] => {
                checks::expect_batch_seq_hidden("linear.input", hidden, self.config.input_dim)?;
                if *batch == 0 || *seq == 0 {
                    Err(Error::Msg("batch/seq dimensions must be non-zero".into()))
                } else {
                    Ok(())
                }
            }
            [_, _] => checks::expect_batch_hidden("linear.input", hidden, self.config.input_dim),
            dims => Err(Error::Msg(format!(
                "linear expects input shaped [B, T, H_in] or [B, H_in], got {:?}",
                dims
            ))),
        }
    }
}

impl LinearLayer for Linear {
    fn config(&self) -> &LinearConfig {
        &self.config
    }

    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        self.validate_input(hidden)?;

        let input = policy.cast_for_matmul(hidden)?;
        let weight_t = policy.cast_for_matmul(&self.weight)?.t()?;

        let output = match input.dims() {
            [batch, seq, _] => {
                let (batch, seq) = (*batch, *seq);
                input
                    .reshape((batch * seq, self.config.input_dim))?
                    .matmul(&weight_t)?
                    .reshape((batch, seq, self.config.output_dim))?
            }
            _ => input.matmul(&weight_t)?,
        };

        let output = output.broadcast_add(&policy.cast_for_matmul(&self.bias)?)?;
        policy.cast_to_storage(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Var};
    use candle_nn::VarMap;

    fn reference_linear(input: &Tensor, weight: &Tensor, bias: &Tensor) -> Result<Tensor> {
        input.matmul(&weight.t()?)?.broadcast_add(bias)
    }

    fn tensor_stats(tensor: &Tensor) -> Result<(f64, f64)> {
        let values = tensor
            .to_dtype(DType::F32)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        let mean = values.iter().copied().map(f64::from).sum::<f64>() / values.len() as f64;
        let var = values
            .iter()
            .copied()
            .map(|v| {
                let diff = f64::from(v) - mean;
                diff * diff
            })
            .sum::<f64>()
            / values.len() as f64;
        Ok((mean, var.sqrt()))
    }

    #[test]
    fn forward_matches_reference_across_dtypes() -> Result<()> {
        let device = Device::Cpu;
        let config = LinearConfig::new(8, 4);
        let weight = Tensor::randn(0f32, 0.05, (4, 8), &device)?;
        let bias = Tensor::randn(0f32, 0.02, 4, &device)?;

        for &dtype in &[DType::F32, DType::F16, DType::BF16] {
            let linear = Linear::new(
                config.clone(),
                weight.to_dtype(dtype)?,
                bias.to_dtype(dtype)?,
            )?;
            let input = Tensor::randn(0f32, 1.0, (3, 8), &device)?.to_dtype(dtype)?;
            let policy = PrecisionPolicy::from_parameter_dtype(dtype);
            let output = linear.forward(&input, &policy)?;

            assert_eq!(output.dims(), &[3, 4]);
            assert_eq!(output.dtype(), dtype);

            let reference = reference_linear(&input.to_dtype(DType::F32)?, &weight, &bias)?;
            let max = output
                .to_dtype(DType::F32)?
                .sub(&reference)?
                .abs()?
                .max_all()?
                .to_vec0::<f32>()?;
            let tol = match dtype {
                DType::F16 => 1e-2,
                DType::BF16 => 2e-2,
                _ => 1e-4,
            };
            assert!(max <= tol, "max diff {} for {:?}", max, dtype);
        }

        Ok(())
    }

    #[test]
    fn sequence_inputs_keep_their_layout() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let linear = Linear::from_var_builder(LinearConfig::new(6, 3), vb.pp("proj"))?;
        let input = Tensor::randn(0f32, 1.0, (2, 5, 6), &device)?;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::F32);
        assert_eq!(linear.forward(&input, &policy)?.dims(), &[2, 5, 3]);

        let wrong = Tensor::randn(0f32, 1.0, (2, 7), &device)?;
        assert!(linear.forward(&wrong, &policy).is_err());
        Ok(())
    }

    #[test]
    fn xavier_uniform_weights_stay_within_bound() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let linear = Linear::from_var_builder(LinearConfig::new(128, 64), vb)?;
        let bound = (6.0f64 / (128.0 + 64.0)).sqrt();
        let (mean, std) = tensor_stats(&linear.weight)?;
        let max = linear.weight.abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(f64::from(max) <= bound + 1e-6);
        assert!(mean.abs() < 5e-3);
        let expected = bound / 3f64.sqrt();
        assert!((std - expected).abs() < expected * 0.25);
        assert!(linear.bias.to_vec1::<f32>()?.iter().all(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn gradients_reach_every_parameter() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let linear = Linear::from_var_builder(LinearConfig::new(4, 2), vb)?;
        let input = Tensor::randn(0f32, 1.0, (3, 4), &device)?;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::F32);

        let loss = linear.forward(&input, &policy)?.sqr()?.sum_all()?;
        let grads = loss.backward()?;
        let vars: Vec<Var> = varmap.all_vars();
        assert_eq!(vars.len(), 2);
        for var in vars {
            assert!(grads.get(var.as_tensor()).is_some());
        }
        Ok(())
    }

    #[test]
    fn parameter_shapes_must_match_the_config() -> Result<()> {
        let device = Device::Cpu;
        let weight = Tensor::zeros((2, 3), DType::F32, &device)?;
        let bias = Tensor::zeros(2, DType::F32, &device)?;
        assert!(Linear::new(LinearConfig::new(3, 2), weight.clone(), bias.clone()).is_ok());
        assert!(Linear::new(LinearConfig::new(2, 3), weight.clone(), bias).is_err());
        let wrong_bias = Tensor::zeros(3, DType::F32, &device)?;
        assert!(Linear::new(LinearConfig::new(3, 2), weight, wrong_bias).is_err());
        Ok(())
    }
}
