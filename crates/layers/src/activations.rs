//! Activation catalogue for dense projections.
//!
//! Activations return tensors with the same layout as their input. Each
//! implementation promotes inputs to the compute dtype requested by
//! [`PrecisionPolicy`] before evaluating the non-linearity, then casts the
//! result back to the storage dtype.
//!
//! # Built-in formulas
//!
//! * **Tanh** saturates to `(-1, 1)` and is the mixing non-linearity used when
//!   fusing decoder state with an attention context.
//! * **Identity** passes the projection through unchanged, giving raw logits.

use std::sync::Arc;

use candle_core::{Result, Tensor};

use crate::dtypes::PrecisionPolicy;

/// Identifies which non-linearity is implemented by an [`Activation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    /// Identity function; a projection followed by it yields raw logits.
    Identity,
    /// Hyperbolic tangent.
    Tanh,
}

/// Common interface shared by activation functions.
pub trait Activation: Send + Sync {
    /// Returns the [`ActivationKind`] for introspection when wiring composite layers.
    fn kind(&self) -> ActivationKind;

    /// Applies the activation to `input` using the precision rules in `policy`.
    fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor>;
}

/// Built-in activation backed by Candle kernels.
struct BuiltinActivation {
    kind: ActivationKind,
}

impl Activation for BuiltinActivation {
    fn kind(&self) -> ActivationKind {
        self.kind
    }

    fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        match self.kind {
            ActivationKind::Identity => policy.cast_to_storage(input),
            ActivationKind::Tanh => {
                let compute = policy.cast_for_matmul(input)?;
                policy.cast_to_storage(&compute.tanh()?)
            }
        }
    }
}

/// Returns a shared built-in activation implementation.
pub fn builtin(kind: ActivationKind) -> Arc<dyn Activation> {
    Arc::new(BuiltinActivation { kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn tanh_matches_reference_formula() -> Result<()> {
        let device = Device::Cpu;
        let activation = builtin(ActivationKind::Tanh);
        let values = [-2.5f32, -0.5, 0.0, 1.0, 3.0];
        let input = Tensor::from_slice(&values, (5,), &device)?;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::F32);
        let output = activation.forward(&input, &policy)?.to_vec1::<f32>()?;

        for (out, x) in output.iter().zip(values.iter()) {
            assert!((out - x.tanh()).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn identity_keeps_values_and_layout() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::from_slice(&[-3.0f32, 0.0, 2.0, 4.0], (2, 2), &device)?;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::F32);

        let identity = builtin(ActivationKind::Identity).forward(&input, &policy)?;
        assert_eq!(identity.dims(), &[2, 2]);
        assert_eq!(
            identity.flatten_all()?.to_vec1::<f32>()?,
            vec![-3.0, 0.0, 2.0, 4.0]
        );
        Ok(())
    }
}
