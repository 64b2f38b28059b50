//! Building blocks for decoder projections.
//!
//! Dense layers, activations and precision handling assembled from Candle
//! primitives. Parameters are registered through `candle_nn::VarBuilder` so
//! gradients flow through Candle's autograd.

pub mod activations;
pub mod checks;
pub mod dense;
pub mod dtypes;
pub mod linear;

pub use activations::ActivationKind;
pub use dense::FullyConnected;
pub use dtypes::PrecisionPolicy;
pub use linear::{Linear, LinearConfig, LinearLayer};
