//! Configuration options shared by all attention implementations.
//!
//! The [`Config`] struct selects the scoring function and the width of the
//! projected key/query space. It deserializes from the `[attention]` table of
//! a decoder configuration file.

use serde::Deserialize;

use crate::core::AttentionError;

/// Scoring function used to compare the decoder state with each encoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionKind {
    /// Multiplicative scoring, `score = <W_k x_t, W_q s>` (Luong et al.).
    #[default]
    Dot,
    /// Additive scoring, `score = v . tanh(W_k x_t + W_q s)` (Bahdanau et al.).
    Bahdanau,
}

/// Configuration driving attention behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Scoring function.
    #[serde(default)]
    pub kind: AttentionKind,
    /// Width of the projected key and query vectors.
    #[serde(default = "default_num_units")]
    pub num_units: usize,
}

fn default_num_units() -> usize {
    128
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kind: AttentionKind::default(),
            num_units: default_num_units(),
        }
    }
}

impl Config {
    /// Checks that the configuration can build a layer.
    pub fn validate(&self) -> Result<(), AttentionError> {
        if self.num_units == 0 {
            return Err(AttentionError::InvalidConfig {
                message: "num_units must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
