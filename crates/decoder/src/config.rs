//! Decoder hyperparameters and their TOML/JSON loading.

use std::{fs, path::Path};

use attention::Config as AttentionConfig;
use serde::Deserialize;

use crate::errors::{DecoderError, Result};

/// Padding width for attention scores when none is configured.
pub const DEFAULT_ATTENTION_INPUTS_MAX_LEN: usize = 500;

/// Recurrent cell family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    #[default]
    Lstm,
    Gru,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CellConfig {
    #[serde(default)]
    pub kind: CellKind,
    pub num_units: usize,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            kind: CellKind::default(),
            num_units: 128,
        }
    }
}

/// Hyperparameters shared by [`BasicDecoder`](crate::BasicDecoder) and
/// [`AttentionDecoder`](crate::AttentionDecoder).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DecoderConfig {
    /// Width of the softmax layer.
    pub vocab_size: usize,
    /// Upper bound on the number of decode steps.
    pub max_decode_length: usize,
    /// Fixed width attention scores are padded to at every step.
    #[serde(default = "default_attention_inputs_max_len")]
    pub attention_inputs_max_len: usize,
    #[serde(default)]
    pub cell: CellConfig,
    #[serde(default)]
    pub attention: AttentionConfig,
}

fn default_attention_inputs_max_len() -> usize {
    DEFAULT_ATTENTION_INPUTS_MAX_LEN
}

impl DecoderConfig {
    pub fn new(vocab_size: usize, max_decode_length: usize) -> Self {
        Self {
            vocab_size,
            max_decode_length,
            attention_inputs_max_len: DEFAULT_ATTENTION_INPUTS_MAX_LEN,
            cell: CellConfig::default(),
            attention: AttentionConfig::default(),
        }
    }

    pub fn with_attention_inputs_max_len(mut self, max_len: usize) -> Self {
        self.attention_inputs_max_len = max_len;
        self
    }

    /// Loads a TOML or JSON file, chosen by extension, and validates it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: DecoderConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(DecoderError::ConfigFormat(format!(
                    "unsupported configuration extension '{}'",
                    other
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.vocab_size == 0 {
            errors.push("vocab_size must be greater than 0".to_string());
        }
        if self.max_decode_length == 0 {
            errors.push("max_decode_length must be greater than 0".to_string());
        }
        if self.attention_inputs_max_len == 0 {
            errors.push("attention_inputs_max_len must be greater than 0".to_string());
        }
        if self.cell.num_units == 0 {
            errors.push("cell.num_units must be greater than 0".to_string());
        }
        if let Err(err) = self.attention.validate() {
            errors.push(format!("attention: {err}"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DecoderError::Config(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attention::AttentionKind;
    use std::io::Write;

    #[test]
    fn toml_fills_defaults() -> anyhow::Result<()> {
        let config: DecoderConfig = toml::from_str(
            r#"
            vocab_size = 32
            max_decode_length = 20

            [attention]
            kind = "bahdanau"
            "#,
        )?;
        assert_eq!(config.attention_inputs_max_len, 500);
        assert_eq!(config.attention.kind, AttentionKind::Bahdanau);
        assert_eq!(config.attention.num_units, 128);
        assert_eq!(config.cell.kind, CellKind::Lstm);
        config.validate()?;
        Ok(())
    }

    #[test]
    fn validation_reports_every_problem() {
        let mut config = DecoderConfig::new(0, 0);
        config.cell.num_units = 0;
        match config.validate() {
            Err(DecoderError::Config(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn loads_json_and_rejects_unknown_extensions() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let json = dir.path().join("decoder.json");
        let mut file = std::fs::File::create(&json)?;
        write!(
            file,
            r#"{{"vocab_size": 10, "max_decode_length": 4, "attention_inputs_max_len": 8,
                "cell": {{"kind": "gru", "num_units": 16}}}}"#
        )?;
        let config = DecoderConfig::from_path(&json)?;
        assert_eq!(config.attention_inputs_max_len, 8);
        assert_eq!(config.cell.kind, CellKind::Gru);

        let yaml = dir.path().join("decoder.yaml");
        std::fs::write(&yaml, "vocab_size: 10")?;
        assert!(matches!(
            DecoderConfig::from_path(&yaml),
            Err(DecoderError::ConfigFormat(_))
        ));
        Ok(())
    }
}
