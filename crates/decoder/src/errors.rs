use attention::AttentionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecoderError>;

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("attention error: {0}")]
    Attention(#[from] AttentionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigFormat(String),

    #[error("invalid configuration: {}", .0.join("; "))]
    Config(Vec<String>),

    #[error("shape mismatch for {context}: {message}")]
    Shape {
        context: &'static str,
        message: String,
    },

    #[error("attention scores of length {actual} exceed attention_inputs_max_len {max}")]
    ScoresTooLong { actual: usize, max: usize },

    #[error("reverse length {length} for example {example} exceeds score width {width}")]
    ReverseLength {
        example: usize,
        length: usize,
        width: usize,
    },

    #[error("decoder emitted no steps: every example was finished at initialization")]
    EmptyDecode,
}

impl DecoderError {
    pub(crate) fn shape(context: &'static str, message: impl Into<String>) -> Self {
        Self::Shape {
            context,
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for DecoderError {
    fn from(value: toml::de::Error) -> Self {
        DecoderError::ConfigFormat(value.to_string())
    }
}

impl From<serde_json::Error> for DecoderError {
    fn from(value: serde_json::Error) -> Self {
        DecoderError::ConfigFormat(value.to_string())
    }
}
