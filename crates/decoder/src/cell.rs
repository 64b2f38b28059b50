//! Recurrent cells driven one step at a time by the decoders.

use candle_core::Tensor;
use candle_nn::rnn::{gru, lstm, GRUConfig, GRUState, LSTMConfig, LSTMState, GRU, LSTM, RNN};
use candle_nn::VarBuilder;

use crate::config::{CellConfig, CellKind};
use crate::errors::Result;

/// A stateful transition `(input, state) -> (output, new_state)`.
///
/// The state is opaque to decoders: they receive it from the caller, move it
/// into [`RecurrentCell::step`] and hand the returned state to the next step.
pub trait RecurrentCell: Send + Sync {
    type State: Clone + Send;

    /// Width of the input expected by [`RecurrentCell::step`].
    fn input_size(&self) -> usize;

    /// Width of the vector returned by [`RecurrentCell::step`].
    fn output_size(&self) -> usize;

    fn step(&self, input: &Tensor, state: Self::State) -> Result<(Tensor, Self::State)>;
}

/// Single-layer LSTM; its output is the hidden state `h`.
#[derive(Debug, Clone)]
pub struct LstmCell {
    inner: LSTM,
    input_dim: usize,
    num_units: usize,
}

impl LstmCell {
    pub fn new(input_dim: usize, num_units: usize, vb: VarBuilder) -> Result<Self> {
        let inner = lstm(input_dim, num_units, LSTMConfig::default(), vb)?;
        Ok(Self {
            inner,
            input_dim,
            num_units,
        })
    }

    pub fn zero_state(&self, batch: usize) -> Result<LSTMState> {
        Ok(self.inner.zero_state(batch)?)
    }
}

impl RecurrentCell for LstmCell {
    type State = LSTMState;

    fn input_size(&self) -> usize {
        self.input_dim
    }

    fn output_size(&self) -> usize {
        self.num_units
    }

    fn step(&self, input: &Tensor, state: LSTMState) -> Result<(Tensor, LSTMState)> {
        let next = self.inner.step(input, &state)?;
        Ok((next.h().clone(), next))
    }
}

/// Single-layer GRU; its output is the hidden state `h`.
#[derive(Debug, Clone)]
pub struct GruCell {
    inner: GRU,
    input_dim: usize,
    num_units: usize,
}

impl GruCell {
    pub fn new(input_dim: usize, num_units: usize, vb: VarBuilder) -> Result<Self> {
        let inner = gru(input_dim, num_units, GRUConfig::default(), vb)?;
        Ok(Self {
            inner,
            input_dim,
            num_units,
        })
    }

    pub fn zero_state(&self, batch: usize) -> Result<GRUState> {
        Ok(self.inner.zero_state(batch)?)
    }
}

impl RecurrentCell for GruCell {
    type State = GRUState;

    fn input_size(&self) -> usize {
        self.input_dim
    }

    fn output_size(&self) -> usize {
        self.num_units
    }

    fn step(&self, input: &Tensor, state: GRUState) -> Result<(Tensor, GRUState)> {
        let next = self.inner.step(input, &state)?;
        Ok((next.h().clone(), next))
    }
}

/// Either cell family, chosen at runtime from a [`CellConfig`].
#[derive(Debug, Clone)]
pub enum ConfiguredCell {
    Lstm(LstmCell),
    Gru(GruCell),
}

/// State of a [`ConfiguredCell`].
#[derive(Debug, Clone)]
pub enum ConfiguredState {
    Lstm(LSTMState),
    Gru(GRUState),
}

impl ConfiguredCell {
    pub fn from_config(config: &CellConfig, input_dim: usize, vb: VarBuilder) -> Result<Self> {
        Ok(match config.kind {
            CellKind::Lstm => Self::Lstm(LstmCell::new(input_dim, config.num_units, vb)?),
            CellKind::Gru => Self::Gru(GruCell::new(input_dim, config.num_units, vb)?),
        })
    }

    pub fn zero_state(&self, batch: usize) -> Result<ConfiguredState> {
        Ok(match self {
            Self::Lstm(cell) => ConfiguredState::Lstm(cell.zero_state(batch)?),
            Self::Gru(cell) => ConfiguredState::Gru(cell.zero_state(batch)?),
        })
    }
}

impl RecurrentCell for ConfiguredCell {
    type State = ConfiguredState;

    fn input_size(&self) -> usize {
        match self {
            Self::Lstm(cell) => cell.input_size(),
            Self::Gru(cell) => cell.input_size(),
        }
    }

    fn output_size(&self) -> usize {
        match self {
            Self::Lstm(cell) => cell.output_size(),
            Self::Gru(cell) => cell.output_size(),
        }
    }

    fn step(&self, input: &Tensor, state: ConfiguredState) -> Result<(Tensor, ConfiguredState)> {
        match (self, state) {
            (Self::Lstm(cell), ConfiguredState::Lstm(state)) => {
                let (output, state) = cell.step(input, state)?;
                Ok((output, ConfiguredState::Lstm(state)))
            }
            (Self::Gru(cell), ConfiguredState::Gru(state)) => {
                let (output, state) = cell.step(input, state)?;
                Ok((output, ConfiguredState::Gru(state)))
            }
            _ => Err(crate::errors::DecoderError::shape(
                "cell.state",
                "state family does not match the configured cell",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn configured_cells_step_with_their_own_state() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let input = Tensor::randn(0f32, 1.0, (2, 3), &device)?;

        for kind in [CellKind::Lstm, CellKind::Gru] {
            let config = CellConfig { kind, num_units: 5 };
            let cell = ConfiguredCell::from_config(&config, 3, vb.pp(format!("{kind:?}")))?;
            let state = cell.zero_state(2)?;
            let (output, _) = cell.step(&input, state)?;
            assert_eq!(output.dims(), &[2, 5]);
            assert_eq!(cell.output_size(), 5);
            assert_eq!(cell.input_size(), 3);
        }
        Ok(())
    }

    #[test]
    fn mismatched_state_family_is_rejected() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let lstm = ConfiguredCell::from_config(&CellConfig::default(), 3, vb.pp("lstm"))?;
        let gru_cell = GruCell::new(3, 128, vb.pp("gru"))?;
        let wrong = ConfiguredState::Gru(gru_cell.zero_state(1)?);
        let input = Tensor::zeros((1, 3), DType::F32, &device)?;
        assert!(lstm.step(&input, wrong).is_err());
        Ok(())
    }
}
