use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use decoder::{
    dynamic_decode, finished_tensor, Decoder, DecoderError, FieldSpec, Initialized, OutputSpec,
    StepOutput, StepResult,
};

/// Emits `time + 1` for every example and replays scripted finished flags.
struct Scripted {
    flags: Vec<Vec<bool>>,
    max_decode_length: usize,
    width: usize,
}

struct Counter {
    values: Tensor,
    ids: Tensor,
}

impl StepOutput for Counter {
    fn fields(&self) -> Vec<(&'static str, &Tensor)> {
        vec![("values", &self.values), ("predicted_ids", &self.ids)]
    }

    fn predicted_ids(&self) -> &Tensor {
        &self.ids
    }

    fn from_fields(fields: Vec<Tensor>) -> decoder::Result<Self> {
        let [values, ids]: [Tensor; 2] = fields
            .try_into()
            .map_err(|_| DecoderError::Config(vec!["counter expects two fields".into()]))?;
        Ok(Self { values, ids })
    }
}

impl Decoder for Scripted {
    type Output = Counter;
    type State = usize;

    fn batch_size(&self) -> usize {
        self.flags[0].len()
    }

    fn max_decode_length(&self) -> usize {
        self.max_decode_length
    }

    fn output_spec(&self) -> OutputSpec {
        OutputSpec::new(vec![
            FieldSpec::new("values", vec![self.width], DType::F32),
            FieldSpec::new("predicted_ids", vec![], DType::U32),
        ])
    }

    fn initialize(&self) -> decoder::Result<Initialized<usize>> {
        let device = Device::Cpu;
        Ok(Initialized {
            finished: finished_tensor(&self.flags[0], &device)?,
            inputs: Tensor::zeros(self.batch_size(), DType::F32, &device)?,
            state: 0,
        })
    }

    fn step(
        &self,
        time: usize,
        inputs: &Tensor,
        state: usize,
    ) -> decoder::Result<StepResult<Counter, usize>> {
        let device = Device::Cpu;
        let batch = self.batch_size();
        let values = Tensor::full((time + 1) as f32, (batch, self.width), &device)?;
        let ids = Tensor::full(time as u32, batch, &device)?;
        let flags = self
            .flags
            .get(time + 1)
            .cloned()
            .unwrap_or_else(|| vec![false; batch]);
        Ok(StepResult {
            outputs: Counter { values, ids },
            state: state + 1,
            next_inputs: inputs.clone(),
            finished: finished_tensor(&flags, &device)?,
        })
    }
}

#[test]
fn finished_flags_are_sticky_and_rows_are_zeroed() -> Result<()> {
    let decoder = Scripted {
        flags: vec![
            vec![false, false, false],
            vec![true, false, false],
            vec![false, false, true],
            vec![false, true, false],
        ],
        max_decode_length: 10,
        width: 2,
    };

    let result = dynamic_decode(&decoder)?;

    assert_eq!(result.final_state, 3);
    assert_eq!(result.sequence_lengths, vec![1, 3, 2]);
    assert_eq!(result.steps(), 3);
    let firsts: Vec<Vec<f32>> = result
        .outputs
        .values
        .narrow(2, 0, 1)?
        .squeeze(2)?
        .to_vec2::<f32>()?;
    assert_eq!(
        firsts,
        vec![
            vec![1.0, 1.0, 1.0],
            vec![0.0, 2.0, 2.0],
            vec![0.0, 3.0, 0.0],
        ]
    );
    Ok(())
}

#[test]
fn max_decode_length_bounds_the_loop() -> Result<()> {
    let decoder = Scripted {
        flags: vec![vec![false, false]],
        max_decode_length: 4,
        width: 1,
    };

    let result = dynamic_decode(&decoder)?;

    assert_eq!(result.final_state, 4);
    assert_eq!(result.sequence_lengths, vec![4, 4]);
    assert_eq!(result.outputs.values.dims(), &[4, 2, 1]);
    assert_eq!(
        result.outputs.ids.to_vec2::<u32>()?,
        vec![vec![0, 0], vec![1, 1], vec![2, 2], vec![3, 3]]
    );
    Ok(())
}

#[test]
fn steps_that_break_the_output_spec_fail() -> Result<()> {
    struct Misreported(Scripted);

    impl Decoder for Misreported {
        type Output = Counter;
        type State = usize;

        fn batch_size(&self) -> usize {
            self.0.batch_size()
        }

        fn max_decode_length(&self) -> usize {
            self.0.max_decode_length()
        }

        fn output_spec(&self) -> OutputSpec {
            OutputSpec::new(vec![
                FieldSpec::new("values", vec![self.0.width + 1], DType::F32),
                FieldSpec::new("predicted_ids", vec![], DType::U32),
            ])
        }

        fn initialize(&self) -> decoder::Result<Initialized<usize>> {
            self.0.initialize()
        }

        fn step(
            &self,
            time: usize,
            inputs: &Tensor,
            state: usize,
        ) -> decoder::Result<StepResult<Counter, usize>> {
            self.0.step(time, inputs, state)
        }
    }

    let decoder = Misreported(Scripted {
        flags: vec![vec![false]],
        max_decode_length: 2,
        width: 3,
    });

    assert!(matches!(
        dynamic_decode(&decoder),
        Err(DecoderError::Shape { .. })
    ));
    Ok(())
}

#[test]
fn everything_finished_up_front_is_an_empty_decode() -> Result<()> {
    let decoder = Scripted {
        flags: vec![vec![true, true]],
        max_decode_length: 5,
        width: 1,
    };

    assert!(matches!(
        dynamic_decode(&decoder),
        Err(DecoderError::EmptyDecode)
    ));
    Ok(())
}
