use super::*;
use candle_core::{DType, Device, Result};

#[test]
fn lengths_mask_trailing_positions() -> Result<()> {
    let device = Device::Cpu;
    let mask = padding_mask_from_lengths(&device, &[2, 4, 9], 4)?;
    assert_eq!(mask.dims(), &[3, 4]);
    assert_eq!(mask.dtype(), DType::F32);

    let rows = mask.to_vec2::<f32>()?;
    assert_eq!(rows[0][..2], [0.0, 0.0]);
    assert!(rows[0][2..].iter().all(|v| *v == f32::NEG_INFINITY));
    assert!(rows[1].iter().all(|v| *v == 0.0));
    // Lengths past the source width are clamped.
    assert!(rows[2].iter().all(|v| *v == 0.0));
    Ok(())
}

#[test]
fn zero_length_is_rejected() {
    let device = Device::Cpu;
    assert!(padding_mask_from_lengths(&device, &[3, 0], 3).is_err());
}
