//! Builders for padding masks used to drop padded encoder positions.

use candle_core::{Device, Error, Result, Tensor};

/// Construct padding masks from per-example valid source lengths.
///
/// Lengths larger than `k_len` are clamped; a zero length is rejected because
/// the softmax over a fully masked row is undefined.
pub fn padding_mask_from_lengths(device: &Device, lengths: &[usize], k_len: usize) -> Result<Tensor> {
    let batch = lengths.len();
    let mut data = vec![0f32; batch * k_len];

    for (b, &valid) in lengths.iter().enumerate() {
        if valid == 0 && k_len > 0 {
            return Err(Error::Msg(format!(
                "padding mask: example {b} has zero valid positions"
            )));
        }
        let row = &mut data[b * k_len..(b + 1) * k_len];
        for value in row.iter_mut().skip(valid.min(k_len)) {
            *value = f32::NEG_INFINITY;
        }
    }

    Tensor::from_vec(data, (batch, k_len), device)
}
