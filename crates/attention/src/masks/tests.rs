use super::*;
use candle_core::{DType, Device, Result};

fn idx(
    b: usize,
    h: usize,
    q: usize,
    k: usize,
    num_heads: usize,
    q_len: usize,
    k_len: usize,
) -> usize {
    ((((b * num_heads) + h) * q_len) + q) * k_len + k
}

#[test]
fn key_padding_hides_invalid_keys_for_every_query() -> Result<()> {
    let device = Device::Cpu;
    let valid = Tensor::from_vec(vec![1u8, 0, 1, 0, 0, 1], (2, 3), &device)?;
    let num_heads = 2;
    let q_len = 4;
    let k_len = 3;

    let mask = key_padding_mask(&valid, num_heads, q_len)?;
    assert_eq!(mask.dims(), &[2, num_heads, q_len, k_len]);
    assert_eq!(mask.dtype(), MASK_DTYPE);

    let values = mask.flatten_all()?.to_vec1::<u8>()?;
    // Batch 0: key 1 hidden from every head and query.
    for h in 0..num_heads {
        for q in 0..q_len {
            assert_eq!(values[idx(0, h, q, 0, num_heads, q_len, k_len)], 1);
            assert_eq!(values[idx(0, h, q, 1, num_heads, q_len, k_len)], 0);
            assert_eq!(values[idx(0, h, q, 2, num_heads, q_len, k_len)], 1);
        }
    }
    // Batch 1: only the final key remains.
    assert_eq!(values[idx(1, 1, 3, 0, num_heads, q_len, k_len)], 0);
    assert_eq!(values[idx(1, 0, 0, 2, num_heads, q_len, k_len)], 1);
    Ok(())
}

#[test]
fn key_padding_accepts_float_flags() -> Result<()> {
    let device = Device::Cpu;
    let valid = Tensor::from_vec(vec![1f32, 0.0], (1, 2), &device)?;
    assert_eq!(valid.dtype(), DType::F32);
    let mask = key_padding_mask(&valid, 1, 1)?;
    assert_eq!(mask.flatten_all()?.to_vec1::<u8>()?, vec![1, 0]);
    Ok(())
}

#[test]
fn mask_and_broadcasts_over_batch_and_heads() -> Result<()> {
    let device = Device::Cpu;
    // [1, 1, 2, 2] lower triangle.
    let structure = Tensor::from_vec(vec![1u8, 0, 1, 1], (1, 1, 2, 2), &device)?;
    // [2, 1, 1, 2] key validity.
    let keys = Tensor::from_vec(vec![1u8, 1, 0, 1], (2, 1, 1, 2), &device)?;

    let combined = mask_and(&structure, &keys)?;
    assert_eq!(combined.dims(), &[2, 1, 2, 2]);
    assert_eq!(
        combined.flatten_all()?.to_vec1::<u8>()?,
        vec![1, 0, 1, 1, 0, 0, 0, 1]
    );
    Ok(())
}

#[test]
fn broadcast_to_heads_repeats_rows() -> Result<()> {
    let device = Device::Cpu;
    let mask = Tensor::from_vec(vec![1u8, 0, 0, 1], (1, 1, 2, 2), &device)?;
    let expanded = broadcast_to_heads(&mask, 3)?;
    assert_eq!(expanded.dims(), &[1, 3, 2, 2]);
    assert!(expanded.is_contiguous());
    let values = expanded.flatten_all()?.to_vec1::<u8>()?;
    assert_eq!(values, [1, 0, 0, 1].repeat(3));
    Ok(())
}
