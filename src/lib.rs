//! Generalist robot policy building blocks.
//!
//! Modality tokenizers turn observations and tasks into token groups, the
//! block transformer mixes those groups under a structured attention mask,
//! and `oxe_data` resolves the dataset mixtures a policy is trained on.

pub use attention;
pub use model;
pub use model::*;
pub use oxe_data;
pub use tokenizer;

use anyhow::Result;
use candle_core::Device;

/// Picks the first usable backend: Metal (with the `metal` feature), then
/// CUDA, then CPU. `CANDLE_FORCE_CPU` skips accelerators.
pub fn setup_device() -> Result<Device> {
    if std::env::var("CANDLE_FORCE_CPU").is_ok() {
        log::info!("CANDLE_FORCE_CPU set, using CPU backend");
        return Ok(Device::Cpu);
    }
    #[cfg(feature = "metal")]
    {
        use std::panic::AssertUnwindSafe;

        let metal_device = std::panic::catch_unwind(AssertUnwindSafe(|| Device::new_metal(0)));
        if let Ok(Ok(device)) = metal_device {
            if metal_preflight(&device).is_ok() {
                log::info!("Metal device selected: {:?}", device);
                return Ok(device);
            }
            log::warn!("Metal device detected but preflight failed, falling back");
        } else {
            log::debug!("Metal unavailable, falling back");
        }
    }

    match Device::cuda_if_available(0) {
        Ok(device) if device.is_cuda() => {
            log::info!("CUDA device selected: {:?}", device);
            Ok(device)
        }
        Ok(_) | Err(_) => {
            log::info!("using CPU backend");
            Ok(Device::Cpu)
        }
    }
}

/// Runs the operations a block transformer forward pass relies on, so a
/// broken backend fails here instead of mid-rollout.
#[cfg(feature = "metal")]
fn metal_preflight(device: &Device) -> Result<()> {
    use candle_core::{DType, Tensor};

    let x = Tensor::randn(0.0f32, 1.0f32, (2, 4, 8), device)?;
    let scores = x.matmul(&x.transpose(1, 2)?)?;
    let _ = candle_nn::ops::softmax_last_dim(&scores)?;

    let mask = Tensor::ones((2, 4, 4), DType::U8, device)?;
    let filler = Tensor::full(f32::MIN, (2, 4, 4), device)?;
    let _ = mask.where_cond(&scores, &filler)?;
    Ok(())
}
