//! Dimension-wise binning of continuous values into discrete tokens.

use candle_core::{DType, Tensor, D};

use crate::config::{BinTokenizerConfig, BinType};
use crate::errors::Result;

/// Margin kept from the edges of the value range and of the probability
/// range used for normal quantiles.
pub const EPS: f64 = 1e-6;

/// Inverse CDF of the standard normal distribution (Acklam's rational
/// approximation, relative error below 1.2e-9).
pub fn normal_ppf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D_: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D_[0] * q + D_[1]) * q + D_[2]) * q + D_[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -normal_ppf(1.0 - p)
    }
}

fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    if count == 1 {
        return vec![start];
    }
    let step = (end - start) / (count - 1) as f64;
    (0..count).map(|i| start + step * i as f64).collect()
}

/// Maps each scalar to the index of the bin containing it.
#[derive(Debug, Clone)]
pub struct BinTokenizer {
    config: BinTokenizerConfig,
    thresholds: Vec<f32>,
}

impl BinTokenizer {
    pub fn new(config: BinTokenizerConfig) -> Result<Self> {
        config.validate()?;
        let edges = config.n_bins + 1;
        let thresholds = match config.bin_type {
            BinType::Uniform => linspace(config.low as f64, config.high as f64, edges),
            BinType::Normal => linspace(EPS, 1.0 - EPS, edges)
                .into_iter()
                .map(normal_ppf)
                .collect(),
        };
        Ok(Self {
            config,
            thresholds: thresholds.into_iter().map(|t| t as f32).collect(),
        })
    }

    pub fn config(&self) -> &BinTokenizerConfig {
        &self.config
    }

    pub fn n_bins(&self) -> usize {
        self.config.n_bins
    }

    /// Bin edges, `n_bins + 1` ascending values.
    pub fn thresholds(&self) -> &[f32] {
        &self.thresholds
    }

    /// Bin centres, one per bin.
    pub fn centres(&self) -> Vec<f32> {
        self.thresholds
            .windows(2)
            .map(|pair| (pair[0] + pair[1]) / 2.0)
            .collect()
    }

    /// Encodes values of any shape into `u32` bin indices of the same shape.
    /// Uniform bins clip into the range first; values that fall in no bin
    /// become index 0.
    pub fn encode(&self, inputs: &Tensor) -> Result<Tensor> {
        let device = inputs.device();
        let mut values = inputs.to_dtype(DType::F32)?;
        if self.config.bin_type == BinType::Uniform {
            let low = (self.config.low as f64 + EPS) as f32;
            let high = (self.config.high as f64 - EPS) as f32;
            values = values.clamp(low, high)?;
        }
        let n = self.config.n_bins;
        let lower = Tensor::from_slice(&self.thresholds[..n], n, device)?;
        let upper = Tensor::from_slice(&self.thresholds[1..], n, device)?;

        let values = values.unsqueeze(D::Minus1)?;
        let above_lower = values.broadcast_ge(&lower)?;
        let below_upper = values.broadcast_lt(&upper)?;
        let one_hot = above_lower.mul(&below_upper)?;
        Ok(one_hot.argmax(D::Minus1)?)
    }

    /// Maps bin indices back to bin centres. Indices outside `[0, n_bins)`
    /// decode to zero.
    pub fn decode(&self, tokens: &Tensor) -> Result<Tensor> {
        let centres = self.centres();
        let ids = tokens.to_dtype(DType::I64)?.flatten_all()?.to_vec1::<i64>()?;
        let values: Vec<f32> = ids
            .into_iter()
            .map(|id| {
                usize::try_from(id)
                    .ok()
                    .and_then(|id| centres.get(id).copied())
                    .unwrap_or(0.0)
            })
            .collect();
        Ok(Tensor::from_vec(values, tokens.shape(), tokens.device())?)
    }
}
