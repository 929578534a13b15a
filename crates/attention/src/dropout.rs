//! Dropout keyed by token identity.
//!
//! Positional dropout ties each random draw to a flat index in the sequence,
//! so inserting tokens anywhere shifts the masks of every later token. The
//! [`DropoutStream`] instead derives each keep/drop decision from a hash of
//! `(seed, site, batch index, token key, feature)`, where the token key is a
//! caller-provided identity for every sequence position. Two calls that share
//! a seed and contain the same token see the same dropout decisions for it,
//! regardless of what else is in the sequence.

use std::sync::Arc;

use candle_core::{Device, Result, Tensor};

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// SplitMix64 finaliser.
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(GOLDEN_GAMMA);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

fn combine(state: u64, value: u64) -> u64 {
    splitmix64(state ^ value.wrapping_mul(GOLDEN_GAMMA))
}

/// Maps a hash to a uniform sample in `[0, 1)` using its top 24 bits.
fn unit_interval(hash: u64) -> f32 {
    (hash >> 40) as f32 / (1u64 << 24) as f32
}

/// Deterministic dropout randomness addressed by token identity.
#[derive(Debug, Clone)]
pub struct DropoutStream {
    seed: u64,
    token_keys: Arc<[u64]>,
}

impl DropoutStream {
    /// Creates a stream for a sequence whose positions carry `token_keys`.
    pub fn new(seed: u64, token_keys: impl Into<Arc<[u64]>>) -> Self {
        Self {
            seed,
            token_keys: token_keys.into(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn token_keys(&self) -> &[u64] {
        &self.token_keys
    }

    pub fn seq_len(&self) -> usize {
        self.token_keys.len()
    }

    /// Derives an independent stream for a distinct dropout site (layer,
    /// residual branch, attention weights, ...). Token keys are shared.
    pub fn fork(&self, site: u64) -> Self {
        Self {
            seed: combine(self.seed, splitmix64(site)),
            token_keys: Arc::clone(&self.token_keys),
        }
    }

    /// Scaled keep mask for per-token activations, shaped
    /// `[batch, seq_len, hidden]`. Kept entries hold `1 / (1 - p)`.
    pub fn token_keep_mask(
        &self,
        batch: usize,
        hidden: usize,
        p: f32,
        device: &Device,
    ) -> Result<Tensor> {
        let seq = self.seq_len();
        let keep = 1.0 - p;
        let scale = 1.0 / keep;
        let mut data = Vec::with_capacity(batch * seq * hidden);
        for b in 0..batch {
            let batch_state = combine(self.seed, b as u64);
            for &key in self.token_keys.iter() {
                let token_state = combine(batch_state, key);
                for d in 0..hidden {
                    let sample = unit_interval(combine(token_state, d as u64));
                    data.push(if sample < keep { scale } else { 0.0 });
                }
            }
        }
        Tensor::from_vec(data, (batch, seq, hidden), device)
    }

    /// Scaled keep mask for attention weights, shaped
    /// `[batch, heads, seq_len, seq_len]`, addressed by the (query, key)
    /// token pair.
    pub fn pair_keep_mask(
        &self,
        batch: usize,
        heads: usize,
        p: f32,
        device: &Device,
    ) -> Result<Tensor> {
        let seq = self.seq_len();
        let keep = 1.0 - p;
        let scale = 1.0 / keep;
        let mut data = Vec::with_capacity(batch * heads * seq * seq);
        for b in 0..batch {
            let batch_state = combine(self.seed, b as u64);
            for h in 0..heads {
                let head_state = combine(batch_state, h as u64);
                for &query in self.token_keys.iter() {
                    let query_state = combine(head_state, query);
                    for &key in self.token_keys.iter() {
                        let sample = unit_interval(combine(query_state, key));
                        data.push(if sample < keep { scale } else { 0.0 });
                    }
                }
            }
        }
        Tensor::from_vec(data, (batch, heads, seq, seq), device)
    }

    /// Applies per-token dropout to a `[batch, seq_len, hidden]` tensor.
    pub fn apply_tokens(&self, xs: &Tensor, p: f32) -> Result<Tensor> {
        if p <= 0.0 {
            return Ok(xs.clone());
        }
        let (batch, seq, hidden) = xs.dims3()?;
        if seq != self.seq_len() {
            candle_core::bail!(
                "dropout stream covers {} tokens but input has {seq}",
                self.seq_len()
            );
        }
        let mask = self
            .token_keep_mask(batch, hidden, p, xs.device())?
            .to_dtype(xs.dtype())?;
        xs.mul(&mask)
    }
}
