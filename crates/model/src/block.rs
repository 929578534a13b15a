use std::fmt;

use attention::core::{Attention, Config as AttentionConfig};
use attention::dropout::DropoutStream;
use attention::reference::ExactAttention;
use candle_core::Tensor;
use candle_nn::{LayerNorm, Linear, Module, VarBuilder};

use crate::config::BlockTransformerConfig;
use crate::errors::Result;

pub(crate) const LAYER_NORM_EPS: f64 = 1e-6;

// Dropout sites within a block.
const SITE_ATTENTION_WEIGHTS: u64 = 0;
const SITE_ATTENTION_OUT: u64 = 1;
const SITE_MLP_HIDDEN: u64 = 2;
const SITE_MLP_OUT: u64 = 3;

/// Token-keyed dropout, a no-op outside training or at rate zero.
pub(crate) fn dropout(xs: Tensor, stream: Option<&DropoutStream>, site: u64, p: f32) -> Result<Tensor> {
    match stream {
        Some(stream) if p > 0.0 => Ok(stream.fork(site).apply_tokens(&xs, p)?),
        _ => Ok(xs),
    }
}

/// Dense → GELU → dropout → dense → dropout.
#[derive(Debug)]
pub struct MlpBlock {
    dense_in: Linear,
    dense_out: Linear,
    dropout_rate: f32,
}

impl MlpBlock {
    pub fn new(embed_dim: usize, mlp_dim: usize, dropout_rate: f32, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            dense_in: candle_nn::linear(embed_dim, mlp_dim, vb.pp("dense_in"))?,
            dense_out: candle_nn::linear(mlp_dim, embed_dim, vb.pp("dense_out"))?,
            dropout_rate,
        })
    }

    pub fn forward(&self, xs: &Tensor, stream: Option<&DropoutStream>) -> Result<Tensor> {
        let hidden = self.dense_in.forward(xs)?.gelu()?;
        let hidden = dropout(hidden, stream, SITE_MLP_HIDDEN, self.dropout_rate)?;
        let out = self.dense_out.forward(&hidden)?;
        dropout(out, stream, SITE_MLP_OUT, self.dropout_rate)
    }
}

/// Pre-norm encoder block: self-attention and MLP, each wrapped in a
/// residual connection.
pub struct EncoderBlock {
    embed_dim: usize,
    num_heads: usize,
    head_dim: usize,
    norm_attn: LayerNorm,
    query: Linear,
    key: Linear,
    value: Linear,
    out_proj: Linear,
    norm_mlp: LayerNorm,
    mlp: MlpBlock,
    attention: ExactAttention,
    attention_config: AttentionConfig,
    dropout_rate: f32,
}

impl fmt::Debug for EncoderBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderBlock")
            .field("embed_dim", &self.embed_dim)
            .field("num_heads", &self.num_heads)
            .field("head_dim", &self.head_dim)
            .field("dropout_rate", &self.dropout_rate)
            .finish()
    }
}

impl EncoderBlock {
    pub fn new(config: &BlockTransformerConfig, embed_dim: usize, vb: VarBuilder) -> Result<Self> {
        config.validate_width(embed_dim)?;
        let attn = vb.pp("attention");
        Ok(Self {
            embed_dim,
            num_heads: config.num_attention_heads,
            head_dim: config.head_dim(embed_dim),
            norm_attn: candle_nn::layer_norm(embed_dim, LAYER_NORM_EPS, vb.pp("norm_attn"))?,
            query: candle_nn::linear(embed_dim, embed_dim, attn.pp("query"))?,
            key: candle_nn::linear(embed_dim, embed_dim, attn.pp("key"))?,
            value: candle_nn::linear(embed_dim, embed_dim, attn.pp("value"))?,
            out_proj: candle_nn::linear(embed_dim, embed_dim, attn.pp("out"))?,
            norm_mlp: candle_nn::layer_norm(embed_dim, LAYER_NORM_EPS, vb.pp("norm_mlp"))?,
            mlp: MlpBlock::new(embed_dim, config.mlp_dim, config.dropout_rate, vb.pp("mlp"))?,
            attention: ExactAttention::new(),
            attention_config: AttentionConfig::with_dropout(config.attention_dropout_rate),
            dropout_rate: config.dropout_rate,
        })
    }

    /// `[b, T, d]` to `[b, heads, T, head_dim]`.
    fn split_heads(&self, xs: &Tensor) -> Result<Tensor> {
        let (batch, seq, _) = xs.dims3()?;
        Ok(xs
            .reshape((batch, seq, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    fn merge_heads(&self, xs: &Tensor) -> Result<Tensor> {
        let (batch, _, seq, _) = xs.dims4()?;
        Ok(xs.transpose(1, 2)?.reshape((batch, seq, self.embed_dim))?)
    }

    pub fn forward(&self, xs: &Tensor, mask: &Tensor, stream: Option<&DropoutStream>) -> Result<Tensor> {
        let normed = self.norm_attn.forward(xs)?;
        let q = self.split_heads(&self.query.forward(&normed)?)?;
        let k = self.split_heads(&self.key.forward(&normed)?)?;
        let v = self.split_heads(&self.value.forward(&normed)?)?;

        let weights_stream = stream.map(|s| s.fork(SITE_ATTENTION_WEIGHTS));
        let attended = self.attention.attend(
            &q,
            &k,
            &v,
            Some(mask),
            weights_stream.as_ref(),
            &self.attention_config,
        )?;
        let attended = self.out_proj.forward(&self.merge_heads(&attended)?)?;
        let attended = dropout(attended, stream, SITE_ATTENTION_OUT, self.dropout_rate)?;
        let xs = (xs + attended)?;

        let normed = self.norm_mlp.forward(&xs)?;
        let mlp_out = self.mlp.forward(&normed, stream)?;
        Ok((xs + mlp_out)?)
    }
}
