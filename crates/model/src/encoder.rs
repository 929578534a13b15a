//! Sequence encoders run over the assembled token sequence.

use attention::dropout::DropoutStream;
use candle_core::Tensor;
use candle_nn::{LayerNorm, Module, VarBuilder};

use crate::block::{dropout, EncoderBlock, LAYER_NORM_EPS};
use crate::config::BlockTransformerConfig;
use crate::errors::Result;

/// Whether a forward pass is deterministic or applies dropout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardMode {
    #[default]
    Eval,
    /// Dropout enabled; every random draw derives from `seed`.
    Train { seed: u64 },
}

/// Encodes `[batch, T, embed]` tokens under a `[batch, heads, T, T]` boolean
/// mask. `dropout` is present only in training and carries one key per
/// sequence position.
pub trait SequenceEncoder: Send + Sync {
    fn encode(&self, tokens: &Tensor, mask: &Tensor, dropout: Option<&DropoutStream>) -> Result<Tensor>;
}

/// Stack of pre-norm encoder blocks followed by a final layer norm. No
/// positional embedding is added; positions are carried by the tokens.
#[derive(Debug)]
pub struct Transformer {
    blocks: Vec<EncoderBlock>,
    final_norm: LayerNorm,
    dropout_rate: f32,
}

impl Transformer {
    pub fn new(config: &BlockTransformerConfig, embed_dim: usize, vb: VarBuilder) -> Result<Self> {
        config.validate_width(embed_dim)?;
        let blocks = (0..config.num_layers)
            .map(|i| EncoderBlock::new(config, embed_dim, vb.pp(format!("encoderblock_{i}"))))
            .collect::<Result<Vec<_>>>()?;
        log::debug!(
            "transformer: {} layers, width {embed_dim}, {} heads",
            config.num_layers,
            config.num_attention_heads
        );
        Ok(Self {
            blocks,
            final_norm: candle_nn::layer_norm(embed_dim, LAYER_NORM_EPS, vb.pp("encoder_norm"))?,
            dropout_rate: config.dropout_rate,
        })
    }

    pub fn num_layers(&self) -> usize {
        self.blocks.len()
    }
}

impl SequenceEncoder for Transformer {
    fn encode(&self, tokens: &Tensor, mask: &Tensor, stream: Option<&DropoutStream>) -> Result<Tensor> {
        let mut xs = dropout(tokens.clone(), stream, 0, self.dropout_rate)?;
        for (layer, block) in self.blocks.iter().enumerate() {
            let layer_stream = stream.map(|s| s.fork(layer as u64 + 1));
            xs = block.forward(&xs, mask, layer_stream.as_ref())?;
        }
        Ok(self.final_norm.forward(&xs)?)
    }
}
