use attention::dropout::DropoutStream;
use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::assembly::{assemble_input_tokens, disassemble_output};
use crate::config::BlockTransformerConfig;
use crate::encoder::{ForwardMode, SequenceEncoder, Transformer};
use crate::errors::Result;
use crate::groups::{PrefixGroup, TimestepGroup};
use crate::layout::TokenLayout;
use crate::masks::generate_attention_mask;

/// Runs a transformer over prefix and timestep token groups under the
/// attention policy each group declares.
pub struct BlockTransformer {
    config: BlockTransformerConfig,
    encoder: Box<dyn SequenceEncoder>,
}

impl BlockTransformer {
    /// Builds the default [`Transformer`] encoder for `embed_dim`-wide tokens.
    pub fn new(config: BlockTransformerConfig, embed_dim: usize, vb: VarBuilder) -> Result<Self> {
        let encoder = Transformer::new(&config, embed_dim, vb.pp("transformer"))?;
        Ok(Self {
            config,
            encoder: Box::new(encoder),
        })
    }

    /// Wraps an arbitrary encoder. Masks are built with
    /// `config.num_attention_heads` heads.
    pub fn with_encoder(config: BlockTransformerConfig, encoder: Box<dyn SequenceEncoder>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, encoder })
    }

    pub fn config(&self) -> &BlockTransformerConfig {
        &self.config
    }

    /// Encodes all groups jointly and returns them in input order with
    /// their tokens replaced by the encoder outputs.
    pub fn forward(
        &self,
        prefix_groups: &[PrefixGroup],
        timestep_groups: &[TimestepGroup],
        pad_mask: &Tensor,
        mode: ForwardMode,
    ) -> Result<(Vec<PrefixGroup>, Vec<TimestepGroup>)> {
        let layout = TokenLayout::new(prefix_groups, timestep_groups, pad_mask)?;

        for group in prefix_groups {
            log::debug!(
                "prefix group {}: {:?} attends to {:?}",
                group.name(),
                group.tokens().dims(),
                group.attends_to()
            );
        }
        for group in timestep_groups {
            log::debug!(
                "timestep group {}: {:?} attends to {:?}",
                group.name(),
                group.tokens().dims(),
                group.attends_to()
            );
        }

        let mask = generate_attention_mask(
            &layout,
            prefix_groups,
            timestep_groups,
            pad_mask,
            self.config.num_attention_heads,
        )?;
        let tokens = assemble_input_tokens(&layout, prefix_groups, timestep_groups)?;

        let stream = match mode {
            ForwardMode::Eval => None,
            ForwardMode::Train { seed } => Some(DropoutStream::new(
                seed,
                layout.token_keys(prefix_groups, timestep_groups),
            )),
        };
        let output = self.encoder.encode(&tokens, &mask, stream.as_ref())?;

        disassemble_output(&layout, prefix_groups, timestep_groups, &output)
    }
}
