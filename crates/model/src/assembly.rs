//! Flattening token groups into one sequence and splitting it back.

use candle_core::Tensor;

use crate::errors::{BlockTransformerError, Result};
use crate::groups::{PrefixGroup, TimestepGroup};
use crate::layout::TokenLayout;

/// Splits `tensor` along `dim` into consecutive chunks of `counts` elements.
pub fn split_tokens(tensor: &Tensor, counts: &[usize], dim: usize) -> Result<Vec<Tensor>> {
    let available = tensor.dim(dim)?;
    let requested: usize = counts.iter().sum();
    if requested != available {
        return Err(BlockTransformerError::precondition(format!(
            "cannot split {available} tokens into chunks of {counts:?}"
        )));
    }
    let mut start = 0;
    let mut chunks = Vec::with_capacity(counts.len());
    for &count in counts {
        chunks.push(tensor.narrow(dim, start, count)?);
        start += count;
    }
    Ok(chunks)
}

/// Concatenates all groups into a `[batch, T, embed]` sequence: prefix
/// tokens in group order, then each timestep's groups in order.
pub fn assemble_input_tokens(
    layout: &TokenLayout,
    prefix_groups: &[PrefixGroup],
    timestep_groups: &[TimestepGroup],
) -> Result<Tensor> {
    let mut parts = Vec::with_capacity(2);
    if !prefix_groups.is_empty() {
        let prefix: Vec<&Tensor> = prefix_groups.iter().map(PrefixGroup::tokens).collect();
        parts.push(Tensor::cat(&prefix, 1)?);
    }
    // [b, horizon, tokens_per_step, d] flattened horizon-major
    let steps: Vec<&Tensor> = timestep_groups.iter().map(TimestepGroup::tokens).collect();
    let steps = Tensor::cat(&steps, 2)?.reshape((
        layout.batch,
        layout.horizon * layout.tokens_per_step(),
        layout.embed_dim,
    ))?;
    parts.push(steps);
    Ok(Tensor::cat(&parts, 1)?)
}

/// Inverse of [`assemble_input_tokens`] for the encoder output. Each returned
/// group keeps its name and `attends_to`; only the embedding width may change.
pub fn disassemble_output(
    layout: &TokenLayout,
    prefix_groups: &[PrefixGroup],
    timestep_groups: &[TimestepGroup],
    output: &Tensor,
) -> Result<(Vec<PrefixGroup>, Vec<TimestepGroup>)> {
    let (batch, total, width) = output.dims3()?;
    if batch != layout.batch || total != layout.total_tokens() {
        return Err(BlockTransformerError::precondition(format!(
            "encoder output {:?} does not match layout of {} x {} tokens",
            output.dims(),
            layout.batch,
            layout.total_tokens()
        )));
    }
    let prefix_len = layout.tokens_for_prefix();
    let prefix_tokens = output.narrow(1, 0, prefix_len)?;
    let step_tokens = output
        .narrow(1, prefix_len, total - prefix_len)?
        .reshape((batch, layout.horizon, layout.tokens_per_step(), width))?;

    let prefix_out = split_tokens(&prefix_tokens, &layout.tokens_per_prefix_group, 1)?
        .into_iter()
        .zip(prefix_groups)
        .map(|(tokens, group)| Ok(group.with_tokens(tokens)?))
        .collect::<Result<Vec<_>>>()?;
    let timestep_out = split_tokens(&step_tokens, &layout.tokens_per_timestep_group, 2)?
        .into_iter()
        .zip(timestep_groups)
        .map(|(tokens, group)| Ok(group.with_tokens(tokens)?))
        .collect::<Result<Vec<_>>>()?;
    Ok((prefix_out, timestep_out))
}
