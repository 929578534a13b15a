//! Attention mask construction for block-structured token sequences.
//!
//! Query `i` may read key `j` when both of these hold:
//!
//! * `j`'s group is `i`'s own group or named in `i`'s `attends_to`, and
//! * `timestep(i) >= timestep(j)`, where prefix tokens sit before step 0,
//!
//! and additionally key `j` is valid: prefix keys always are, timestep keys
//! are valid when the pad mask marks their step as present.
//!
//! [`generate_attention_mask`] builds the mask with tensor ops from small
//! per-position lookup tables. [`reference_attention_mask`] evaluates the
//! rule one pair at a time and is kept as the oracle for tests and benches.

use std::collections::BTreeMap;

use attention::masks::{key_padding_mask, mask_and, MASK_DTYPE};
use candle_core::{DType, Device, Tensor};

use crate::errors::{BlockTransformerError, Result};
use crate::groups::{AttendsTo, PrefixGroup, TimestepGroup};
use crate::layout::{GroupSlot, TokenLayout, TokenMetadata};

/// Builds a `[batch, horizon]` pad mask from per-step validity flags.
pub fn timestep_pad_mask(valid: &[Vec<bool>], device: &Device) -> Result<Tensor> {
    let horizon = valid.first().map(Vec::len).unwrap_or(0);
    if let Some(row) = valid.iter().position(|row| row.len() != horizon) {
        return Err(BlockTransformerError::precondition(format!(
            "pad mask row {row} has {} steps, expected {horizon}",
            valid[row].len()
        )));
    }
    let flags: Vec<u8> = valid.iter().flatten().map(|&v| u8::from(v)).collect();
    Ok(Tensor::from_vec(flags, (valid.len(), horizon), device)?)
}

/// Describes flat position `position`; `None` past the end of the sequence.
pub fn token_metadata<'g>(
    layout: &TokenLayout,
    prefix_groups: &'g [PrefixGroup],
    timestep_groups: &'g [TimestepGroup],
    position: usize,
) -> Option<TokenMetadata<'g>> {
    layout.metadata(prefix_groups, timestep_groups, position)
}

/// Per-position lookup tables for the vectorised builder.
struct PositionTables {
    /// Index of the owning group, prefix groups first.
    slots: Vec<u32>,
    /// Index of the owning group's name among the distinct names.
    names: Vec<u32>,
    /// Timestep with `-1` for prefix tokens.
    steps: Vec<i64>,
    /// `[num_slots, num_names]` group-level visibility, row-major.
    visibility: Vec<u8>,
    num_slots: usize,
    num_names: usize,
}

impl PositionTables {
    fn build(
        layout: &TokenLayout,
        prefix_groups: &[PrefixGroup],
        timestep_groups: &[TimestepGroup],
    ) -> Self {
        let group_names: Vec<(&str, &AttendsTo)> = prefix_groups
            .iter()
            .map(|g| (g.name(), g.attends_to()))
            .chain(timestep_groups.iter().map(|g| (g.name(), g.attends_to())))
            .collect();

        let mut name_ids = BTreeMap::new();
        for (name, _) in &group_names {
            let next = name_ids.len() as u32;
            name_ids.entry(*name).or_insert(next);
        }
        let num_slots = group_names.len();
        let num_names = name_ids.len();

        let mut visibility = vec![0u8; num_slots * num_names];
        for (slot, (own, attends_to)) in group_names.iter().enumerate() {
            for (name, &id) in &name_ids {
                if name == own || attends_to.contains(*name) {
                    visibility[slot * num_names + id as usize] = 1;
                }
            }
        }

        let total = layout.total_tokens();
        let mut slots = Vec::with_capacity(total);
        let mut names = Vec::with_capacity(total);
        let mut steps = Vec::with_capacity(total);
        for position in 0..total {
            let Some(located) = layout.locate(position) else {
                break;
            };
            let slot = match located.slot {
                GroupSlot::Prefix(g) => g,
                GroupSlot::Timestep(g) => prefix_groups.len() + g,
            };
            slots.push(slot as u32);
            names.push(name_ids[group_names[slot].0]);
            steps.push(located.timestep.as_index());
        }

        Self {
            slots,
            names,
            steps,
            visibility,
            num_slots,
            num_names,
        }
    }
}

/// Expands the `[batch, horizon]` pad mask into a key-padding mask over the
/// flat sequence, shaped `[batch, num_heads, T, T]`.
pub fn generate_pad_attention_mask(
    layout: &TokenLayout,
    pad_mask: &Tensor,
    num_heads: usize,
) -> Result<Tensor> {
    let device = pad_mask.device();
    let total = layout.total_tokens();
    let valid_steps = pad_mask.ne(&pad_mask.zeros_like()?)?.to_dtype(MASK_DTYPE)?;
    // Column 0 stands for prefix keys, which are always valid.
    let always = Tensor::ones((layout.batch, 1), MASK_DTYPE, device)?;
    let table = Tensor::cat(&[&always, &valid_steps], 1)?;

    let mut columns = Vec::with_capacity(total);
    columns.extend(std::iter::repeat(0u32).take(layout.tokens_for_prefix()));
    for step in 0..layout.horizon {
        columns.extend(std::iter::repeat(step as u32 + 1).take(layout.tokens_per_step()));
    }
    let columns = Tensor::from_vec(columns, total, device)?;
    let key_valid = table.index_select(&columns, 1)?;
    Ok(key_padding_mask(&key_valid, num_heads, total)?)
}

/// Builds the `[batch, num_heads, T, T]` boolean attention mask (dtype `u8`,
/// `1` = visible) for the flat sequence described by `layout`.
pub fn generate_attention_mask(
    layout: &TokenLayout,
    prefix_groups: &[PrefixGroup],
    timestep_groups: &[TimestepGroup],
    pad_mask: &Tensor,
    num_heads: usize,
) -> Result<Tensor> {
    if num_heads == 0 {
        return Err(BlockTransformerError::precondition(
            "attention mask needs at least one head",
        ));
    }
    let device = pad_mask.device();
    let total = layout.total_tokens();
    let tables = PositionTables::build(layout, prefix_groups, timestep_groups);

    let visibility = Tensor::from_vec(
        tables.visibility,
        (tables.num_slots, tables.num_names),
        device,
    )?;
    let slots = Tensor::from_vec(tables.slots, total, device)?;
    let names = Tensor::from_vec(tables.names, total, device)?;
    // [T, num_names] then [T, T]
    let group_visible = visibility
        .index_select(&slots, 0)?
        .index_select(&names, 1)?;

    let steps = Tensor::from_vec(tables.steps, total, device)?;
    let causal = steps
        .reshape((total, 1))?
        .broadcast_ge(&steps.reshape((1, total))?)?;

    let rule = mask_and(&group_visible, &causal)?.reshape((1, 1, total, total))?;
    let padding = generate_pad_attention_mask(layout, pad_mask, num_heads)?;
    Ok(mask_and(&rule, &padding)?.contiguous()?)
}

/// Evaluates the visibility rule pair by pair. Returns a row-major
/// `[batch, T, T]` buffer of `0`/`1`, identical for every head.
pub fn reference_attention_mask(
    layout: &TokenLayout,
    prefix_groups: &[PrefixGroup],
    timestep_groups: &[TimestepGroup],
    pad_mask: &Tensor,
) -> Result<Vec<u8>> {
    let valid = pad_mask
        .ne(&pad_mask.zeros_like()?)?
        .to_dtype(DType::U8)?
        .to_vec2::<u8>()?;
    let total = layout.total_tokens();
    let metadata = (0..total)
        .map(|position| {
            token_metadata(layout, prefix_groups, timestep_groups, position).ok_or_else(|| {
                BlockTransformerError::precondition(format!(
                    "position {position} is outside the token layout"
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut mask = Vec::with_capacity(layout.batch * total * total);
    for row in valid.iter().take(layout.batch) {
        for query in &metadata {
            for key in &metadata {
                let key_valid = match key.timestep.as_index() {
                    -1 => true,
                    step => row[step as usize] != 0,
                };
                mask.push(u8::from(query.can_attend(key) && key_valid));
            }
        }
    }
    Ok(mask)
}
