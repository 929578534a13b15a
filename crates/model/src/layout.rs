//! Flattened token layout shared by masking, assembly and disassembly.
//!
//! The sequence handed to the encoder is laid out as every prefix group in
//! input order, followed by `horizon` repetitions of every timestep group in
//! input order (horizon-major). [`TokenLayout`] records the per-group token
//! counts for one forward call and maps flat positions back to the group and
//! timestep they came from.

use attention::dropout::splitmix64;
use candle_core::Tensor;

use crate::errors::{BlockTransformerError, Result};
use crate::groups::{AttendsTo, PrefixGroup, TimestepGroup};

/// Timestep of a token. Prefix tokens sort before every real step, which is
/// what lets every timestep token read them under the causal rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Timestep {
    Prefix,
    Step(usize),
}

impl Timestep {
    /// Integer form with `-1` standing for prefix tokens.
    pub fn as_index(self) -> i64 {
        match self {
            Timestep::Prefix => -1,
            Timestep::Step(t) => t as i64,
        }
    }
}

/// Which input group a flat position belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSlot {
    Prefix(usize),
    Timestep(usize),
}

/// Resolved location of one flat position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPosition {
    pub slot: GroupSlot,
    pub timestep: Timestep,
    /// Index of the token within its group (and timestep).
    pub offset: usize,
}

/// Per-position description used to decide visibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata<'a> {
    pub group_name: &'a str,
    pub timestep: Timestep,
    pub attends_to: &'a AttendsTo,
}

impl TokenMetadata<'_> {
    /// Whether a query token described by `self` may read the key `other`.
    pub fn can_attend(&self, other: &TokenMetadata<'_>) -> bool {
        let group_visible =
            self.group_name == other.group_name || self.attends_to.contains(other.group_name);
        group_visible && self.timestep >= other.timestep
    }
}

/// Finds the group owning `index` among consecutive blocks of `counts` tokens.
fn locate_in(counts: &[usize], index: usize) -> Option<(usize, usize)> {
    let mut start = 0;
    for (group, &count) in counts.iter().enumerate() {
        if index < start + count {
            return Some((group, index - start));
        }
        start += count;
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLayout {
    pub batch: usize,
    pub horizon: usize,
    pub embed_dim: usize,
    pub tokens_per_prefix_group: Vec<usize>,
    pub tokens_per_timestep_group: Vec<usize>,
}

impl TokenLayout {
    /// Validates that the groups and pad mask agree and records their counts.
    pub fn new(
        prefix_groups: &[PrefixGroup],
        timestep_groups: &[TimestepGroup],
        pad_mask: &Tensor,
    ) -> Result<Self> {
        let first = timestep_groups.first().ok_or_else(|| {
            BlockTransformerError::precondition("at least one timestep group is required")
        })?;
        let batch = first.batch();
        let horizon = first.horizon();
        let embed_dim = first.embed_dim();

        for group in timestep_groups {
            if group.horizon() != horizon {
                return Err(BlockTransformerError::precondition(format!(
                    "timestep group `{}` has horizon {} but `{}` has horizon {horizon}",
                    group.name(),
                    group.horizon(),
                    first.name()
                )));
            }
            if group.batch() != batch {
                return Err(BlockTransformerError::precondition(format!(
                    "timestep group `{}` has batch {} but `{}` has batch {batch}",
                    group.name(),
                    group.batch(),
                    first.name()
                )));
            }
            if group.embed_dim() != embed_dim {
                return Err(BlockTransformerError::precondition(format!(
                    "timestep group `{}` has embedding width {}, expected {embed_dim}",
                    group.name(),
                    group.embed_dim()
                )));
            }
        }
        for group in prefix_groups {
            if group.batch() != batch {
                return Err(BlockTransformerError::precondition(format!(
                    "prefix group `{}` has batch {} but timestep groups have batch {batch}",
                    group.name(),
                    group.batch()
                )));
            }
            if group.embed_dim() != embed_dim {
                return Err(BlockTransformerError::precondition(format!(
                    "prefix group `{}` has embedding width {}, expected {embed_dim}",
                    group.name(),
                    group.embed_dim()
                )));
            }
        }

        match pad_mask.dims() {
            [mask_batch, mask_horizon] if *mask_batch == batch && *mask_horizon == horizon => {}
            dims => {
                return Err(BlockTransformerError::precondition(format!(
                    "pad mask must be [{batch}, {horizon}], got {dims:?}"
                )))
            }
        }

        let layout = Self {
            batch,
            horizon,
            embed_dim,
            tokens_per_prefix_group: prefix_groups.iter().map(PrefixGroup::n_tokens).collect(),
            tokens_per_timestep_group: timestep_groups.iter().map(TimestepGroup::n_tokens).collect(),
        };
        if layout.total_tokens() == 0 {
            return Err(BlockTransformerError::precondition(
                "token groups contain no tokens",
            ));
        }
        Ok(layout)
    }

    pub fn tokens_for_prefix(&self) -> usize {
        self.tokens_per_prefix_group.iter().sum()
    }

    pub fn tokens_per_step(&self) -> usize {
        self.tokens_per_timestep_group.iter().sum()
    }

    pub fn total_tokens(&self) -> usize {
        self.tokens_for_prefix() + self.tokens_per_step() * self.horizon
    }

    /// Maps a flat position to its group, timestep and intra-group offset.
    pub fn locate(&self, position: usize) -> Option<TokenPosition> {
        let prefix = self.tokens_for_prefix();
        if position < prefix {
            let (group, offset) = locate_in(&self.tokens_per_prefix_group, position)?;
            return Some(TokenPosition {
                slot: GroupSlot::Prefix(group),
                timestep: Timestep::Prefix,
                offset,
            });
        }
        let per_step = self.tokens_per_step();
        if per_step == 0 {
            return None;
        }
        let rest = position - prefix;
        let (step, within) = (rest / per_step, rest % per_step);
        if step >= self.horizon {
            return None;
        }
        let (group, offset) = locate_in(&self.tokens_per_timestep_group, within)?;
        Some(TokenPosition {
            slot: GroupSlot::Timestep(group),
            timestep: Timestep::Step(step),
            offset,
        })
    }

    /// Describes the token at `position` for masking decisions.
    pub fn metadata<'g>(
        &self,
        prefix_groups: &'g [PrefixGroup],
        timestep_groups: &'g [TimestepGroup],
        position: usize,
    ) -> Option<TokenMetadata<'g>> {
        let located = self.locate(position)?;
        let (group_name, attends_to) = match located.slot {
            GroupSlot::Prefix(g) => {
                let group = prefix_groups.get(g)?;
                (group.name(), group.attends_to())
            }
            GroupSlot::Timestep(g) => {
                let group = timestep_groups.get(g)?;
                (group.name(), group.attends_to())
            }
        };
        Some(TokenMetadata {
            group_name,
            timestep: located.timestep,
            attends_to,
        })
    }

    /// Stable identity of every flat position, derived from group name,
    /// timestep and offset. Used to key dropout so that a token's random
    /// draws do not depend on where other groups place their tokens.
    pub fn token_keys(
        &self,
        prefix_groups: &[PrefixGroup],
        timestep_groups: &[TimestepGroup],
    ) -> Vec<u64> {
        let mut keys = Vec::with_capacity(self.total_tokens());
        for group in prefix_groups {
            let name = name_hash(group.name());
            for offset in 0..group.n_tokens() {
                keys.push(token_key(name, Timestep::Prefix, offset));
            }
        }
        let names: Vec<u64> = timestep_groups.iter().map(|g| name_hash(g.name())).collect();
        for step in 0..self.horizon {
            for (group, name) in timestep_groups.iter().zip(&names) {
                for offset in 0..group.n_tokens() {
                    keys.push(token_key(*name, Timestep::Step(step), offset));
                }
            }
        }
        keys
    }
}

fn name_hash(name: &str) -> u64 {
    // FNV-1a
    name.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn token_key(name: u64, timestep: Timestep, offset: usize) -> u64 {
    let step = splitmix64(name ^ timestep.as_index() as u64);
    splitmix64(step ^ offset as u64)
}
