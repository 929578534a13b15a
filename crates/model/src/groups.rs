//! Prefix and timestep token groups.
//!
//! A group is a named block of tokens plus the set of other group names its
//! tokens may attend to. Prefix groups carry `[batch, n_tokens, embed]`
//! tensors and exist once per sequence (task, language). Timestep groups
//! carry `[batch, horizon, n_tokens, embed]` tensors and repeat at every step
//! (observations, actions). Groups are immutable; the block transformer
//! returns new groups whose tokens are the output embeddings.

use std::collections::BTreeSet;

use candle_core::Tensor;

use crate::errors::GroupError;

/// Names of the groups a group's tokens may attend to, besides its own.
pub type AttendsTo = BTreeSet<String>;

fn check_rank(
    name: &str,
    kind: &'static str,
    tokens: &Tensor,
    expected: usize,
) -> Result<(), GroupError> {
    if tokens.rank() == expected {
        Ok(())
    } else {
        Err(GroupError::Shape {
            name: name.to_string(),
            kind,
            expected,
            shape: tokens.dims().to_vec(),
        })
    }
}

fn collect_names<I, S>(names: I) -> AttendsTo
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}

/// Non-temporal tokens shared by every timestep.
#[derive(Debug, Clone)]
pub struct PrefixGroup {
    name: String,
    tokens: Tensor,
    attends_to: AttendsTo,
}

impl PrefixGroup {
    /// Builds a prefix group from `[batch, n_tokens, embed]` tokens.
    pub fn new<I, S>(name: impl Into<String>, tokens: Tensor, attends_to: I) -> Result<Self, GroupError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        check_rank(&name, "prefix", &tokens, 3)?;
        Ok(Self {
            name,
            tokens,
            attends_to: collect_names(attends_to),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tokens(&self) -> &Tensor {
        &self.tokens
    }

    pub fn attends_to(&self) -> &AttendsTo {
        &self.attends_to
    }

    /// Whether tokens of this group may read tokens of group `other`.
    pub fn attends(&self, other: &str) -> bool {
        self.name == other || self.attends_to.contains(other)
    }

    pub fn batch(&self) -> usize {
        self.tokens.dims()[0]
    }

    pub fn n_tokens(&self) -> usize {
        self.tokens.dims()[1]
    }

    pub fn embed_dim(&self) -> usize {
        self.tokens.dims()[2]
    }

    /// Same group with new tokens; name and visibility are preserved.
    pub fn with_tokens(&self, tokens: Tensor) -> Result<Self, GroupError> {
        check_rank(&self.name, "prefix", &tokens, 3)?;
        Ok(Self {
            name: self.name.clone(),
            tokens,
            attends_to: self.attends_to.clone(),
        })
    }

    pub fn into_tokens(self) -> Tensor {
        self.tokens
    }
}

/// Temporal tokens repeated at every timestep of the window.
#[derive(Debug, Clone)]
pub struct TimestepGroup {
    name: String,
    tokens: Tensor,
    attends_to: AttendsTo,
}

impl TimestepGroup {
    /// Builds a timestep group from `[batch, horizon, n_tokens, embed]` tokens.
    pub fn new<I, S>(name: impl Into<String>, tokens: Tensor, attends_to: I) -> Result<Self, GroupError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        check_rank(&name, "timestep", &tokens, 4)?;
        Ok(Self {
            name,
            tokens,
            attends_to: collect_names(attends_to),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tokens(&self) -> &Tensor {
        &self.tokens
    }

    pub fn attends_to(&self) -> &AttendsTo {
        &self.attends_to
    }

    /// Whether tokens of this group may read tokens of group `other`.
    pub fn attends(&self, other: &str) -> bool {
        self.name == other || self.attends_to.contains(other)
    }

    pub fn batch(&self) -> usize {
        self.tokens.dims()[0]
    }

    pub fn horizon(&self) -> usize {
        self.tokens.dims()[1]
    }

    /// Tokens contributed at each timestep.
    pub fn n_tokens(&self) -> usize {
        self.tokens.dims()[2]
    }

    pub fn embed_dim(&self) -> usize {
        self.tokens.dims()[3]
    }

    /// Same group with new tokens; name and visibility are preserved.
    pub fn with_tokens(&self, tokens: Tensor) -> Result<Self, GroupError> {
        check_rank(&self.name, "timestep", &tokens, 4)?;
        Ok(Self {
            name: self.name.clone(),
            tokens,
            attends_to: self.attends_to.clone(),
        })
    }

    pub fn into_tokens(self) -> Tensor {
        self.tokens
    }
}
