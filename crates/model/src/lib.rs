//! Block-structured transformer over named token groups.
//!
//! Inputs are split into prefix groups (present once per sequence) and
//! timestep groups (repeated at every step of the horizon). Each group names
//! the groups it may attend to; [`masks`] turns those declarations plus the
//! timestep pad mask into a boolean attention mask, [`assembly`] flattens the
//! groups into one sequence and back, and [`BlockTransformer`] runs a
//! [`SequenceEncoder`] in between.

pub mod assembly;
pub mod block;
pub mod block_transformer;
pub mod config;
pub mod encoder;
pub mod errors;
pub mod groups;
pub mod layout;
pub mod masks;

pub use block_transformer::BlockTransformer;
pub use config::BlockTransformerConfig;
pub use encoder::{ForwardMode, SequenceEncoder, Transformer};
pub use errors::{BlockTransformerError, GroupError, Result};
pub use groups::{AttendsTo, PrefixGroup, TimestepGroup};
pub use layout::{Timestep, TokenLayout, TokenMetadata};
