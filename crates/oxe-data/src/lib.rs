//! Open X-Embodiment dataset mixtures.
//!
//! A mixture is an ordered list of `(dataset, weight)` pairs. [`resolve`]
//! looks every dataset up in a [`DatasetRegistry`] and produces the
//! per-dataset loading kwargs together with their sampling weights.

pub mod action;
pub mod config;
pub mod errors;
pub mod mixes;
pub mod registry;
pub mod report;
pub mod resolver;

pub use action::ActionEncoding;
pub use config::{MixEntry, MixSource, MixtureConfig};
pub use errors::{MixtureError, Result};
pub use mixes::{named_mix, DataMix, OXE_FRANKA_MIX, OXE_FULL_MIX, RT_X_MIX};
pub use registry::{DatasetRegistry, DatasetSchema, ObsKeys, StaticRegistry};
pub use report::format_mixture;
pub use resolver::{
    resolve, trim_camera_keys, DatasetKwargs, ResolveOptions, ResolvedMixture, SkippedDataset,
};
