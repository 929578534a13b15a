//! Turns a dataset mixture into per-dataset loading kwargs and weights.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::ActionEncoding;
use crate::errors::{MixtureError, Result};
use crate::registry::{DatasetRegistry, ObsKeys};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveOptions {
    /// Drop later entries whose name was already seen.
    pub deduplicate: bool,
    pub n_third_person_cameras: usize,
    pub n_wrist_cameras: usize,
    pub load_depth: bool,
    pub load_proprio: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            deduplicate: true,
            n_third_person_cameras: 1,
            n_wrist_cameras: 0,
            load_depth: true,
            load_proprio: true,
        }
    }
}

/// Loading configuration for one dataset of a mixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetKwargs {
    pub name: String,
    pub data_dir: String,
    pub action_encoding: ActionEncoding,
    pub image_obs_keys: ObsKeys,
    /// `None` when depth loading is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_obs_keys: Option<ObsKeys>,
    /// `None` when proprioception loading is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_obs_keys: Option<ObsKeys>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A mixture entry left out of the resolved lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkippedDataset {
    Duplicate { name: String, weight: f64 },
    UnsupportedAction { name: String, action_encoding: ActionEncoding },
}

impl SkippedDataset {
    pub fn name(&self) -> &str {
        match self {
            SkippedDataset::Duplicate { name, .. } | SkippedDataset::UnsupportedAction { name, .. } => name,
        }
    }
}

impl fmt::Display for SkippedDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkippedDataset::Duplicate { name, weight } => {
                write!(f, "skipping duplicate: ({name}, {weight})")
            }
            SkippedDataset::UnsupportedAction { name, action_encoding } => write!(
                f,
                "skipping {name}: action encoding {action_encoding} is not supported, only eef_pos is"
            ),
        }
    }
}

/// Parallel lists of dataset kwargs and sampling weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedMixture {
    pub datasets: Vec<DatasetKwargs>,
    pub weights: Vec<f64>,
    pub skipped: Vec<SkippedDataset>,
}

impl ResolvedMixture {
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DatasetKwargs, f64)> {
        self.datasets.iter().zip(self.weights.iter().copied())
    }

    pub fn into_parts(self) -> (Vec<DatasetKwargs>, Vec<f64>) {
        (self.datasets, self.weights)
    }
}

/// First `n_third_person` keys, then the last `n_wrist` keys. Both ends
/// clamp to the list length.
pub fn trim_camera_keys(keys: &[Option<String>], n_third_person: usize, n_wrist: usize) -> ObsKeys {
    let mut trimmed: ObsKeys = keys.iter().take(n_third_person).cloned().collect();
    if n_wrist > 0 {
        let start = keys.len().saturating_sub(n_wrist);
        trimmed.extend(keys[start..].iter().cloned());
    }
    trimmed
}

/// Resolves `mix` against `registry`.
///
/// Duplicates and datasets with unsupported action encodings are dropped
/// from both output lists and reported in [`ResolvedMixture::skipped`].
/// A dataset missing from the registry aborts resolution.
pub fn resolve<S: AsRef<str>>(
    mix: &[(S, f64)],
    root_dir: &str,
    registry: &dyn DatasetRegistry,
    options: &ResolveOptions,
) -> Result<ResolvedMixture> {
    let mut resolved = ResolvedMixture::default();
    let mut seen = HashSet::new();

    for (name, weight) in mix {
        let name = name.as_ref();
        if options.deduplicate && !seen.insert(name) {
            let skipped = SkippedDataset::Duplicate {
                name: name.to_string(),
                weight: *weight,
            };
            log::warn!("{skipped}");
            resolved.skipped.push(skipped);
            continue;
        }

        let schema = registry
            .lookup(name)
            .ok_or_else(|| MixtureError::UnknownDataset(name.to_string()))?;
        if !schema.action_encoding.is_supported() {
            let skipped = SkippedDataset::UnsupportedAction {
                name: name.to_string(),
                action_encoding: schema.action_encoding,
            };
            log::warn!("{skipped}");
            resolved.skipped.push(skipped);
            continue;
        }

        let image_obs_keys = trim_camera_keys(
            &schema.image_obs_keys,
            options.n_third_person_cameras,
            options.n_wrist_cameras,
        );
        let depth_obs_keys = options.load_depth.then(|| {
            trim_camera_keys(
                &schema.depth_obs_keys,
                options.n_third_person_cameras,
                options.n_wrist_cameras,
            )
        });
        let state_obs_keys = options.load_proprio.then(|| schema.state_obs_keys.clone());

        log::debug!("resolved {name} with weight {weight}: images {image_obs_keys:?}");
        resolved.datasets.push(DatasetKwargs {
            name: name.to_string(),
            data_dir: root_dir.to_string(),
            action_encoding: schema.action_encoding,
            image_obs_keys,
            depth_obs_keys,
            state_obs_keys,
            extra: schema.extra.clone(),
        });
        resolved.weights.push(*weight);
    }

    Ok(resolved)
}
