//! Per-dataset loading schemas.
//!
//! A registry file maps dataset names to their schema, in JSON or TOML:
//!
//! ```toml
//! [bridge_dataset]
//! action_encoding = "eef_pos"
//! image_obs_keys = ["image_0", "image_1"]
//! depth_obs_keys = []
//! state_obs_keys = ["EEF_state", "gripper_state"]
//! ```
//!
//! Camera slots may be `null` in JSON to mark a camera the dataset lacks;
//! the slot keeps its position when key lists are trimmed. Fields other
//! than the four known ones are carried through to the resolved kwargs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::ActionEncoding;
use crate::errors::{MixtureError, Result};

/// Ordered observation keys; `None` is an empty camera slot.
pub type ObsKeys = Vec<Option<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub action_encoding: ActionEncoding,
    #[serde(default)]
    pub image_obs_keys: ObsKeys,
    #[serde(default)]
    pub depth_obs_keys: ObsKeys,
    #[serde(default)]
    pub state_obs_keys: ObsKeys,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DatasetSchema {
    pub fn new(action_encoding: ActionEncoding) -> Self {
        Self {
            action_encoding,
            image_obs_keys: Vec::new(),
            depth_obs_keys: Vec::new(),
            state_obs_keys: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_image_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_obs_keys = keys.into_iter().map(|k| Some(k.into())).collect();
        self
    }

    pub fn with_depth_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depth_obs_keys = keys.into_iter().map(|k| Some(k.into())).collect();
        self
    }

    pub fn with_state_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state_obs_keys = keys.into_iter().map(|k| Some(k.into())).collect();
        self
    }
}

/// Source of dataset schemas for the resolver.
pub trait DatasetRegistry {
    fn lookup(&self, name: &str) -> Option<&DatasetSchema>;
}

/// Registry held in memory, usually loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticRegistry {
    datasets: BTreeMap<String, DatasetSchema>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let registry: StaticRegistry = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(MixtureError::Format(format!(
                    "registry {}: unsupported extension '{other}'",
                    path.display()
                )))
            }
        };
        log::debug!(
            "loaded {} dataset schemas from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: DatasetSchema) -> Option<DatasetSchema> {
        self.datasets.insert(name.into(), schema)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, DatasetSchema)> for StaticRegistry {
    fn from_iter<T: IntoIterator<Item = (S, DatasetSchema)>>(iter: T) -> Self {
        Self {
            datasets: iter.into_iter().map(|(name, schema)| (name.into(), schema)).collect(),
        }
    }
}

impl DatasetRegistry for StaticRegistry {
    fn lookup(&self, name: &str) -> Option<&DatasetSchema> {
        self.datasets.get(name)
    }
}
