//! File-based mixture configuration.
//!
//! ```toml
//! mix = "rtx"
//! data_dir = "gs://rail-orca-central1"
//! registry = "oxe_registry.toml"
//!
//! [options]
//! n_wrist_cameras = 1
//! load_depth = false
//! ```
//!
//! `mix` is either a named mixture or an explicit list of
//! `{ name, weight }` tables.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{MixtureError, Result};
use crate::mixes::named_mix;
use crate::registry::StaticRegistry;
use crate::resolver::{resolve, ResolveOptions, ResolvedMixture};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixEntry {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MixSource {
    Named(String),
    Explicit(Vec<MixEntry>),
}

impl MixSource {
    pub fn entries(&self) -> Result<Vec<(String, f64)>> {
        match self {
            MixSource::Named(name) => Ok(named_mix(name)?
                .iter()
                .map(|(dataset, weight)| (dataset.to_string(), *weight))
                .collect()),
            MixSource::Explicit(entries) => Ok(entries
                .iter()
                .map(|entry| (entry.name.clone(), entry.weight))
                .collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureConfig {
    pub mix: MixSource,
    pub data_dir: String,
    pub registry: PathBuf,
    #[serde(default)]
    pub options: ResolveOptions,
}

impl MixtureConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut config: MixtureConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(MixtureError::Format(format!(
                    "config {}: unsupported extension '{other}'",
                    path.display()
                )))
            }
        };

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        if config.registry.is_relative() {
            config.registry = base_dir.join(&config.registry);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.data_dir.trim().is_empty() {
            errors.push("data_dir must not be empty".to_string());
        }
        if self.registry.as_os_str().is_empty() {
            errors.push("registry path must not be empty".to_string());
        }
        match &self.mix {
            MixSource::Named(name) => {
                if named_mix(name).is_err() {
                    errors.push(format!("unknown named mixture '{name}'"));
                }
            }
            MixSource::Explicit(entries) => {
                if entries.is_empty() {
                    errors.push("mix must list at least one dataset".to_string());
                }
                for entry in entries {
                    if entry.name.trim().is_empty() {
                        errors.push("mix entries need a dataset name".to_string());
                    }
                    if !entry.weight.is_finite() || entry.weight < 0.0 {
                        errors.push(format!(
                            "weight for '{}' must be finite and >= 0, got {}",
                            entry.name, entry.weight
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MixtureError::Validation(errors))
        }
    }

    /// Loads the registry and resolves the mixture.
    pub fn resolve(&self) -> Result<ResolvedMixture> {
        let registry = StaticRegistry::from_path(&self.registry)?;
        let entries = self.mix.entries()?;
        resolve(&entries, &self.data_dir, &registry, &self.options)
    }
}
