//! Flat metrics document written at the end of a run.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Mapping from metric name to value, serialized as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsDocument {
    values: BTreeMap<String, f64>,
}

impl MetricsDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a metric, replacing any previous value of the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Writes the document as JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(self).context("Failed to serialize metrics")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write metrics {}", path.display()))
    }
}
