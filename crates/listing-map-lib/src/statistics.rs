//! Region statistics as returned by the backend
//!
//! The payload is nested `category -> time window -> region name -> metric -> value`.
//! It is keyed by region *name* only; joining to boundaries is the classifier's job.

use crate::{DataSource, MapError, Result, normalize_name};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Metric name to value
pub type Metrics = BTreeMap<String, f64>;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RegionStatistics {
    categories: BTreeMap<DataSource, BTreeMap<String, BTreeMap<String, Metrics>>>,
}

impl RegionStatistics {
    /// Decode leniently: unknown categories and non-numeric metrics are ignored.
    /// Only a non-object top level is an error.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let root: Value = serde_json::from_slice(bytes)?;
        let root = root
            .as_object()
            .ok_or_else(|| MapError::Decode("statistics payload is not an object".to_string()))?;

        let mut stats = Self::default();
        for (category, windows) in root {
            let Some(category) = DataSource::parse(category) else {
                tracing::trace!("Ignoring statistics category {category}");
                continue;
            };
            let Some(windows) = windows.as_object() else {
                continue;
            };
            for (window, regions) in windows {
                let Some(regions) = regions.as_object() else {
                    continue;
                };
                for (name, metrics) in regions {
                    let Some(metrics) = metrics.as_object() else {
                        continue;
                    };
                    for (metric, value) in metrics {
                        if let Some(value) = value.as_f64().filter(|v| v.is_finite()) {
                            stats.insert(category, window, name, metric, value);
                        }
                    }
                }
            }
        }
        Ok(stats)
    }

    pub fn insert(&mut self, category: DataSource, window: &str, name: &str, metric: &str, value: f64) {
        self.categories
            .entry(category)
            .or_default()
            .entry(window.to_string())
            .or_default()
            .entry(normalize_name(name))
            .or_default()
            .insert(metric.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn windows(&self, category: DataSource) -> Vec<&str> {
        self.categories
            .get(&category)
            .map(|windows| windows.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn metrics(&self, category: DataSource, window: &str, name: &str) -> Option<&Metrics> {
        self.categories
            .get(&category)?
            .get(window)?
            .get(&normalize_name(name))
    }

    /// Name-keyed values of one metric; names are normalized and sorted
    pub fn table(&self, category: DataSource, window: &str, metric: &str) -> BTreeMap<String, f64> {
        self.categories
            .get(&category)
            .and_then(|windows| windows.get(window))
            .map(|regions| {
                regions
                    .iter()
                    .filter_map(|(name, metrics)| metrics.get(metric).map(|v| (name.clone(), *v)))
                    .collect()
            })
            .unwrap_or_default()
    }
}
