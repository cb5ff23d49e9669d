//! Configuration for the listing map core
//!
//! All values have working defaults; hosts typically load a JSON file over them.

use crate::{MapError, Result, Rgba};
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub expansion: ExpansionConfig,
    pub regions: RegionConfig,
    pub choropleth: ChoroplethConfig,
    pub viewport: ViewportConfig,
    pub api: ApiConfig,
}

/// Cluster expansion layout parameters
///
/// The ring radius follows `base_radius / 2^max(0, zoom - reference_zoom)`, so the
/// expansion keeps roughly the same on-screen size as the camera zooms in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Ring radius at or below the reference zoom, in degrees.
    /// Default: 0.0006
    pub base_radius: f64,
    /// Zoom level above which the radius starts halving per zoom step.
    /// Default: 13.0
    pub reference_zoom: f64,
    /// Largest member count that still fits on a single ring.
    /// Default: 10
    pub single_ring_max: usize,
    /// Share of members placed on the inner ring of a dual-ring layout.
    /// Default: 0.35
    pub inner_ring_share: f64,
    /// Upper bound for the inner ring population.
    /// Default: 10
    pub inner_ring_max: usize,
    /// Inner ring radius as a multiple of the zoom-adjusted radius.
    pub inner_ring_factor: f64,
    /// Outer ring radius as a multiple of the zoom-adjusted radius.
    pub outer_ring_factor: f64,
    pub member_color: Rgba,
    pub spoke_color: Rgba,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            base_radius: 0.0006,
            reference_zoom: 13.0,
            single_ring_max: 10,
            inner_ring_share: 0.35,
            inner_ring_max: 10,
            inner_ring_factor: 1.2,
            outer_ring_factor: 2.0,
            member_color: Rgba::rgb(0x1f, 0x6f, 0xd1),
            spoke_color: Rgba::rgba(0x1f, 0x6f, 0xd1, 0x99),
        }
    }
}

/// Administrative region rendering and selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Coarse region names (case-insensitive) that own fine-grained sub-regions
    pub fine_allow_list: Vec<String>,
    /// Without a coarse selection, fine regions are shown from this zoom upwards.
    /// Default: 12.0
    pub fine_zoom_threshold: f64,
    /// Coarse region labels appear from this zoom upwards
    pub label_min_zoom: f64,
    /// Camera padding in pixels when fitting to a region
    pub fit_padding: f32,
    /// Camera transition duration when fitting to a region
    pub fit_duration_ms: u32,
    pub fill_color: Rgba,
    pub outline_color: Rgba,
    pub outline_width: f64,
    pub mask_color: Rgba,
    pub selection_color: Rgba,
    pub selection_width: f64,
    pub hover_color: Rgba,
    pub hover_width: f64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            fine_allow_list: vec!["LJUBLJANA".to_string(), "MARIBOR".to_string()],
            fine_zoom_threshold: 12.0,
            label_min_zoom: 8.0,
            fit_padding: 40.0,
            fit_duration_ms: 800,
            fill_color: Rgba::rgba(0xd9, 0xd9, 0xd9, 0x66),
            outline_color: Rgba::rgb(0x7a, 0x7a, 0x7a),
            outline_width: 1.0,
            mask_color: Rgba::rgba(0x10, 0x10, 0x10, 0x99),
            selection_color: Rgba::rgb(0xe0, 0x4e, 0x1b),
            selection_width: 3.0,
            hover_color: Rgba::rgb(0x2b, 0x8c, 0xbe),
            hover_width: 2.0,
        }
    }
}

/// Choropleth coloring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoroplethConfig {
    /// Five colors, lightest first, for sale statistics
    pub sale_ramp: Vec<Rgba>,
    /// Five colors, lightest first, for rental statistics
    pub rental_ramp: Vec<Rgba>,
    /// Applied to every region without a computed color
    pub fallback_color: Rgba,
    /// Largest edit distance accepted when joining names fuzzily.
    /// Default: 2
    pub max_edit_distance: usize,
    /// Statistics time window used for coloring
    pub window: String,
    /// Statistics metric used for coloring
    pub metric: String,
}

impl Default for ChoroplethConfig {
    fn default() -> Self {
        Self {
            sale_ramp: vec![
                Rgba::rgb(0xfe, 0xf0, 0xd9),
                Rgba::rgb(0xfd, 0xcc, 0x8a),
                Rgba::rgb(0xfc, 0x8d, 0x59),
                Rgba::rgb(0xe3, 0x4a, 0x33),
                Rgba::rgb(0xb3, 0x00, 0x00),
            ],
            rental_ramp: vec![
                Rgba::rgb(0xf0, 0xf9, 0xe8),
                Rgba::rgb(0xba, 0xe4, 0xbc),
                Rgba::rgb(0x7b, 0xcc, 0xc4),
                Rgba::rgb(0x43, 0xa2, 0xca),
                Rgba::rgb(0x08, 0x68, 0xac),
            ],
            fallback_color: Rgba::rgba(0xcc, 0xcc, 0xcc, 0x80),
            max_edit_distance: 2,
            window: "last_12m".to_string(),
            metric: "avg_price_m2".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Settle time before a viewport change triggers a points fetch.
    /// Default: 300
    pub debounce_ms: u64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Transport timeout; `None` waits indefinitely
    pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Parse a JSON configuration, filling missing fields with defaults
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: Config = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the layout and selection code cannot work with.
    ///
    /// Ramp lengths are deliberately not checked here: a malformed ramp degrades to the
    /// flat fallback color instead of failing.
    pub fn validate(&self) -> Result<()> {
        let e = &self.expansion;
        let positive = [
            ("expansion.base_radius", e.base_radius),
            ("expansion.inner_ring_factor", e.inner_ring_factor),
            ("expansion.outer_ring_factor", e.outer_ring_factor),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(MapError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if !e.reference_zoom.is_finite() {
            return Err(MapError::InvalidConfig(
                "expansion.reference_zoom must be finite".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&e.inner_ring_share) {
            return Err(MapError::InvalidConfig(format!(
                "expansion.inner_ring_share must be within [0, 1], got {}",
                e.inner_ring_share
            )));
        }
        if !self.regions.fine_zoom_threshold.is_finite() {
            return Err(MapError::InvalidConfig(
                "regions.fine_zoom_threshold must be finite".to_string(),
            ));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(MapError::InvalidConfig("api.base_url is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.expansion.single_ring_max, 10);
        assert_eq!(config.viewport.debounce_ms, 300);
        assert_eq!(config.choropleth.max_edit_distance, 2);
        assert_eq!(config.choropleth.sale_ramp.len(), 5);
        assert_eq!(config.choropleth.rental_ramp.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = br#"{ "viewport": { "debounce_ms": 150 }, "regions": { "fine_allow_list": ["Koper"] } }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.viewport.debounce_ms, 150);
        assert_eq!(config.regions.fine_allow_list, vec!["Koper".to_string()]);
        assert_eq!(config.expansion, ExpansionConfig::default());
    }

    #[test]
    fn test_invalid_radius_rejected() {
        let mut config = Config::default();
        config.expansion.base_radius = 0.0;
        assert!(matches!(config.validate(), Err(MapError::InvalidConfig(_))));

        config.expansion.base_radius = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_share_rejected() {
        let mut config = Config::default();
        config.expansion.inner_ring_share = 1.5;
        assert!(config.validate().is_err());
    }
}
