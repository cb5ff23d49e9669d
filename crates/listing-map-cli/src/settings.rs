use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use listing_map_lib::{Config, DataSource, RegionLevel};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "listing-map", author, version, about, long_about = None)]
/// Listing Map - inspect cluster layouts, region coloring and expansions without a renderer
pub struct Settings {
    /// JSON configuration file; missing fields take their defaults
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL (overrides the configuration file)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// HTTP timeout in seconds (overrides the configuration file)
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the ring arrangement of an expanded cluster as JSON
    Layout(LayoutArgs),

    /// Color boundaries from a statistics file and print the lookup as JSON
    Classify(ClassifyArgs),

    /// Expand a cluster against the live backend and print the resulting scene-graph operations
    Expand(ExpandArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LayoutArgs {
    /// Number of members to place
    #[arg(short = 'n', long)]
    pub count: usize,

    /// Camera zoom
    #[arg(short, long, default_value = "15.0")]
    pub zoom: f64,

    /// Center longitude
    #[arg(long, default_value = "14.5058", allow_negative_numbers = true)]
    pub lon: f64,

    /// Center latitude
    #[arg(long, default_value = "46.0569", allow_negative_numbers = true)]
    pub lat: f64,
}

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    /// Boundary FeatureCollection
    #[arg(long, value_name = "FILE")]
    pub regions: PathBuf,

    /// Statistics payload as returned by the backend
    #[arg(long, value_name = "FILE")]
    pub stats: PathBuf,

    /// Hierarchy level of the boundaries
    #[arg(long, default_value = "coarse", value_parser = parse_level)]
    pub level: RegionLevel,

    #[arg(long, default_value = "sale", value_parser = parse_data_source)]
    pub category: DataSource,

    /// Time window (defaults to the configured one)
    #[arg(long)]
    pub window: Option<String>,

    /// Metric (defaults to the configured one)
    #[arg(long)]
    pub metric: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ExpandArgs {
    /// Cluster id, e.g. b_1042
    #[arg(long)]
    pub cluster: String,

    #[arg(short, long, default_value = "16.0")]
    pub zoom: f64,

    #[arg(long, default_value = "sale", value_parser = parse_data_source)]
    pub data_source: DataSource,

    /// Cluster longitude; members are averaged when omitted
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Cluster latitude
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,
}

fn parse_data_source(value: &str) -> Result<DataSource, String> {
    DataSource::parse(value).ok_or_else(|| format!("unknown data source {value:?} (expected sale or rental)"))
}

fn parse_level(value: &str) -> Result<RegionLevel, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "coarse" => Ok(RegionLevel::Coarse),
        "fine" => Ok(RegionLevel::Fine),
        _ => Err(format!("unknown region level {value:?} (expected coarse or fine)")),
    }
}

impl Settings {
    /// Configuration file (or defaults) with command-line overrides applied
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
                Config::from_json(&bytes).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Config::default(),
        };
        if let Some(base_url) = &self.base_url {
            config.api.base_url = base_url.clone();
        }
        if self.timeout_secs.is_some() {
            config.api.timeout_secs = self.timeout_secs;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layout() {
        let settings = Settings::try_parse_from(["listing-map", "layout", "-n", "23", "--zoom", "14"]).unwrap();
        let Command::Layout(args) = settings.command else {
            panic!("expected layout");
        };
        assert_eq!(args.count, 23);
        assert_eq!(args.zoom, 14.0);
    }

    #[test]
    fn test_parse_expand_with_overrides() {
        let settings = Settings::try_parse_from([
            "listing-map",
            "expand",
            "--cluster",
            "b_7",
            "--data-source",
            "Rental",
            "--base-url",
            "http://backend:9000/api",
        ])
        .unwrap();
        let Command::Expand(args) = &settings.command else {
            panic!("expected expand");
        };
        assert_eq!(args.data_source, DataSource::Rental);
        assert!(args.lon.is_none());

        let config = settings.load_config().unwrap();
        assert_eq!(config.api.base_url, "http://backend:9000/api");
    }

    #[test]
    fn test_rejects_unknown_category() {
        assert!(
            Settings::try_parse_from([
                "listing-map",
                "classify",
                "--regions",
                "r.json",
                "--stats",
                "s.json",
                "--category",
                "lease",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_lon_requires_lat() {
        assert!(Settings::try_parse_from(["listing-map", "expand", "--cluster", "b_1", "--lon", "14.5"]).is_err());
    }
}
