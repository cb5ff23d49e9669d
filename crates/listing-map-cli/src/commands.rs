use crate::settings::{ClassifyArgs, ExpandArgs, LayoutArgs};
use anyhow::{Context, Result};
use geo::Point;
use listing_map_lib::layout::{arrange, ring_counts};
use listing_map_lib::{
    ChoroplethClassifier, ClusterExpansionEngine, ClusterId, Config, ExpansionContext, HeadlessEngine,
    HttpListingsApi, LayerRegistry, ListingFilters, RegionStatistics, decode_regions,
};
use serde_json::json;
use std::path::Path;

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

pub fn layout(config: &Config, args: &LayoutArgs) -> Result<()> {
    let center = Point::new(args.lon, args.lat);
    let positions = arrange(center, args.count, args.zoom, &config.expansion);
    let (inner, outer) = ring_counts(args.count, &config.expansion);
    tracing::debug!("Arranged {} members ({inner} inner, {outer} outer)", positions.len());

    print_json(&json!({
        "center": center,
        "zoom": args.zoom,
        "inner": inner,
        "outer": outer,
        "positions": positions,
    }))
}

pub fn classify(config: &Config, args: &ClassifyArgs) -> Result<()> {
    let regions = decode_regions(&read(&args.regions)?, args.level)
        .with_context(|| format!("decoding {}", args.regions.display()))?;
    let stats = RegionStatistics::from_json(&read(&args.stats)?)
        .with_context(|| format!("decoding {}", args.stats.display()))?;

    let window = args.window.as_deref().unwrap_or(&config.choropleth.window);
    let metric = args.metric.as_deref().unwrap_or(&config.choropleth.metric);
    let table = stats.table(args.category, window, metric);
    if table.is_empty() {
        tracing::warn!("No {} values for {window}/{metric}", args.category);
    }

    let classifier = ChoroplethClassifier::new(&config.choropleth);
    let lookup = classifier.classify(
        regions.iter().map(|r| (r.id.as_str(), r.name.as_str())),
        &table,
        args.category,
    );
    tracing::info!(
        "Colored {} of {} regions, {} unmatched",
        lookup.colors.len(),
        regions.len(),
        lookup.unmatched().len()
    );
    print_json(&serde_json::to_value(&lookup)?)
}

pub fn expand(config: &Config, args: &ExpandArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building async runtime")?;
    runtime.block_on(expand_async(config, args))
}

async fn expand_async(config: &Config, args: &ExpandArgs) -> Result<()> {
    let api = HttpListingsApi::new(&config.api)?;
    let mut registry = LayerRegistry::new(HeadlessEngine::new());
    let mut engine = ClusterExpansionEngine::new(config.expansion.clone(), None);

    let cluster_id = ClusterId::from(args.cluster.as_str());
    let location = args.lon.zip(args.lat).map(|(lon, lat)| Point::new(lon, lat));
    let context = ExpansionContext {
        data_source: args.data_source,
        zoom: args.zoom,
        filters: ListingFilters::default(),
    };

    let outcome = engine
        .activate(&mut registry, &api, &cluster_id, location, &context)
        .await;
    let members: Vec<_> = engine
        .manager()
        .active()
        .map(|record| {
            record
                .members
                .iter()
                .map(|m| json!({ "id": m.listing.id, "placement": m.placement }))
                .collect()
        })
        .unwrap_or_default();

    print_json(&json!({
        "outcome": outcome,
        "members": members,
        "calls": registry.engine().calls(),
    }))
}
