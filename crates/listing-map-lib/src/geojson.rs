//! Minimal GeoJSON reading on top of `serde_json::Value`
//!
//! Only the shapes the backend produces are understood: `Point` for listings and
//! clusters, `Polygon` / `MultiPolygon` for administrative boundaries.

use crate::{MapError, Result};
use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
use serde_json::Value;

/// Borrow the `features` array of a FeatureCollection
pub(crate) fn features(collection: &Value) -> Result<&Vec<Value>> {
    collection
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| MapError::Decode("expected a FeatureCollection with a features array".to_string()))
}

/// Read a `Point` geometry, returning `None` for any other shape
pub(crate) fn parse_point(geometry: &Value) -> Option<Point<f64>> {
    if geometry.get("type")?.as_str()? != "Point" {
        return None;
    }
    let coord = parse_coord(geometry.get("coordinates")?)?;
    Some(Point::from(coord))
}

/// Read a `Polygon` or `MultiPolygon` geometry as a MultiPolygon
pub(crate) fn parse_areal(geometry: &Value) -> Result<MultiPolygon<f64>> {
    let kind = geometry.get("type").and_then(Value::as_str).unwrap_or_default();
    let coords = geometry
        .get("coordinates")
        .and_then(Value::as_array)
        .ok_or_else(|| MapError::Decode(format!("{kind} geometry without coordinates")))?;

    match kind {
        "Polygon" => Ok(MultiPolygon(vec![parse_polygon(coords)?])),
        "MultiPolygon" => {
            let polygons = coords
                .iter()
                .map(|polygon| {
                    polygon
                        .as_array()
                        .ok_or_else(|| MapError::Decode("MultiPolygon member is not an array".to_string()))
                        .and_then(|rings| parse_polygon(rings))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(MultiPolygon(polygons))
        }
        other => Err(MapError::Decode(format!("unsupported boundary geometry: {other:?}"))),
    }
}

/// Rings are `[exterior, interior...]`
fn parse_polygon(rings: &[Value]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| {
        ring.as_array()
            .ok_or_else(|| MapError::Decode("polygon ring is not an array".to_string()))
            .map(|coords| parse_ring(coords))
    });
    let exterior = rings
        .next()
        .ok_or_else(|| MapError::Decode("polygon without exterior ring".to_string()))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(coords: &[Value]) -> LineString<f64> {
    let mut points: Vec<Coord<f64>> = coords.iter().filter_map(parse_coord).collect();
    // Ensure ring is closed (first point == last point)
    if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied())
        && first != last
    {
        points.push(first);
    }
    LineString(points)
}

fn parse_coord(value: &Value) -> Option<Coord<f64>> {
    let pair = value.as_array()?;
    let x = pair.first()?.as_f64()?;
    let y = pair.get(1)?.as_f64()?;
    (x.is_finite() && y.is_finite()).then_some(Coord { x, y })
}

/// Identifiers arrive as either strings or numbers
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
