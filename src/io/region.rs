//! Region of interest from GeoJSON
//!
//! Accepts a bare `Polygon` or `MultiPolygon` geometry, a `Feature`, or a
//! `FeatureCollection` whose polygonal features are merged into one region.

use crate::core::region::{Polygon, Region};
use crate::types::{BasinError, BasinResult};
use serde_json::Value;
use std::path::Path;

pub fn read_region<P: AsRef<Path>>(path: P) -> BasinResult<Region> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("region")
        .to_string();
    let region = parse_region(&name, &text)?;
    log::info!(
        "Loaded region {} with {} polygon(s), bounds {:?}",
        region.name(),
        region.polygons().len(),
        region.bounds()
    );
    Ok(region)
}

pub fn parse_region(name: &str, geojson: &str) -> BasinResult<Region> {
    let value: Value = serde_json::from_str(geojson)?;
    let mut polygons = Vec::new();
    collect(&value, &mut polygons)?;
    Region::new(name, polygons)
}

fn invalid(msg: impl Into<String>) -> BasinError {
    BasinError::InvalidFormat(msg.into())
}

fn collect(value: &Value, out: &mut Vec<Polygon>) -> BasinResult<()> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("GeoJSON object without a type"))?;

    match kind {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid("FeatureCollection without features"))?;
            for feature in features {
                collect(feature, out)?;
            }
        }
        "Feature" => match value.get("geometry") {
            Some(Value::Null) | None => log::warn!("Skipping feature without geometry"),
            Some(geometry) => collect(geometry, out)?,
        },
        "Polygon" => out.push(polygon(coordinates(value)?)?),
        "MultiPolygon" => {
            let parts = coordinates(value)?
                .as_array()
                .ok_or_else(|| invalid("MultiPolygon coordinates must be an array"))?;
            for part in parts {
                out.push(polygon(part)?);
            }
        }
        "GeometryCollection" => {
            let geometries = value
                .get("geometries")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid("GeometryCollection without geometries"))?;
            for geometry in geometries {
                collect(geometry, out)?;
            }
        }
        other => log::warn!("Ignoring non-polygonal GeoJSON {}", other),
    }
    Ok(())
}

fn coordinates(value: &Value) -> BasinResult<&Value> {
    value
        .get("coordinates")
        .ok_or_else(|| invalid("Geometry without coordinates"))
}

fn polygon(rings: &Value) -> BasinResult<Polygon> {
    let rings = rings
        .as_array()
        .ok_or_else(|| invalid("Polygon coordinates must be an array of rings"))?;
    let mut parsed = rings.iter().map(ring).collect::<BasinResult<Vec<_>>>()?;
    if parsed.is_empty() {
        return Err(invalid("Polygon without rings"));
    }
    let exterior = parsed.remove(0);
    Ok(Polygon::new(exterior, parsed))
}

fn ring(value: &Value) -> BasinResult<Vec<[f64; 2]>> {
    let points = value
        .as_array()
        .ok_or_else(|| invalid("Ring must be an array of positions"))?;
    points
        .iter()
        .map(|p| {
            let x = p.get(0).and_then(Value::as_f64);
            let y = p.get(1).and_then(Value::as_f64);
            match (x, y) {
                (Some(x), Some(y)) => Ok([x, y]),
                _ => Err(invalid(format!("Invalid position {}", p))),
            }
        })
        .collect()
}
