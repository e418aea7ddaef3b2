use crate::config::PlacesConfig;
use crate::types::{BoundaryRecord, PointOfInterest, Province, ResolvedMarker};
use anyhow::{Context, Result};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{BooleanOps, MultiPolygon};
use rayon::prelude::*;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use std::collections::HashMap;
use std::io::Write;
use tracing::{debug, info};

// Point location tagged with its index in the points file.
type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Merge boundary rows into one province per name and attach its notable
/// places. Provinces keep first-seen order.
pub fn build_provinces(records: Vec<BoundaryRecord>, places: &[PlacesConfig]) -> Vec<Province> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, MultiPolygon<f64>> = HashMap::new();

    for record in records {
        match merged.get_mut(&record.name) {
            Some(existing) => {
                debug!(province = %record.name, "merging duplicate boundary row");
                *existing = existing.union(&record.geometry);
            }
            None => {
                order.push(record.name.clone());
                merged.insert(record.name, record.geometry);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|name| {
            let boundary = merged.remove(&name)?;
            let notable_places = places
                .iter()
                .find(|p| p.province == name)
                .map(|p| p.names.clone())
                .unwrap_or_default();
            Some(Province { name, boundary, notable_places })
        })
        .collect()
}

/// Resolve every (province, place) pair of the mapping against the points.
///
/// A point matches when its name contains the place, ignoring case, and it
/// lies strictly inside the province (points on the boundary are excluded).
/// Rows come out in mapping order, then place order, then points-file order,
/// and the row number is baked into each `marker_id`.
pub fn resolve_markers(
    provinces: &[Province],
    points: &[PointOfInterest],
    places: &[PlacesConfig],
) -> Vec<ResolvedMarker> {
    info!(
        provinces = provinces.len(),
        points = points.len(),
        "resolving notable places"
    );

    let lowered: Vec<Option<String>> = points
        .iter()
        .map(|p| p.name.as_ref().map(|n| n.to_lowercase()))
        .collect();

    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedPoint::new([p.location.x(), p.location.y()], i))
            .collect(),
    );

    let by_name: HashMap<&str, &Province> =
        provinces.iter().map(|p| (p.name.as_str(), p)).collect();

    // (province, place, point index) in encounter order
    let matches: Vec<Vec<(&str, &str, usize)>> = places
        .par_iter()
        .map(|entry| {
            let Some(province) = by_name.get(entry.province.as_str()) else {
                debug!(province = %entry.province, "province not in boundary data");
                return Vec::new();
            };
            let inside = points_inside(&province.boundary, points, &tree);

            let mut rows = Vec::new();
            for place in &entry.names {
                let needle = place.to_lowercase();
                for &i in &inside {
                    if lowered[i].as_deref().is_some_and(|n| n.contains(&needle)) {
                        rows.push((entry.province.as_str(), place.as_str(), i));
                    }
                }
            }
            rows
        })
        .collect();

    let markers: Vec<ResolvedMarker> = matches
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(row, (province, place, i))| ResolvedMarker {
            province: province.to_string(),
            place: place.to_string(),
            lat: points[i].location.y(),
            lon: points[i].location.x(),
            marker_id: format!("{}_{}_{}", province, place, row),
        })
        .collect();

    info!(markers = markers.len(), "resolved notable places");
    markers
}

/// Indices of the points strictly inside `boundary`, ascending.
fn points_inside(
    boundary: &MultiPolygon<f64>,
    points: &[PointOfInterest],
    tree: &RTree<IndexedPoint>,
) -> Vec<usize> {
    let Some(rect) = boundary.bounding_rect() else {
        return Vec::new();
    };
    let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

    let mut inside: Vec<usize> = tree
        .locate_in_envelope(&envelope)
        .map(|candidate| candidate.data)
        .filter(|&i| boundary.contains(&points[i].location))
        .collect();
    inside.sort_unstable();
    inside
}

/// Write the resolved table as CSV.
pub fn write_markers_csv<W: Write>(markers: &[ResolvedMarker], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for marker in markers {
        wtr.serialize(marker).context("Failed to write marker row")?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}
