use geo::{MultiPolygon, Point};
use serde::Serialize;

/// One row of the boundary file. Several rows may share a name.
#[derive(Debug, Clone)]
pub struct BoundaryRecord {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone)]
pub struct Province {
    pub name: String,
    pub boundary: MultiPolygon<f64>, // EPSG:4326
    pub notable_places: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PointOfInterest {
    pub name: Option<String>,
    pub location: Point<f64>, // x = lon, y = lat
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMarker {
    pub province: String,
    pub place: String,
    pub lat: f64,
    pub lon: f64,
    pub marker_id: String,
}
