use crate::config::AppConfig;
use crate::types::{BoundaryRecord, PointOfInterest};
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use geojson::{FeatureCollection, GeoJson, JsonObject};
use shapefile::Reader;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct GeoData {
    pub boundaries: Vec<BoundaryRecord>,
    pub points: Vec<PointOfInterest>,
}

/// Load province boundaries and points of interest.
///
/// Missing boundaries abort startup. Missing or broken points only cost the
/// markers, so they degrade to an empty collection.
pub fn load_data(config: &AppConfig) -> Result<GeoData> {
    let boundary_path = config.boundary_path();
    let points_path = config.points_path();

    if let Err(e) =
        ensure_extracted(&config.archive_path(), &config.data_dir(), &boundary_path)
    {
        warn!(error = %format!("{:#}", e), "failed to extract data archive");
    }

    let boundaries = load_boundaries(&boundary_path, &config.input.province_field)
        .with_context(|| format!("Failed to load province boundaries from {:?}", boundary_path))?;
    info!(count = boundaries.len(), "loaded boundary records");

    let points = match load_points(&points_path, &config.input.name_field) {
        Ok(points) => {
            info!(count = points.len(), "loaded points of interest");
            points
        }
        Err(e) => {
            warn!(
                path = ?points_path,
                error = %format!("{:#}", e),
                "points of interest unavailable, continuing without markers"
            );
            Vec::new()
        }
    };

    Ok(GeoData { boundaries, points })
}

/// Extract `archive` into `data_dir` when the boundary file is missing.
/// Returns whether an extraction happened.
///
/// Only the boundary file decides: an archive without a points file must not
/// be unpacked again on every start.
pub fn ensure_extracted(archive: &Path, data_dir: &Path, boundary: &Path) -> Result<bool> {
    if boundary.exists() {
        debug!(dir = ?data_dir, "boundary file present, skipping extraction");
        return Ok(false);
    }
    if !archive.exists() {
        warn!(archive = ?archive, "boundary file missing and no archive to extract");
        return Ok(false);
    }

    info!(archive = ?archive, dir = ?data_dir, "extracting data archive");
    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;
    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive: {:?}", archive))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read archive: {:?}", archive))?;
    zip.extract(data_dir)
        .with_context(|| format!("Failed to extract archive into {:?}", data_dir))?;

    Ok(true)
}

pub fn load_boundaries(path: &Path, name_field: &str) -> Result<Vec<BoundaryRecord>> {
    let extension = path.extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Boundary file has no extension"))?;

    match extension.as_str() {
        "shp" => load_shapefile_boundaries(path, name_field),
        "json" | "geojson" => load_geojson_boundaries(path, name_field),
        _ => Err(anyhow!("Unsupported geometry format: {}", extension)),
    }
}

fn load_shapefile_boundaries(path: &Path, name_field: &str) -> Result<Vec<BoundaryRecord>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut records = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let name_value = record.get(name_field)
            .ok_or_else(|| anyhow!("Name column '{}' not found in Shapefile", name_field))?;

        let name = match name_value {
            shapefile::dbase::FieldValue::Character(Some(s)) => s.trim().to_string(),
            shapefile::dbase::FieldValue::Character(None) => continue,
            _ => return Err(anyhow!("Shapefile name column must be a string")),
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue,
        };

        records.push(BoundaryRecord { name, geometry });
    }

    Ok(records)
}

fn read_feature_collection(path: &Path) -> Result<FeatureCollection> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let reader = BufReader::new(file);

    // Loads the whole file into memory.
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    match geojson {
        GeoJson::FeatureCollection(fc) => {
            check_crs(fc.foreign_members.as_ref(), path);
            Ok(fc)
        }
        _ => Err(anyhow!("GeoJSON must be a FeatureCollection")),
    }
}

/// Everything is treated as EPSG:4326. A legacy `crs` member naming some
/// other system is reported but not reprojected.
fn check_crs(foreign_members: Option<&JsonObject>, path: &Path) {
    let Some(crs_name) = foreign_members
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(|name| name.as_str())
    else {
        return;
    };

    if !is_wgs84(crs_name) {
        warn!(path = ?path, crs = crs_name, "unexpected CRS, treating coordinates as EPSG:4326");
    }
}

fn is_wgs84(crs_name: &str) -> bool {
    let upper = crs_name.to_uppercase();
    upper.ends_with("4326") || upper.ends_with("CRS84")
}

fn load_geojson_boundaries(path: &Path, name_field: &str) -> Result<Vec<BoundaryRecord>> {
    let collection = read_feature_collection(path)?;
    let mut records = Vec::new();

    for feature in collection.features {
        let name = match feature.property(name_field) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            _ => continue,
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let geo_geom: geo::Geometry<f64> = geom.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match geo_geom {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue,
                }
            }
            None => continue,
        };

        records.push(BoundaryRecord { name, geometry });
    }

    if records.is_empty() {
        return Err(anyhow!("No named polygon features with field '{}'", name_field));
    }

    Ok(records)
}

pub fn load_points(path: &Path, name_field: &str) -> Result<Vec<PointOfInterest>> {
    let collection = read_feature_collection(path)?;
    let mut points = Vec::with_capacity(collection.features.len());

    for feature in collection.features {
        let location = match feature.geometry.as_ref().map(|g| &g.value) {
            Some(geojson::Value::Point(coords)) if coords.len() >= 2 => {
                geo::Point::new(coords[0], coords[1])
            }
            _ => continue,
        };

        let name = match feature.property(name_field) {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => None,
        };

        points.push(PointOfInterest { name, location });
    }

    Ok(points)
}
