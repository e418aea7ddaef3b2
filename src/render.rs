//! Figure builder: turns (selected provinces, clicked markers) into a
//! Plotly figure. The province GeoJSON and marker table are built once and
//! shared; every call assembles a fresh figure from them.

use crate::config::StyleConfig;
use crate::session::ClickedMarkerSet;
use crate::types::{Province, ResolvedMarker};
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

// Roughly the geographic centre of Canada.
const CENTER_LAT: f64 = 62.0;
const CENTER_LON: f64 = -96.0;
const DEFAULT_ZOOM: f64 = 2.3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Choroplethmap(ChoroplethTrace),
    Scattermap(ScatterTrace),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethTrace {
    pub name: String,
    pub geojson: Arc<FeatureCollection>,
    pub featureidkey: String,
    pub locations: Vec<String>,
    /// 1 for highlighted provinces, 0 otherwise.
    pub z: Vec<u8>,
    pub zmin: u8,
    pub zmax: u8,
    pub colorscale: Vec<(f64, String)>,
    pub showscale: bool,
    pub text: Vec<String>,
    pub hovertemplate: String,
    pub marker: ChoroplethMarker,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethMarker {
    pub opacity: f64,
    pub line: Line,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub color: String,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterTrace {
    pub name: String,
    pub mode: String,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    /// Marker ids; the browser echoes these back in click events.
    pub customdata: Vec<String>,
    pub text: Vec<String>,
    pub hovertemplate: String,
    pub marker: ScatterMarker,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterMarker {
    pub color: Vec<String>,
    pub size: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub map: MapLayout,
    pub margin: Margin,
    pub uirevision: String,
    pub clickmode: String,
    pub showlegend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayout {
    pub style: String,
    pub center: Center,
    pub zoom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Margin {
    pub l: u32,
    pub r: u32,
    pub t: u32,
    pub b: u32,
}

pub struct FigureBuilder {
    provinces: Vec<Province>,
    geojson: Arc<FeatureCollection>,
    markers: Arc<Vec<ResolvedMarker>>,
    style: StyleConfig,
}

impl FigureBuilder {
    pub fn new(
        provinces: Vec<Province>,
        markers: Arc<Vec<ResolvedMarker>>,
        style: StyleConfig,
    ) -> Self {
        let geojson = Arc::new(provinces_to_geojson(&provinces));
        Self { provinces, geojson, markers, style }
    }

    pub fn provinces(&self) -> &[Province] {
        &self.provinces
    }

    /// Sorted, distinct province names for the dropdown.
    pub fn province_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.provinces.iter().map(|p| p.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn build(&self, selected: &[String], clicked: &ClickedMarkerSet) -> Figure {
        let selected: HashSet<&str> = selected.iter().map(String::as_str).collect();

        Figure {
            data: vec![
                Trace::Choroplethmap(self.province_trace(&selected)),
                Trace::Scattermap(self.marker_trace(clicked)),
            ],
            layout: Layout {
                map: MapLayout {
                    style: self.style.map_style.clone(),
                    center: Center { lat: CENTER_LAT, lon: CENTER_LON },
                    zoom: DEFAULT_ZOOM,
                },
                margin: Margin { l: 0, r: 0, t: 0, b: 0 },
                uirevision: "canada".to_string(),
                clickmode: "event".to_string(),
                showlegend: false,
            },
        }
    }

    fn province_trace(&self, selected: &HashSet<&str>) -> ChoroplethTrace {
        let mut locations = Vec::with_capacity(self.provinces.len());
        let mut z = Vec::with_capacity(self.provinces.len());
        let mut text = Vec::with_capacity(self.provinces.len());

        for province in &self.provinces {
            locations.push(province.name.clone());
            z.push(u8::from(selected.contains(province.name.as_str())));
            text.push(if province.notable_places.is_empty() {
                province.name.clone()
            } else {
                format!(
                    "{}<br>Notable places: {}",
                    province.name,
                    province.notable_places.join(", ")
                )
            });
        }

        ChoroplethTrace {
            name: "Provinces".to_string(),
            geojson: self.geojson.clone(),
            featureidkey: "properties.Province".to_string(),
            locations,
            z,
            zmin: 0,
            zmax: 1,
            colorscale: vec![
                (0.0, self.style.base_color.clone()),
                (1.0, self.style.highlight_color.clone()),
            ],
            showscale: false,
            text,
            hovertemplate: "%{text}<extra></extra>".to_string(),
            marker: ChoroplethMarker {
                opacity: 0.6,
                line: Line { color: self.style.border_color.clone(), width: 1.0 },
            },
        }
    }

    fn marker_trace(&self, clicked: &ClickedMarkerSet) -> ScatterTrace {
        let n = self.markers.len();
        let mut trace = ScatterTrace {
            name: "Notable places".to_string(),
            mode: "markers".to_string(),
            lat: Vec::with_capacity(n),
            lon: Vec::with_capacity(n),
            customdata: Vec::with_capacity(n),
            text: Vec::with_capacity(n),
            hovertemplate: "%{text}<extra></extra>".to_string(),
            marker: ScatterMarker {
                color: Vec::with_capacity(n),
                size: Vec::with_capacity(n),
            },
        };

        for marker in self.markers.iter() {
            let (color, size) = if clicked.contains(&marker.marker_id) {
                (&self.style.clicked_marker_color, self.style.clicked_marker_size)
            } else {
                (&self.style.marker_color, self.style.marker_size)
            };
            trace.lat.push(marker.lat);
            trace.lon.push(marker.lon);
            trace.customdata.push(marker.marker_id.clone());
            trace.text.push(format!("{} ({})", marker.place, marker.province));
            trace.marker.color.push(color.clone());
            trace.marker.size.push(size);
        }

        trace
    }
}

fn provinces_to_geojson(provinces: &[Province]) -> FeatureCollection {
    let features = provinces
        .iter()
        .map(|province| {
            let mut properties = JsonObject::new();
            properties.insert("Province".to_string(), province.name.clone().into());
            properties.insert(
                "Notable Places".to_string(),
                province.notable_places.join(", ").into(),
            );
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&province.boundary))),
                id: Some(Id::String(province.name.clone())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
