use anyhow::{Context, Result};
use geo::{Area, BoundingRect, MultiPolygon, Rect};
use geojson::{Feature as GeoJsonFeature, GeoJson};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::commons::basic_functions::normalize_name;

/// Where the city name lives in a feature's attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NameField {
    /// Attribute position, as stored in the shapefile record
    Index(usize),
    /// Attribute name
    Name(String),
}

/// How a city name from the table is compared with boundary names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Trimmed names are equal
    #[default]
    Exact,
    /// The boundary name appears inside the city name (e.g. 上海 in 上海市)
    Contains,
}

impl MatchStrategy {
    pub fn matches(&self, boundary_name: &str, city_name: &str) -> bool {
        let boundary_name = normalize_name(boundary_name);
        let city_name = normalize_name(city_name);
        if boundary_name.is_empty() {
            return false;
        }
        match self {
            MatchStrategy::Exact => boundary_name == city_name,
            MatchStrategy::Contains => city_name.contains(boundary_name),
        }
    }
}

/// A named city outline. Cities made of several islands or exclaves keep
/// all their parts in one MultiPolygon.
#[derive(Debug, Clone, PartialEq)]
pub struct CityBoundary {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

impl CityBoundary {
    pub fn new(name: &str, geometry: MultiPolygon<f64>) -> Self {
        CityBoundary {
            name: normalize_name(name).to_string(),
            geometry,
        }
    }

    /// Convert any geo geometry, keeping only polygonal ones
    pub fn from_geometry(name: &str, geometry: geo::Geometry<f64>) -> Option<Self> {
        let polygons = match geometry {
            geo::Geometry::Polygon(poly) => MultiPolygon::new(vec![poly]),
            geo::Geometry::MultiPolygon(mp) => mp,
            geo::Geometry::GeometryCollection(gc) => {
                let mut parts = Vec::new();
                for geom in gc {
                    match geom {
                        geo::Geometry::Polygon(poly) => parts.push(poly),
                        geo::Geometry::MultiPolygon(mp) => parts.extend(mp.0),
                        _ => {}
                    }
                }
                if parts.is_empty() {
                    return None;
                }
                MultiPolygon::new(parts)
            }
            _ => return None,
        };
        Some(CityBoundary::new(name, polygons))
    }

    /// Number of polygon parts
    pub fn part_count(&self) -> usize {
        self.geometry.0.len()
    }

    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

/// All boundaries of the map, in source order
#[derive(Debug, Clone, Default)]
pub struct BoundaryCollection {
    pub boundaries: Vec<CityBoundary>,
}

impl BoundaryCollection {
    pub fn new(boundaries: Vec<CityBoundary>) -> Self {
        BoundaryCollection { boundaries }
    }

    pub fn add_boundary(&mut self, boundary: CityBoundary) {
        self.boundaries.push(boundary);
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CityBoundary> {
        self.boundaries.iter()
    }

    /// Every boundary belonging to `city_name`, in source order
    pub fn matching<'a>(
        &'a self,
        city_name: &'a str,
        strategy: MatchStrategy,
    ) -> impl Iterator<Item = &'a CityBoundary> + 'a {
        self.boundaries
            .iter()
            .filter(move |b| strategy.matches(&b.name, city_name))
    }

    /// Names of boundaries no city in `city_names` claims
    pub fn unclaimed<'a>(&'a self, city_names: &[&str], strategy: MatchStrategy) -> Vec<&'a str> {
        self.boundaries
            .iter()
            .filter(|b| !city_names.iter().any(|c| strategy.matches(&b.name, c)))
            .map(|b| b.name.as_str())
            .collect()
    }

    /// Parse boundaries from GeoJSON, reading the name from the `name_field` property
    pub fn from_geojson(geojson_data: &[u8], name_field: &str) -> Result<Self> {
        let geojson_str =
            std::str::from_utf8(geojson_data).context("GeoJSON data is not valid UTF-8")?;
        let geojson: GeoJson = geojson_str.parse().context("Failed to parse GeoJSON")?;

        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            _ => anyhow::bail!("GeoJSON must be a Feature or FeatureCollection"),
        };

        let mut collection = BoundaryCollection::default();
        for (idx, feature) in features.iter().enumerate() {
            match Self::geojson_feature_to_boundary(feature, name_field) {
                Ok(Some(boundary)) => collection.add_boundary(boundary),
                Ok(None) => debug!("Skipping non-polygon feature {}", idx),
                Err(e) => warn!("Failed to read boundary feature {}: {:#}", idx, e),
            }
        }

        Ok(collection)
    }

    fn geojson_feature_to_boundary(
        feature: &GeoJsonFeature,
        name_field: &str,
    ) -> Result<Option<CityBoundary>> {
        let name = match feature.property(name_field) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => {
                anyhow::bail!("Feature has no '{}' property", name_field)
            }
            Some(other) => other.to_string(),
        };

        let geometry = feature
            .geometry
            .as_ref()
            .context("Feature has no geometry")?;
        let geo_geom: geo::Geometry<f64> = geometry
            .try_into()
            .context("Failed to convert GeoJSON geometry to geo::Geometry")?;

        Ok(CityBoundary::from_geometry(&name, geo_geom))
    }
}
