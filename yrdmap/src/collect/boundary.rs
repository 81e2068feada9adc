use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::error::MapError;
use crate::geometric::boundary::{BoundaryCollection, NameField};

/// Read a GeoJSON file of city outlines.
/// Properties have no stable order, so the name must be given by attribute name.
pub fn read_geojson(path: &Path, name_field: &NameField) -> Result<BoundaryCollection> {
    let field = match name_field {
        NameField::Name(name) => name.as_str(),
        NameField::Index(idx) => anyhow::bail!(
            "GeoJSON boundaries need a name attribute, got attribute index {}",
            idx
        ),
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read boundaries: {:?}", path))?;
    BoundaryCollection::from_geojson(&bytes, field)
        .with_context(|| format!("Failed to parse boundaries: {:?}", path))
}

/// Read city outlines from a shapefile through GDAL
#[cfg(feature = "gdal")]
pub fn read_shapefile(path: &Path, name_field: &NameField) -> Result<BoundaryCollection> {
    use gdal::vector::LayerAccess;
    use gdal::{Dataset, DatasetOptions, GdalOpenFlags};
    use tracing::{debug, warn};

    use crate::geometric::boundary::CityBoundary;

    let options = DatasetOptions {
        open_flags: GdalOpenFlags::GDAL_OF_VECTOR,
        open_options: Some(&["ENCODING=UTF-8"]),
        ..Default::default()
    };
    let dataset = Dataset::open_ex(path, options)
        .with_context(|| format!("Failed to open shapefile: {:?}", path))?;
    let mut layer = dataset
        .layer(0)
        .context("Failed to get layer from shapefile")?;

    let field_idx = match name_field {
        NameField::Index(idx) => *idx,
        NameField::Name(name) => layer
            .defn()
            .fields()
            .position(|field| field.name() == *name)
            .ok_or_else(|| MapError::MissingColumn(name.clone()))?,
    };

    let mut collection = BoundaryCollection::default();
    for (idx, feature) in layer.features().enumerate() {
        let name = match feature.field_as_string(field_idx) {
            Ok(Some(name)) => name,
            Ok(None) => {
                warn!("Shape {} has no name in field {}", idx, field_idx);
                continue;
            }
            Err(e) => {
                warn!("Failed to read name of shape {}: {}", idx, e);
                continue;
            }
        };

        let Some(geometry) = feature.geometry() else {
            warn!("Shape {} ({}) has no geometry", idx, name);
            continue;
        };
        let geo_geom = geometry
            .to_geo()
            .with_context(|| format!("Failed to convert geometry of {}", name))?;

        match CityBoundary::from_geometry(&name, geo_geom) {
            Some(boundary) => collection.add_boundary(boundary),
            None => debug!("Skipping non-polygon shape {} ({})", idx, name),
        }
    }

    Ok(collection)
}

/// Load boundaries, picking the reader from the file extension
pub fn load_boundaries(path: &Path, name_field: &NameField) -> Result<BoundaryCollection> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let collection = match extension.as_str() {
        "geojson" | "json" => read_geojson(path, name_field)?,
        #[cfg(feature = "gdal")]
        "shp" | "gpkg" => read_shapefile(path, name_field)?,
        other => {
            return Err(MapError::UnsupportedFormat(format!(
                "boundaries {:?} (extension '{}')",
                path, other
            ))
            .into())
        }
    };

    info!("Loaded {} boundaries from {:?}", collection.len(), path);
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"ID": 1, "NAME": "舟山"},
             "geometry": {"type": "MultiPolygon", "coordinates": [
                [[[122.0, 30.0], [122.3, 30.0], [122.3, 30.2], [122.0, 30.0]]],
                [[[122.4, 30.1], [122.6, 30.1], [122.6, 30.3], [122.4, 30.1]]]
             ]}}
        ]
    }"#;

    #[test]
    fn test_read_geojson_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.geojson");
        std::fs::write(&path, BOUNDARIES).unwrap();

        let collection = load_boundaries(&path, &NameField::Name("NAME".to_string())).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.boundaries[0].name, "舟山");
        assert_eq!(collection.boundaries[0].part_count(), 2);
    }

    #[test]
    fn test_geojson_needs_name_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.geojson");
        std::fs::write(&path, BOUNDARIES).unwrap();
        assert!(load_boundaries(&path, &NameField::Index(1)).is_err());
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("does-not-exist.geojson");
        assert!(load_boundaries(path, &NameField::Name("NAME".to_string())).is_err());
    }

    #[cfg(feature = "gdal")]
    fn fixture(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("src/collect/data").join(name)
    }

    #[cfg(feature = "gdal")]
    #[test]
    fn test_read_shapefile_by_index() {
        let collection = load_boundaries(&fixture("cities.shp"), &NameField::Index(1)).unwrap();
        assert_eq!(collection.len(), 2);

        let shanghai = &collection.boundaries[0];
        assert_eq!(shanghai.name, "上海");
        assert_eq!(shanghai.part_count(), 2);
        assert!((shanghai.area() - 0.29).abs() < 1e-9);

        let nanjing = &collection.boundaries[1];
        assert_eq!(nanjing.name, "南京");
        assert_eq!(nanjing.part_count(), 1);
    }

    #[cfg(feature = "gdal")]
    #[test]
    fn test_read_shapefile_by_field_name() {
        let path = fixture("cities.shp");
        let by_name = load_boundaries(&path, &NameField::Name("NAME".to_string())).unwrap();
        let names: Vec<&str> = by_name.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["上海", "南京"]);

        let codes = load_boundaries(&path, &NameField::Index(0)).unwrap();
        assert_eq!(codes.boundaries[0].name, "310000");
    }

    #[cfg(feature = "gdal")]
    #[test]
    fn test_read_shapefile_unknown_field() {
        let err = load_boundaries(&fixture("cities.shp"), &NameField::Name("NAME_CN".to_string()))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::MissingColumn(name)) if name == "NAME_CN"
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_boundaries(Path::new("cities.kml"), &NameField::Index(1)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::UnsupportedFormat(_))
        ));
    }
}
