use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::collect::boundary::load_boundaries;
use crate::collect::table::load_table;
use crate::commons::basic_functions::output_file;
use crate::config::MapConfig;
use crate::geo_core::GeoCore;
use crate::geometric::boundary::BoundaryCollection;
use crate::geometric::city::CityTable;
use crate::geometric::score_scale::ScoreScale;
use crate::render::annotation::{annotate, OwnedColumns};
use crate::render::canvas::MapCanvas;
use crate::render::choropleth::{match_and_fill, FillResult};
use crate::render::raster::render_png;

/// What happened to the cities of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub cities: usize,
    pub matched: usize,
    /// Cities with no boundary
    pub unmatched: Vec<String>,
    /// Cities filled with the fallback color
    pub out_of_range: Vec<String>,
    /// Boundaries no city claimed
    pub unclaimed_boundaries: Vec<String>,
    /// Cities positioned outside the map extent
    pub outside_extent: Vec<String>,
}

/// Forecast accuracy map of the YRD cities.
///
/// Loads the accuracy table and the city boundaries, fills each city with
/// its score bucket color, overlays the over/under counts and writes the
/// image.
pub struct YrdAccuracyMap {
    config: MapConfig,
    /// Extent and output directory of the map
    pub geo_core: GeoCore,
    scale: ScoreScale,
    table: Option<CityTable>,
    boundaries: Option<BoundaryCollection>,
    canvas: Option<MapCanvas>,
    fills: Vec<FillResult>,
    report: RunReport,
}

impl YrdAccuracyMap {
    pub fn new(config: MapConfig) -> Result<Self> {
        let scale = config.scale.build().context("Invalid score scale")?;

        let mut geo_core = GeoCore::yrd();
        geo_core.set_bbox(config.extent);
        geo_core.set_output_path(&config.output_dir);

        Ok(YrdAccuracyMap {
            config,
            geo_core,
            scale,
            table: None,
            boundaries: None,
            canvas: None,
            fills: Vec::new(),
            report: RunReport::default(),
        })
    }

    /// Use an already loaded table instead of reading `table_path`
    pub fn set_table(&mut self, table: CityTable) {
        self.table = Some(table);
    }

    /// Use already loaded boundaries instead of reading `boundary_path`
    pub fn set_boundaries(&mut self, boundaries: BoundaryCollection) {
        self.boundaries = Some(boundaries);
    }

    /// Load inputs and compose the map
    pub fn run(mut self) -> Result<Self> {
        self.run_internal()?;
        Ok(self)
    }

    pub fn run_internal(&mut self) -> Result<()> {
        if self.table.is_none() {
            let table = load_table(
                &self.config.table_path,
                Some(&self.config.sheet_name),
                &self.config.columns,
            )?;
            self.table = Some(table);
        }
        if self.boundaries.is_none() {
            let boundaries = load_boundaries(&self.config.boundary_path, &self.config.name_field)?;
            self.boundaries = Some(boundaries);
        }

        self.compose()
    }

    /// Fill and annotate a fresh canvas from the loaded inputs
    fn compose(&mut self) -> Result<()> {
        let table = self.table.as_ref().context("No city table loaded")?;
        let boundaries = self
            .boundaries
            .as_ref()
            .context("No boundaries loaded")?;

        let mut canvas = MapCanvas::new(self.geo_core.clone());
        canvas.set_ticks(
            &self.config.x_ticks,
            &self.config.y_ticks,
            self.config.tick_size_pt,
        );
        for boundary in boundaries.iter() {
            debug!(
                "Boundary {}: {} parts, area {:.4}, extent {:?}",
                boundary.name,
                boundary.part_count(),
                boundary.area(),
                boundary.bounding_rect()
            );
            canvas.add_outline(boundary.geometry.clone());
        }

        let mut report = RunReport {
            cities: table.len(),
            ..RunReport::default()
        };
        let mut fills = Vec::with_capacity(table.len());

        let extent = self.geo_core.get_bbox();
        for city in table.iter() {
            if !extent.contains(city.position()) {
                warn!(
                    "City {} at ({}, {}) lies outside the map extent",
                    city.name, city.longitude, city.latitude
                );
                report.outside_extent.push(city.name.clone());
            }

            let fill = self
                .scale
                .resolve_fill(&city.name, city.forecast_accuracy_score)?;
            if fill.bucket.is_none() {
                report.out_of_range.push(city.name.clone());
            }

            let result = match_and_fill(
                &mut canvas,
                &city.name,
                boundaries,
                &fill,
                self.config.match_strategy,
            );
            if result.is_matched() {
                report.matched += 1;
            } else {
                report.unmatched.push(city.name.clone());
            }
            fills.push(result);
        }

        let columns = OwnedColumns::from_table(table);
        annotate(
            &mut canvas,
            &self.config.title,
            &columns.as_columns(),
            &self.scale,
            &self.config.annotation,
        )?;

        let names: Vec<&str> = table.iter().map(|c| c.name.as_str()).collect();
        report.unclaimed_boundaries = boundaries
            .unclaimed(&names, self.config.match_strategy)
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        for name in &report.unclaimed_boundaries {
            debug!("Boundary {} has no city record", name);
        }

        if !report.unmatched.is_empty() {
            warn!(
                "{} of {} cities have no boundary: {}",
                report.unmatched.len(),
                report.cities,
                report.unmatched.join(", ")
            );
        }
        info!(
            "Composed map: {} cities, {} filled, {} out of range, mean score {:?}",
            report.cities,
            report.matched,
            report.out_of_range.len(),
            table.mean_score()
        );

        self.canvas = Some(canvas);
        self.fills = fills;
        self.report = report;
        Ok(())
    }

    pub fn canvas(&self) -> Option<&MapCanvas> {
        self.canvas.as_ref()
    }

    pub fn table(&self) -> Option<&CityTable> {
        self.table.as_ref()
    }

    pub fn fills(&self) -> &[FillResult] {
        &self.fills
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn scale(&self) -> &ScoreScale {
        &self.scale
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// `<output_dir>/<title>.png`
    pub fn image_path(&self) -> PathBuf {
        output_file(self.geo_core.get_output_path(), &self.config.title, "png")
    }

    /// Rasterize the composed map
    pub fn to_png(&self) -> Result<PathBuf> {
        let canvas = self
            .canvas
            .as_ref()
            .context("No map composed. Call run() first.")?;
        let path = self.image_path();
        render_png(canvas, &path, self.config.raster, &self.config.font)?;
        Ok(path)
    }

    /// One row per city with its fill color and matched parts
    #[cfg(feature = "polars")]
    pub fn to_polars_df(&self) -> Result<polars::prelude::DataFrame> {
        use polars::prelude::*;

        let table = self.table.as_ref().context("No city table loaded")?;
        let mut df = table.to_polars_df()?;

        let colors: Vec<&str> = self.fills.iter().map(|f| f.color.as_str()).collect();
        let parts: Vec<u32> = self.fills.iter().map(|f| f.parts as u32).collect();
        if colors.len() != df.height() {
            anyhow::bail!("Map not composed for the current table. Call run() first.");
        }
        df.with_column(Series::new("color".into(), colors))?;
        df.with_column(Series::new("parts".into(), parts))?;
        Ok(df)
    }

    /// Write the per-city table as `<output_dir>/<title>.csv`
    #[cfg(feature = "polars")]
    pub fn to_summary_csv(&self) -> Result<PathBuf> {
        use polars::prelude::*;

        let mut df = self.to_polars_df()?;
        let output_dir = self.geo_core.get_output_path();
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;
        let path = output_file(output_dir, &self.config.title, "csv");
        let mut file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create summary: {:?}", path))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .with_context(|| format!("Failed to write summary: {:?}", path))?;

        info!("Summary saved to: {:?}", path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::boundary::{CityBoundary, MatchStrategy, NameField};
    use crate::geometric::city::CityRecord;
    use crate::geometric::score_scale::OutOfRangePolicy;
    use crate::render::canvas::FontWeight;
    use geo::{polygon, MultiPolygon};

    const TABLE: &str = "城市,city,预报准确率,预报偏高,预报偏低,lat,lon\nShanghai,Shanghai,45,3,1,31.2,121.5\n";

    const BOUNDARIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"NAME": "Shanghai"},
             "geometry": {"type": "Polygon", "coordinates": [[[121.0, 30.8], [122.0, 30.8], [122.0, 31.8], [121.0, 31.8], [121.0, 30.8]]]}}
        ]
    }"#;

    fn square(x: f64, y: f64) -> geo::Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + 0.5, y: y),
            (x: x + 0.5, y: y + 0.5),
            (x: x, y: y),
        ]
    }

    fn config_in(dir: &std::path::Path) -> MapConfig {
        let table_path = dir.join("accuracy.csv");
        let boundary_path = dir.join("cities.geojson");
        std::fs::write(&table_path, TABLE).unwrap();
        std::fs::write(&boundary_path, BOUNDARIES).unwrap();

        let mut config = MapConfig::default();
        config.set_title("test map");
        config.set_table_path(table_path);
        config.set_boundary_path(boundary_path, NameField::Name("NAME".to_string()));
        config.set_output_dir(dir.join("output"));
        config
    }

    #[test]
    fn test_end_to_end_shanghai() {
        let dir = tempfile::tempdir().unwrap();
        let map = YrdAccuracyMap::new(config_in(dir.path()))
            .unwrap()
            .run()
            .unwrap();

        let canvas = map.canvas().unwrap();
        assert_eq!(canvas.patches().len(), 1);
        assert_eq!(canvas.patches_with_color("tomato").count(), 1);
        assert_eq!(canvas.outlines().len(), 1);

        let over = canvas.labels_with_text("3").next().unwrap();
        let under = canvas.labels_with_text("1").next().unwrap();
        assert_eq!(over.weight, FontWeight::Bold);
        assert_eq!(under.weight, FontWeight::Normal);
        for label in [over, under] {
            assert!((label.position.x - 121.5).abs() < 0.25);
            assert!((label.position.y - 31.2).abs() < 0.25);
        }

        let report = map.report();
        assert_eq!(report.cities, 1);
        assert_eq!(report.matched, 1);
        assert!(report.unmatched.is_empty());
        assert!(report.unclaimed_boundaries.is_empty());
        assert_eq!(map.image_path(), dir.path().join("output").join("test map.png"));
    }

    #[test]
    fn test_report_unmatched_and_out_of_range() {
        let mut map = YrdAccuracyMap::new(MapConfig::default()).unwrap();
        map.set_table(CityTable::new(vec![
            CityRecord::new("上海", 100.0, 31.2, 121.5).with_counts(1, 2),
            CityRecord::new("合肥", 70.0, 31.8, 117.2),
        ]));
        map.set_boundaries(BoundaryCollection::new(vec![
            CityBoundary::new("上海", MultiPolygon::new(vec![square(121.0, 31.0)])),
            CityBoundary::new("南京", MultiPolygon::new(vec![square(118.5, 32.0)])),
        ]));
        map.run_internal().unwrap();

        let report = map.report();
        assert_eq!(report.matched, 1);
        assert_eq!(report.unmatched, vec!["合肥".to_string()]);
        assert_eq!(report.out_of_range, vec!["上海".to_string()]);
        assert_eq!(report.unclaimed_boundaries, vec!["南京".to_string()]);

        // Fallback keeps the historical white fill
        let canvas = map.canvas().unwrap();
        assert_eq!(canvas.patches_with_color("white").count(), 1);
        assert_eq!(map.fills()[1].patches, 0);
    }

    #[test]
    fn test_reject_policy_fails_run() {
        let mut config = MapConfig::default();
        config.scale.out_of_range = OutOfRangePolicy::Reject;
        let mut map = YrdAccuracyMap::new(config).unwrap();
        map.set_table(CityTable::new(vec![CityRecord::new("上海", 101.0, 31.2, 121.5)]));
        map.set_boundaries(BoundaryCollection::default());
        assert!(map.run_internal().is_err());
        assert!(map.canvas().is_none());
    }

    #[test]
    fn test_contains_strategy_run() {
        let mut config = MapConfig::default();
        config.match_strategy = MatchStrategy::Contains;
        let mut map = YrdAccuracyMap::new(config).unwrap();
        map.set_table(CityTable::new(vec![CityRecord::new("上海市", 85.0, 31.2, 121.5)]));
        map.set_boundaries(BoundaryCollection::new(vec![CityBoundary::new(
            "上海",
            MultiPolygon::new(vec![square(121.0, 31.0)]),
        )]));
        map.run_internal().unwrap();
        assert_eq!(map.canvas().unwrap().patches_with_color("blue").count(), 1);
    }

    #[test]
    fn test_end_to_end_png() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        let fonts = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("fonts");
        config.font.family = "DejaVu Sans".to_string();
        config.font.regular_path = Some(fonts.join("DejaVuSans.ttf"));
        config.font.bold_path = Some(fonts.join("DejaVuSans-Bold.ttf"));
        config.raster.figure_inches = (4.0, 4.0);
        config.raster.dpi = 100.0;

        let map = YrdAccuracyMap::new(config).unwrap().run().unwrap();
        let path = map.to_png().unwrap();
        assert_eq!(path, dir.path().join("output").join("test map.png"));

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        assert_eq!(u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]), 400);
    }

    #[test]
    fn test_output_dir_from_config() {
        let mut config = MapConfig::default();
        config.set_output_dir("maps/2021-05");
        let map = YrdAccuracyMap::new(config).unwrap();
        assert_eq!(map.geo_core.get_output_path(), std::path::Path::new("maps/2021-05"));
        assert!(map.image_path().starts_with("maps/2021-05"));
    }

    #[test]
    fn test_report_outside_extent() {
        let mut map = YrdAccuracyMap::new(MapConfig::default()).unwrap();
        map.set_table(CityTable::new(vec![
            CityRecord::new("上海", 75.0, 31.2, 121.5),
            CityRecord::new("北京", 75.0, 39.9, 116.4),
        ]));
        map.set_boundaries(BoundaryCollection::default());
        map.run_internal().unwrap();
        assert_eq!(map.report().outside_extent, vec!["北京".to_string()]);
    }

    #[test]
    fn test_to_png_requires_run() {
        let map = YrdAccuracyMap::new(MapConfig::default()).unwrap();
        assert!(map.to_png().is_err());
    }

    #[cfg(feature = "polars")]
    #[test]
    fn test_summary_csv() {
        let dir = tempfile::tempdir().unwrap();
        let map = YrdAccuracyMap::new(config_in(dir.path()))
            .unwrap()
            .run()
            .unwrap();

        let df = map.to_polars_df().unwrap();
        assert_eq!(df.height(), 1);
        assert!(df.column("color").is_ok());

        let path = map.to_summary_csv().unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("tomato"));
        assert!(text.lines().next().unwrap().contains("预报准确率"));
    }
}
