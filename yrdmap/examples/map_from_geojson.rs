use anyhow::Result;
use yrdmap::geometric::boundary::NameField;
use yrdmap::{MapConfig, YrdAccuracyMap};

/// Example: render the accuracy map from a CSV export and GeoJSON outlines
///
/// Expects `./data/accuracy.csv` (headers 城市, city, 预报准确率, 预报偏高,
/// 预报偏低, lat, lon), `./data/cities.geojson` with a `NAME` property and a
/// CJK font at `./fonts/SimSun.ttf`.
fn main() -> Result<()> {
    let mut config = MapConfig::default();
    config.set_table_path("./data/accuracy.csv");
    config.set_boundary_path("./data/cities.geojson", NameField::Name("NAME".to_string()));
    config.set_output_dir("./output");

    let map = YrdAccuracyMap::new(config)?.run()?;

    let report = map.report();
    println!("Cities: {}", report.cities);
    println!("Filled: {}", report.matched);
    if !report.unmatched.is_empty() {
        println!("No boundary: {}", report.unmatched.join(", "));
    }

    let image = map.to_png()?;
    println!("Map saved to: {:?}", image);

    Ok(())
}
