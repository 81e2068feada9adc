use std::path::PathBuf;

pub const OUTPUT_PATH: &str = "./output";

pub const DPI: f64 = 300.0;
pub const FIGURE_INCHES: (f64, f64) = (10.0, 10.0);

pub const DEFAULT_TITLE: &str = "2021年5月长三角城市24h预报准确率";
pub const DEFAULT_TABLE_PATH: &str = "./长三角41城市落区图5月预报准确率.xlsx";
pub const DEFAULT_SHEET: &str = "预报准确率";
pub const DEFAULT_BOUNDARY_PATH: &str = "./shp_files/四省一市cities_revised202105.shp";

/// Attribute index of the city name in the boundary shapefile
pub const NAME_FIELD_INDEX: usize = 1;

// Spreadsheet headers
pub const COLUMN_CITY: &str = "城市";
pub const COLUMN_LABEL: &str = "city";
pub const COLUMN_SCORE: &str = "预报准确率";
pub const COLUMN_OVER: &str = "预报偏高";
pub const COLUMN_UNDER: &str = "预报偏低";
pub const COLUMN_LAT: &str = "lat";
pub const COLUMN_LON: &str = "lon";

// Legend texts
pub const COLORBAR_LABEL: &str = "预报准确率  单位：%";
pub const LEGEND_OVER: &str = "预报偏高次数";
pub const LEGEND_UNDER: &str = "预报偏低次数";

pub fn get_output_path() -> PathBuf {
    PathBuf::from(OUTPUT_PATH)
}
