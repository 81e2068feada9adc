use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::collect::global_variables::{
    get_output_path, DEFAULT_BOUNDARY_PATH, DEFAULT_SHEET, DEFAULT_TABLE_PATH, DEFAULT_TITLE,
    NAME_FIELD_INDEX,
};
use crate::collect::table::ColumnNames;
use crate::error::MapError;
use crate::geo_core::BoundingBox;
use crate::geometric::boundary::{MatchStrategy, NameField};
use crate::geometric::score_scale::{default_steps, OutOfRangePolicy, ScaleStep, ScoreScale};
use crate::render::annotation::AnnotationStyle;
use crate::render::color::parse_color;
use crate::render::raster::{FontSettings, RasterOptions};

/// File the binary looks for in the working directory
pub const CONFIG_FILE: &str = "yrdmap.json";

/// Score -> color table settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub lower_bound: f64,
    pub steps: Vec<ScaleStep>,
    pub out_of_range: OutOfRangePolicy,
    pub fallback_color: String,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        ScaleConfig {
            lower_bound: 0.0,
            steps: default_steps(),
            out_of_range: OutOfRangePolicy::default(),
            fallback_color: "white".to_string(),
        }
    }
}

impl ScaleConfig {
    /// Validate the table and its colors, then build the scale
    pub fn build(&self) -> Result<ScoreScale, MapError> {
        for step in &self.steps {
            parse_color(&step.color)?;
        }
        parse_color(&self.fallback_color)?;
        Ok(ScoreScale::new(self.lower_bound, &self.steps)?
            .with_policy(self.out_of_range)
            .with_fallback_color(&self.fallback_color))
    }
}

/// Settings of one map run. Every field has a default reproducing the
/// May 2021 YRD map, so a config file only lists what differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub title: String,
    /// XLSX workbook or CSV export of the accuracy sheet
    pub table_path: PathBuf,
    pub sheet_name: String,
    pub columns: ColumnNames,
    /// Shapefile or GeoJSON with one feature per city
    pub boundary_path: PathBuf,
    pub name_field: NameField,
    pub match_strategy: MatchStrategy,
    pub output_dir: PathBuf,
    /// Also write a per-city CSV next to the image
    pub write_summary: bool,
    pub extent: BoundingBox,
    pub x_ticks: Vec<f64>,
    pub y_ticks: Vec<f64>,
    pub tick_size_pt: f64,
    pub scale: ScaleConfig,
    pub annotation: AnnotationStyle,
    pub raster: RasterOptions,
    pub font: FontSettings,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            title: DEFAULT_TITLE.to_string(),
            table_path: PathBuf::from(DEFAULT_TABLE_PATH),
            sheet_name: DEFAULT_SHEET.to_string(),
            columns: ColumnNames::default(),
            boundary_path: PathBuf::from(DEFAULT_BOUNDARY_PATH),
            name_field: NameField::Index(NAME_FIELD_INDEX),
            match_strategy: MatchStrategy::default(),
            output_dir: get_output_path(),
            write_summary: false,
            extent: BoundingBox::yrd(),
            x_ticks: vec![115.0, 117.0, 119.0, 121.0],
            y_ticks: vec![27.0, 30.0, 33.0],
            tick_size_pt: 15.0,
            scale: ScaleConfig::default(),
            annotation: AnnotationStyle::default(),
            raster: RasterOptions::default(),
            font: FontSettings::default(),
        }
    }
}

impl MapConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: MapConfig = serde_json::from_str(text).context("Failed to parse map config")?;
        config.scale.build()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        Self::from_json(&text).with_context(|| format!("Invalid config: {:?}", path))
    }

    /// Config from `path` when it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn set_table_path(&mut self, path: impl Into<PathBuf>) {
        self.table_path = path.into();
    }

    pub fn set_boundary_path(&mut self, path: impl Into<PathBuf>, name_field: NameField) {
        self.boundary_path = path.into();
        self.name_field = name_field;
    }

    pub fn set_output_dir(&mut self, path: impl Into<PathBuf>) {
        self.output_dir = path.into();
    }
}
