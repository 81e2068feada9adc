use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::collect::global_variables::{
    COLUMN_CITY, COLUMN_LABEL, COLUMN_LAT, COLUMN_LON, COLUMN_OVER, COLUMN_SCORE, COLUMN_UNDER,
    DEFAULT_SHEET,
};
use crate::commons::basic_functions::{decode_text, normalize_name};
use crate::error::MapError;
use crate::geometric::city::{CityRecord, CityTable};

/// Header names of the accuracy table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub city: String,
    /// Optional display-name column; the city column is used when absent
    pub label: String,
    pub score: String,
    pub over: String,
    pub under: String,
    pub lat: String,
    pub lon: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames {
            city: COLUMN_CITY.to_string(),
            label: COLUMN_LABEL.to_string(),
            score: COLUMN_SCORE.to_string(),
            over: COLUMN_OVER.to_string(),
            under: COLUMN_UNDER.to_string(),
            lat: COLUMN_LAT.to_string(),
            lon: COLUMN_LON.to_string(),
        }
    }
}

/// Positions of the wanted columns in a header row
#[derive(Debug, Clone, Copy, PartialEq)]
struct ColumnIndex {
    city: usize,
    label: Option<usize>,
    score: usize,
    over: usize,
    under: usize,
    lat: usize,
    lon: usize,
}

impl ColumnIndex {
    fn resolve<'a, I>(headers: I, names: &ColumnNames) -> Result<Self, MapError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let headers: Vec<&str> = headers.into_iter().map(normalize_name).collect();
        let find = |name: &str| headers.iter().position(|h| *h == name);
        let require =
            |name: &str| find(name).ok_or_else(|| MapError::MissingColumn(name.to_string()));

        Ok(ColumnIndex {
            city: require(&names.city)?,
            label: find(&names.label),
            score: require(&names.score)?,
            over: require(&names.over)?,
            under: require(&names.under)?,
            lat: require(&names.lat)?,
            lon: require(&names.lon)?,
        })
    }
}

/// Cell values of one table row before validation
#[derive(Debug, Clone, Default)]
struct RawRow {
    name: Option<String>,
    label: Option<String>,
    score: Option<f64>,
    lat: Option<f64>,
    lon: Option<f64>,
    over: Option<f64>,
    under: Option<f64>,
}

impl RawRow {
    fn is_blank(&self) -> bool {
        self.name.is_none()
            && self.score.is_none()
            && self.lat.is_none()
            && self.lon.is_none()
            && self.over.is_none()
            && self.under.is_none()
    }

    /// Returns None for blank trailing rows
    fn into_record(self, row: usize) -> Result<Option<CityRecord>, MapError> {
        if self.is_blank() {
            return Ok(None);
        }

        let name = self.name.ok_or_else(|| MapError::InvalidRecord {
            row,
            reason: "missing city name".to_string(),
        })?;
        let label = self.label.unwrap_or_else(|| name.clone());
        let lat = self.lat.ok_or_else(|| MapError::InvalidRecord {
            row,
            reason: format!("{} has no latitude", name),
        })?;
        let lon = self.lon.ok_or_else(|| MapError::InvalidRecord {
            row,
            reason: format!("{} has no longitude", name),
        })?;
        let score = self.score.unwrap_or_else(|| {
            warn!("{} has no forecast accuracy score", name);
            f64::NAN
        });
        let over = count_value(self.over, &name, "over", row)?;
        let under = count_value(self.under, &name, "under", row)?;

        let record = CityRecord::new(&name, score, lat, lon)
            .with_label(&label)
            .with_counts(over, under);
        record.validate(row)?;
        Ok(Some(record))
    }
}

fn count_value(value: Option<f64>, name: &str, kind: &str, row: usize) -> Result<i64, MapError> {
    match value {
        None => {
            warn!("{} has no {}-estimate count, using 0", name, kind);
            Ok(0)
        }
        Some(v) if v.is_finite() && v.fract() == 0.0 => Ok(v as i64),
        Some(v) => Err(MapError::InvalidRecord {
            row,
            reason: format!("{}-estimate count {} of {} is not a whole number", kind, v, name),
        }),
    }
}

fn text_cell(value: Option<&str>) -> Option<String> {
    value
        .map(normalize_name)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn number_cell(value: Option<&str>, column: &str, row: usize) -> Result<Option<f64>, MapError> {
    match text_cell(value) {
        None => Ok(None),
        Some(s) => s
            .trim_end_matches('%')
            .parse::<f64>()
            .map(Some)
            .map_err(|_| MapError::InvalidRecord {
                row,
                reason: format!("'{}' in column {} is not a number", s, column),
            }),
    }
}

/// Parse a CSV export of the accuracy sheet
pub fn parse_csv(text: &str, names: &ColumnNames) -> Result<CityTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr.headers().context("Failed to read CSV header")?.clone();
    let index = ColumnIndex::resolve(headers.iter(), names)?;

    let mut table = CityTable::default();
    for (row, result) in rdr.records().enumerate() {
        let record: StringRecord = result.context("Failed to read CSV record")?;
        let raw = RawRow {
            name: text_cell(record.get(index.city)),
            label: index.label.and_then(|i| text_cell(record.get(i))),
            score: number_cell(record.get(index.score), &names.score, row)?,
            lat: number_cell(record.get(index.lat), &names.lat, row)?,
            lon: number_cell(record.get(index.lon), &names.lon, row)?,
            over: number_cell(record.get(index.over), &names.over, row)?,
            under: number_cell(record.get(index.under), &names.under, row)?,
        };
        match raw.into_record(row)? {
            Some(city) => table.add_record(city),
            None => debug!("Skipping blank row {}", row),
        }
    }

    Ok(table)
}

/// Read a CSV file, UTF-8 or GB18030
pub fn read_csv(path: &Path, names: &ColumnNames) -> Result<CityTable> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read table: {:?}", path))?;
    parse_csv(&decode_text(&bytes), names)
        .with_context(|| format!("Failed to parse table: {:?}", path))
}

/// Read one sheet of an XLSX workbook through GDAL's XLSX driver
#[cfg(feature = "gdal")]
pub fn read_xlsx(path: &Path, sheet: &str, names: &ColumnNames) -> Result<CityTable> {
    use gdal::vector::LayerAccess;
    use gdal::{Dataset, DatasetOptions, GdalOpenFlags};

    let options = DatasetOptions {
        open_flags: GdalOpenFlags::GDAL_OF_VECTOR,
        open_options: Some(&["HEADERS=FORCE", "FIELD_TYPES=AUTO"]),
        ..Default::default()
    };
    let dataset = Dataset::open_ex(path, options)
        .with_context(|| format!("Failed to open workbook: {:?}", path))?;
    let mut layer = dataset
        .layer_by_name(sheet)
        .with_context(|| format!("Sheet '{}' not found in {:?}", sheet, path))?;

    let headers: Vec<String> = layer.defn().fields().map(|field| field.name()).collect();
    let index = ColumnIndex::resolve(headers.iter().map(|h| h.as_str()), names)?;

    let mut table = CityTable::default();
    for (row, feature) in layer.features().enumerate() {
        let text = |idx: usize| -> Result<Option<String>> {
            Ok(text_cell(feature.field_as_string(idx)?.as_deref()))
        };
        let number = |idx: usize| -> Result<Option<f64>> {
            Ok(feature.field_as_double(idx)?.filter(|v| !v.is_nan()))
        };

        let raw = RawRow {
            name: text(index.city)?,
            label: match index.label {
                Some(i) => text(i)?,
                None => None,
            },
            score: number(index.score)?,
            lat: number(index.lat)?,
            lon: number(index.lon)?,
            over: number(index.over)?,
            under: number(index.under)?,
        };
        match raw.into_record(row)? {
            Some(city) => table.add_record(city),
            None => debug!("Skipping blank row {}", row),
        }
    }

    Ok(table)
}

/// Load the accuracy table, picking the reader from the file extension
#[cfg_attr(not(feature = "gdal"), allow(unused_variables))]
pub fn load_table(path: &Path, sheet: Option<&str>, names: &ColumnNames) -> Result<CityTable> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let table = match extension.as_str() {
        "csv" => read_csv(path, names)?,
        #[cfg(feature = "gdal")]
        "xlsx" | "ods" => read_xlsx(path, sheet.unwrap_or(DEFAULT_SHEET), names)?,
        other => {
            return Err(MapError::UnsupportedFormat(format!(
                "table {:?} (extension '{}')",
                path, other
            ))
            .into());
        }
    };

    info!("Loaded {} cities from {:?}", table.len(), path);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "城市,city,预报准确率,预报偏高,预报偏低,lat,lon";

    #[cfg(feature = "gdal")]
    fn workbook() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("src/collect/data/accuracy.xlsx")
    }

    #[cfg(feature = "gdal")]
    #[test]
    fn test_read_xlsx_default_sheet() {
        let table = load_table(&workbook(), None, &ColumnNames::default()).unwrap();
        assert_eq!(table.len(), 2);

        let shanghai = table.get("上海").unwrap();
        assert_eq!(shanghai.label, "Shanghai");
        assert_eq!(shanghai.forecast_accuracy_score, 45.0);
        assert_eq!(shanghai.over_estimate_count, 3);
        assert_eq!(shanghai.under_estimate_count, 1);
        assert!((shanghai.longitude - 121.5).abs() < 1e-9);

        let nanjing = table.get("南京").unwrap();
        assert_eq!(nanjing.forecast_accuracy_score, 82.5);
        assert_eq!(nanjing.under_estimate_count, 4);
    }

    #[cfg(feature = "gdal")]
    #[test]
    fn test_read_xlsx_wrong_sheet() {
        // The first sheet holds notes without the accuracy columns
        assert!(load_table(&workbook(), Some("说明"), &ColumnNames::default()).is_err());
        assert!(load_table(&workbook(), Some("Sheet9"), &ColumnNames::default()).is_err());
    }

    #[cfg(not(feature = "gdal"))]
    #[test]
    fn test_xlsx_needs_gdal() {
        let err = load_table(Path::new("accuracy.xlsx"), Some("预报准确率"), &ColumnNames::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_parse_csv() {
        let text = format!(
            "{}\n上海,Shanghai,45,3,1,31.2,121.5\n南京,Nanjing,82.5,0,4,32.05,118.78\n",
            HEADER
        );
        let table = parse_csv(&text, &ColumnNames::default()).unwrap();
        assert_eq!(table.len(), 2);
        let shanghai = table.get("上海").unwrap();
        assert_eq!(shanghai.label, "Shanghai");
        assert_eq!(shanghai.forecast_accuracy_score, 45.0);
        assert_eq!(shanghai.over_estimate_count, 3);
        assert_eq!(shanghai.under_estimate_count, 1);
    }

    #[test]
    fn test_parse_csv_column_order_and_optional_label() {
        let text = "lon,lat,预报偏低,预报偏高,预报准确率,城市\n121.5,31.2,1,3,45.0%,上海\n";
        let table = parse_csv(text, &ColumnNames::default()).unwrap();
        let shanghai = table.get("上海").unwrap();
        assert_eq!(shanghai.label, "上海");
        assert_eq!(shanghai.longitude, 121.5);
        assert_eq!(shanghai.forecast_accuracy_score, 45.0);
    }

    #[test]
    fn test_parse_csv_missing_column() {
        let text = "城市,预报准确率,lat,lon\n上海,45,31.2,121.5\n";
        let err = parse_csv(text, &ColumnNames::default()).unwrap_err();
        let map_err = err.downcast_ref::<MapError>().unwrap();
        assert_eq!(map_err, &MapError::MissingColumn("预报偏高".to_string()));
    }

    #[test]
    fn test_parse_csv_blank_and_missing_values() {
        let text = format!("{}\n上海,,,3,1,31.2,121.5\n,,,,,,\n", HEADER);
        let table = parse_csv(&text, &ColumnNames::default()).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.records[0].forecast_accuracy_score.is_nan());
    }

    #[test]
    fn test_parse_csv_invalid_values() {
        let text = format!("{}\n上海,,abc,3,1,31.2,121.5\n", HEADER);
        assert!(parse_csv(&text, &ColumnNames::default()).is_err());

        let text = format!("{}\n上海,,45,2.5,1,31.2,121.5\n", HEADER);
        assert!(parse_csv(&text, &ColumnNames::default()).is_err());

        let text = format!("{}\n上海,,45,3,1,,121.5\n", HEADER);
        assert!(parse_csv(&text, &ColumnNames::default()).is_err());
    }

    #[test]
    fn test_read_csv_gb18030() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accuracy.csv");
        let text = format!("{}\n杭州,Hangzhou,66,2,2,30.27,120.15\n", HEADER);
        let (encoded, _, _) = encoding_rs::GB18030.encode(&text);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&encoded)
            .unwrap();

        let table = load_table(&path, None, &ColumnNames::default()).unwrap();
        assert_eq!(table.get("杭州").unwrap().label, "Hangzhou");
    }

    #[test]
    fn test_load_table_unsupported() {
        let err = load_table(Path::new("accuracy.txt"), None, &ColumnNames::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::UnsupportedFormat(_))
        ));
    }
}
