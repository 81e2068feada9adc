use geo::{coord, Coord};
#[cfg(feature = "polars")]
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::MapError;

/// One row of the forecast accuracy table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    /// City name used to find the boundary (column 城市)
    pub name: String,
    /// Name drawn on the map (column city)
    pub label: String,
    /// Forecast accuracy in percent
    pub forecast_accuracy_score: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Forecasts whose AQI was higher than observed
    pub over_estimate_count: i64,
    /// Forecasts whose AQI was lower than observed
    pub under_estimate_count: i64,
}

impl CityRecord {
    pub fn new(name: &str, score: f64, latitude: f64, longitude: f64) -> Self {
        CityRecord {
            name: name.to_string(),
            label: name.to_string(),
            forecast_accuracy_score: score,
            latitude,
            longitude,
            over_estimate_count: 0,
            under_estimate_count: 0,
        }
    }

    pub fn with_counts(mut self, over: i64, under: i64) -> Self {
        self.over_estimate_count = over;
        self.under_estimate_count = under;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Map position of the city
    pub fn position(&self) -> Coord<f64> {
        coord! { x: self.longitude, y: self.latitude }
    }

    /// Reject rows that cannot be placed on the map
    pub fn validate(&self, row: usize) -> Result<(), MapError> {
        if self.name.is_empty() {
            return Err(MapError::InvalidRecord {
                row,
                reason: "empty city name".to_string(),
            });
        }
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(MapError::InvalidRecord {
                row,
                reason: format!("{} has no valid coordinates", self.name),
            });
        }
        if self.over_estimate_count < 0 || self.under_estimate_count < 0 {
            return Err(MapError::InvalidRecord {
                row,
                reason: format!("{} has negative estimate counts", self.name),
            });
        }
        Ok(())
    }
}

/// All city rows of one run, in table order
#[derive(Debug, Clone, Default)]
pub struct CityTable {
    pub records: Vec<CityRecord>,
}

impl CityTable {
    pub fn new(records: Vec<CityRecord>) -> Self {
        CityTable { records }
    }

    pub fn add_record(&mut self, record: CityRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CityRecord> {
        self.records.iter()
    }

    pub fn get(&self, name: &str) -> Option<&CityRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn labels(&self) -> Vec<String> {
        self.records.iter().map(|r| r.label.clone()).collect()
    }

    pub fn latitudes(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.latitude).collect()
    }

    pub fn longitudes(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.longitude).collect()
    }

    pub fn over_counts(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.over_estimate_count).collect()
    }

    pub fn under_counts(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.under_estimate_count).collect()
    }

    /// Mean accuracy over the finite scores
    pub fn mean_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .records
            .iter()
            .map(|r| r.forecast_accuracy_score)
            .filter(|s| s.is_finite())
            .collect();
        if scores.is_empty() {
            return None;
        }
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Convert to a Polars DataFrame, one row per city
    #[cfg(feature = "polars")]
    pub fn to_polars_df(&self) -> anyhow::Result<DataFrame> {
        let names: Vec<&str> = self.records.iter().map(|r| r.name.as_str()).collect();
        let labels: Vec<&str> = self.records.iter().map(|r| r.label.as_str()).collect();
        let scores: Vec<f64> = self
            .records
            .iter()
            .map(|r| r.forecast_accuracy_score)
            .collect();

        let df = df![
            "城市" => names,
            "city" => labels,
            "预报准确率" => scores,
            "lat" => self.latitudes(),
            "lon" => self.longitudes(),
            "预报偏高" => self.over_counts(),
            "预报偏低" => self.under_counts(),
        ]?;

        Ok(df)
    }
}
