use geo::coord;
use serde::{Deserialize, Serialize};

use crate::collect::global_variables::{COLORBAR_LABEL, LEGEND_OVER, LEGEND_UNDER};
use crate::error::MapError;
use crate::geometric::city::CityTable;
use crate::geometric::score_scale::ScoreScale;
use crate::render::canvas::{Colorbar, FigureRect, HAlign, MapCanvas, TextLabel, VAlign};

/// Placement and sizes of the overlay texts.
/// Offsets are in degrees relative to the city position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationStyle {
    pub title_size_pt: f64,
    pub count_size_pt: f64,
    pub over_offset: (f64, f64),
    pub under_offset: (f64, f64),
    pub name_size_pt: f64,
    pub name_offset: (f64, f64),
    pub legend_size_pt: f64,
    pub legend_over_text: String,
    pub legend_over_position: (f64, f64),
    pub legend_under_text: String,
    pub legend_under_position: (f64, f64),
    pub colorbar_label: String,
    pub colorbar_label_size_pt: f64,
    /// x, y, width, height as figure fractions
    pub colorbar_rect: (f64, f64, f64, f64),
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        AnnotationStyle {
            title_size_pt: 15.0,
            count_size_pt: 12.0,
            over_offset: (-0.2, 0.05),
            under_offset: (-0.2, -0.13),
            name_size_pt: 7.0,
            name_offset: (-0.05, 0.0),
            legend_size_pt: 12.0,
            legend_over_text: LEGEND_OVER.to_string(),
            legend_over_position: (120.3, 25.4),
            legend_under_text: LEGEND_UNDER.to_string(),
            legend_under_position: (120.3, 25.1),
            colorbar_label: COLORBAR_LABEL.to_string(),
            colorbar_label_size_pt: 10.0,
            colorbar_rect: (0.78, 0.14, 0.02, 0.2),
        }
    }
}

/// Parallel per-city columns drawn by the overlay
#[derive(Debug, Clone, Copy)]
pub struct AnnotationColumns<'a> {
    pub labels: &'a [String],
    pub latitudes: &'a [f64],
    pub longitudes: &'a [f64],
    pub over: &'a [i64],
    pub under: &'a [i64],
}

impl<'a> AnnotationColumns<'a> {
    /// Number of cities, or an error naming the columns that disagree
    pub fn checked_len(&self) -> Result<usize, MapError> {
        let lengths = [
            ("labels", self.labels.len()),
            ("latitudes", self.latitudes.len()),
            ("longitudes", self.longitudes.len()),
            ("over", self.over.len()),
            ("under", self.under.len()),
        ];
        let expected = lengths[0].1;
        if lengths.iter().all(|(_, len)| *len == expected) {
            return Ok(expected);
        }
        let detail = lengths
            .iter()
            .map(|(name, len)| format!("{}={}", name, len))
            .collect::<Vec<_>>()
            .join(", ");
        Err(MapError::MisalignedColumns(detail))
    }
}

/// Owned columns taken from a city table
#[derive(Debug, Clone, Default)]
pub struct OwnedColumns {
    pub labels: Vec<String>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub over: Vec<i64>,
    pub under: Vec<i64>,
}

impl OwnedColumns {
    pub fn from_table(table: &CityTable) -> Self {
        OwnedColumns {
            labels: table.labels(),
            latitudes: table.latitudes(),
            longitudes: table.longitudes(),
            over: table.over_counts(),
            under: table.under_counts(),
        }
    }

    pub fn as_columns(&self) -> AnnotationColumns<'_> {
        AnnotationColumns {
            labels: &self.labels,
            latitudes: &self.latitudes,
            longitudes: &self.longitudes,
            over: &self.over,
            under: &self.under,
        }
    }
}

/// Draw the title, over/under counts, city names, legend keys and colorbar.
///
/// Columns are checked before anything is added, so a misaligned input
/// leaves the canvas as it was.
pub fn annotate(
    canvas: &mut MapCanvas,
    title: &str,
    columns: &AnnotationColumns<'_>,
    scale: &ScoreScale,
    style: &AnnotationStyle,
) -> Result<(), MapError> {
    let count = columns.checked_len()?;

    canvas.set_title(title, style.title_size_pt);

    for i in 0..count {
        let (lon, lat) = (columns.longitudes[i], columns.latitudes[i]);
        canvas.add_label(
            TextLabel::new(
                &columns.over[i].to_string(),
                coord! { x: lon + style.over_offset.0, y: lat + style.over_offset.1 },
                style.count_size_pt,
            )
            .bold(),
        );
        canvas.add_label(TextLabel::new(
            &columns.under[i].to_string(),
            coord! { x: lon + style.under_offset.0, y: lat + style.under_offset.1 },
            style.count_size_pt,
        ));
    }

    let (rx, ry, rw, rh) = style.colorbar_rect;
    canvas.set_colorbar(Colorbar {
        buckets: scale.buckets().to_vec(),
        ticks: scale.bounds(),
        label: style.colorbar_label.clone(),
        label_size_pt: style.colorbar_label_size_pt,
        rect: FigureRect {
            x: rx,
            y: ry,
            width: rw,
            height: rh,
        },
    });

    for (text, (x, y)) in [
        (&style.legend_over_text, style.legend_over_position),
        (&style.legend_under_text, style.legend_under_position),
    ] {
        canvas.add_label(TextLabel::new(text, coord! { x: x, y: y }, style.legend_size_pt));
    }

    for i in 0..count {
        canvas.add_label(
            TextLabel::new(
                &columns.labels[i],
                coord! {
                    x: columns.longitudes[i] + style.name_offset.0,
                    y: columns.latitudes[i] + style.name_offset.1,
                },
                style.name_size_pt,
            )
            .aligned(HAlign::Left, VAlign::Top),
        );
    }

    Ok(())
}
