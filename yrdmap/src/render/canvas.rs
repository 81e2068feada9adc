use geo::{Coord, MultiPolygon};

use crate::geo_core::GeoCore;
use crate::geometric::score_scale::ColorBucket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    Top,
    Center,
    Bottom,
}

/// Text placed at a map coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct TextLabel {
    pub text: String,
    /// lon/lat of the text anchor
    pub position: Coord<f64>,
    /// Font size in points
    pub size_pt: f64,
    pub weight: FontWeight,
    pub h_align: HAlign,
    pub v_align: VAlign,
}

impl TextLabel {
    /// Left/bottom anchored label in normal weight
    pub fn new(text: &str, position: Coord<f64>, size_pt: f64) -> Self {
        TextLabel {
            text: text.to_string(),
            position,
            size_pt,
            weight: FontWeight::Normal,
            h_align: HAlign::Left,
            v_align: VAlign::Bottom,
        }
    }

    pub fn bold(mut self) -> Self {
        self.weight = FontWeight::Bold;
        self
    }

    pub fn aligned(mut self, h_align: HAlign, v_align: VAlign) -> Self {
        self.h_align = h_align;
        self.v_align = v_align;
        self
    }
}

/// A city polygon filled with its bucket color
#[derive(Debug, Clone, PartialEq)]
pub struct FilledPatch {
    pub city: String,
    pub geometry: MultiPolygon<f64>,
    pub color: String,
}

/// Rectangle in figure fractions, origin bottom-left like a matplotlib axes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FigureRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Vertical discrete colorbar, one box per bucket
#[derive(Debug, Clone, PartialEq)]
pub struct Colorbar {
    pub buckets: Vec<ColorBucket>,
    pub ticks: Vec<f64>,
    pub label: String,
    pub label_size_pt: f64,
    pub rect: FigureRect,
}

/// Title drawn above the map frame
#[derive(Debug, Clone, PartialEq)]
pub struct Title {
    pub text: String,
    pub size_pt: f64,
}

/// Rendering context of one map.
///
/// Drawing calls append to the canvas; nothing is rasterized until the
/// canvas is handed to the raster module.
#[derive(Debug, Clone)]
pub struct MapCanvas {
    pub geo_core: GeoCore,
    title: Option<Title>,
    /// Unfilled outlines drawn under everything else
    outlines: Vec<MultiPolygon<f64>>,
    patches: Vec<FilledPatch>,
    labels: Vec<TextLabel>,
    colorbar: Option<Colorbar>,
    x_ticks: Vec<f64>,
    y_ticks: Vec<f64>,
    tick_size_pt: f64,
}

impl MapCanvas {
    pub fn new(geo_core: GeoCore) -> Self {
        MapCanvas {
            geo_core,
            title: None,
            outlines: Vec::new(),
            patches: Vec::new(),
            labels: Vec::new(),
            colorbar: None,
            x_ticks: Vec::new(),
            y_ticks: Vec::new(),
            tick_size_pt: 15.0,
        }
    }

    pub fn set_title(&mut self, text: &str, size_pt: f64) {
        self.title = Some(Title {
            text: text.to_string(),
            size_pt,
        });
    }

    pub fn title(&self) -> Option<&Title> {
        self.title.as_ref()
    }

    /// Set longitude/latitude tick positions and their label size
    pub fn set_ticks(&mut self, x_ticks: &[f64], y_ticks: &[f64], size_pt: f64) {
        self.x_ticks = x_ticks.to_vec();
        self.y_ticks = y_ticks.to_vec();
        self.tick_size_pt = size_pt;
    }

    pub fn x_ticks(&self) -> &[f64] {
        &self.x_ticks
    }

    pub fn y_ticks(&self) -> &[f64] {
        &self.y_ticks
    }

    pub fn tick_size_pt(&self) -> f64 {
        self.tick_size_pt
    }

    pub fn add_outline(&mut self, geometry: MultiPolygon<f64>) {
        self.outlines.push(geometry);
    }

    pub fn outlines(&self) -> &[MultiPolygon<f64>] {
        &self.outlines
    }

    pub fn add_patch(&mut self, patch: FilledPatch) {
        self.patches.push(patch);
    }

    pub fn patches(&self) -> &[FilledPatch] {
        &self.patches
    }

    pub fn add_label(&mut self, label: TextLabel) {
        self.labels.push(label);
    }

    pub fn labels(&self) -> &[TextLabel] {
        &self.labels
    }

    pub fn set_colorbar(&mut self, colorbar: Colorbar) {
        self.colorbar = Some(colorbar);
    }

    pub fn colorbar(&self) -> Option<&Colorbar> {
        self.colorbar.as_ref()
    }

    /// Patches filled with `color`
    pub fn patches_with_color<'a>(
        &'a self,
        color: &'a str,
    ) -> impl Iterator<Item = &'a FilledPatch> + 'a {
        self.patches.iter().filter(move |p| p.color == color)
    }

    /// Labels whose text equals `text`
    pub fn labels_with_text<'a>(
        &'a self,
        text: &'a str,
    ) -> impl Iterator<Item = &'a TextLabel> + 'a {
        self.labels.iter().filter(move |l| l.text == text)
    }
}
