use anyhow::{Context, Result};
use geo::{Coord, LineString};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::register_font;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info};

use crate::collect::global_variables::{DPI, FIGURE_INCHES};
use crate::geo_core::{format_latitude, format_longitude, MapProjection, PixelFrame};
use crate::render::canvas::{FigureRect, FontWeight, HAlign, MapCanvas, TextLabel, VAlign};
use crate::render::color::parse_color;

/// Font used for every text on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSettings {
    /// Name the font is registered under
    pub family: String,
    /// TrueType/OpenType file with CJK glyphs
    pub regular_path: Option<PathBuf>,
    /// Bold face; the regular file is reused when absent
    pub bold_path: Option<PathBuf>,
}

impl Default for FontSettings {
    fn default() -> Self {
        FontSettings {
            family: "SimSun".to_string(),
            regular_path: Some(PathBuf::from("./fonts/SimSun.ttf")),
            bold_path: None,
        }
    }
}

/// Image size and resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterOptions {
    pub figure_inches: (f64, f64),
    pub dpi: f64,
}

impl Default for RasterOptions {
    fn default() -> Self {
        RasterOptions {
            figure_inches: FIGURE_INCHES,
            dpi: DPI,
        }
    }
}

impl RasterOptions {
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.figure_inches.0 * self.dpi).round() as u32,
            (self.figure_inches.1 * self.dpi).round() as u32,
        )
    }

    /// Convert a font size in points to pixels
    pub fn pt_to_px(&self, size_pt: f64) -> f64 {
        size_pt * self.dpi / 72.0
    }
}

/// Pixel geometry of one rendered figure
#[derive(Debug, Clone, Copy)]
pub struct RasterLayout {
    pub options: RasterOptions,
    pub width: u32,
    pub height: u32,
    pub projection: MapProjection,
}

impl RasterLayout {
    /// The map frame fills the subplot area (12.5%..90% across,
    /// 12%..89% down) with the extent's aspect kept
    pub fn new(canvas: &MapCanvas, options: RasterOptions) -> Self {
        let (width, height) = options.pixel_size();
        let area = PixelFrame {
            left: (width as f64 * 0.125).round() as i32,
            top: (height as f64 * 0.12).round() as i32,
            right: (width as f64 * 0.9).round() as i32,
            bottom: (height as f64 * 0.89).round() as i32,
        };
        RasterLayout {
            options,
            width,
            height,
            projection: MapProjection::fit(canvas.geo_core.get_bbox(), area),
        }
    }

    pub fn to_pixel(&self, coord: Coord<f64>) -> (i32, i32) {
        self.projection.to_pixel(coord)
    }

    /// Figure-fraction rectangle to pixel frame
    pub fn figure_rect(&self, rect: FigureRect) -> PixelFrame {
        let w = self.width as f64;
        let h = self.height as f64;
        PixelFrame {
            left: (rect.x * w).round() as i32,
            top: (h - (rect.y + rect.height) * h).round() as i32,
            right: ((rect.x + rect.width) * w).round() as i32,
            bottom: (h - rect.y * h).round() as i32,
        }
    }

    pub fn px(&self, size_pt: f64) -> f64 {
        self.options.pt_to_px(size_pt)
    }
}

/// Font files are loaded once per path and live for the whole process,
/// as the text renderer keeps `'static` references to them
fn read_font(path: &Path) -> Result<&'static [u8]> {
    static LOADED: OnceLock<Mutex<HashMap<PathBuf, &'static [u8]>>> = OnceLock::new();
    let mut loaded = LOADED
        .get_or_init(Default::default)
        .lock()
        .map_err(|_| anyhow::anyhow!("Font cache lock poisoned"))?;
    if let Some(bytes) = loaded.get(path) {
        return Ok(*bytes);
    }

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read font: {:?}", path))?;
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    loaded.insert(path.to_path_buf(), bytes);
    Ok(bytes)
}

/// Register the map font with the text renderer
pub fn register_fonts(settings: &FontSettings) -> Result<()> {
    let regular_path = settings
        .regular_path
        .as_ref()
        .context("A font file is required to draw map labels")?;
    let regular = read_font(regular_path)?;
    register_font(&settings.family, FontStyle::Normal, regular)
        .map_err(|_| anyhow::anyhow!("Invalid font {:?}", regular_path))?;

    let bold_path = settings.bold_path.as_ref().unwrap_or(regular_path);
    register_font(&settings.family, FontStyle::Bold, read_font(bold_path)?)
        .map_err(|_| anyhow::anyhow!("Invalid bold font {:?}", bold_path))?;

    debug!("Registered font family {}", settings.family);
    Ok(())
}

fn ring_pixels(layout: &RasterLayout, ring: &LineString<f64>) -> Vec<(i32, i32)> {
    let mut points: Vec<(i32, i32)> = Vec::with_capacity(ring.0.len());
    for coord in ring.coords() {
        let p = layout.to_pixel(*coord);
        if points.last() != Some(&p) {
            points.push(p);
        }
    }
    points
}

fn text_pos(label: &TextLabel) -> Pos {
    let h = match label.h_align {
        HAlign::Left => HPos::Left,
        HAlign::Center => HPos::Center,
        HAlign::Right => HPos::Right,
    };
    let v = match label.v_align {
        VAlign::Top => VPos::Top,
        VAlign::Center => VPos::Center,
        VAlign::Bottom => VPos::Bottom,
    };
    Pos::new(h, v)
}

/// Draws a canvas onto a bitmap; kept separate so every step shares the
/// same layout and font family
struct Painter<'a, 'b> {
    root: &'a DrawingArea<BitMapBackend<'b>, Shift>,
    layout: RasterLayout,
    family: &'a str,
}

impl<'a, 'b> Painter<'a, 'b> {
    fn text_style(&self, size_pt: f64, weight: FontWeight, pos: Pos) -> TextStyle<'a> {
        let style = match weight {
            FontWeight::Normal => FontStyle::Normal,
            FontWeight::Bold => FontStyle::Bold,
        };
        let font = FontDesc::new(FontFamily::Name(self.family), self.layout.px(size_pt), style);
        TextStyle::from(font).color(&BLACK).pos(pos)
    }

    fn draw_patches(&self, canvas: &MapCanvas) -> Result<()> {
        for patch in canvas.patches() {
            let color = parse_color(&patch.color)?;
            for polygon in &patch.geometry {
                let exterior = ring_pixels(&self.layout, polygon.exterior());
                if exterior.len() < 3 {
                    continue;
                }
                self.root.draw(&Polygon::new(exterior.clone(), color.filled()))?;
                self.root.draw(&PathElement::new(exterior, BLACK.stroke_width(1)))?;
                for interior in polygon.interiors() {
                    let ring = ring_pixels(&self.layout, interior);
                    self.root.draw(&PathElement::new(ring, BLACK.stroke_width(1)))?;
                }
            }
        }
        Ok(())
    }

    fn draw_outlines(&self, canvas: &MapCanvas) -> Result<()> {
        let style = ShapeStyle {
            color: BLACK.mix(0.5),
            filled: false,
            stroke_width: 2,
        };
        for geometry in canvas.outlines() {
            for polygon in geometry {
                let exterior = ring_pixels(&self.layout, polygon.exterior());
                self.root.draw(&PathElement::new(exterior, style))?;
                for interior in polygon.interiors() {
                    let ring = ring_pixels(&self.layout, interior);
                    self.root.draw(&PathElement::new(ring, style))?;
                }
            }
        }
        Ok(())
    }

    fn draw_frame(&self, canvas: &MapCanvas) -> Result<()> {
        let frame = self.layout.projection.frame();
        let bbox = self.layout.projection.bbox();
        self.root.draw(&Rectangle::new(
            [(frame.left, frame.top), (frame.right, frame.bottom)],
            BLACK.stroke_width(3),
        ))?;

        let tick_len = self.layout.px(3.5).round() as i32;
        let pad = self.layout.px(3.5).round() as i32;
        let size = canvas.tick_size_pt();

        for lon in canvas.x_ticks() {
            let (x, _) = self.layout.to_pixel(Coord { x: *lon, y: bbox.min_y });
            self.root.draw(&PathElement::new(
                vec![(x, frame.bottom), (x, frame.bottom + tick_len)],
                BLACK.stroke_width(2),
            ))?;
            let style =
                self.text_style(size, FontWeight::Normal, Pos::new(HPos::Center, VPos::Top));
            let at = (x, frame.bottom + tick_len + pad);
            self.root.draw(&Text::new(format_longitude(*lon), at, style))?;
        }

        for lat in canvas.y_ticks() {
            let (_, y) = self.layout.to_pixel(Coord { x: bbox.min_x, y: *lat });
            self.root.draw(&PathElement::new(
                vec![(frame.left - tick_len, y), (frame.left, y)],
                BLACK.stroke_width(2),
            ))?;
            let style =
                self.text_style(size, FontWeight::Normal, Pos::new(HPos::Right, VPos::Center));
            let at = (frame.left - tick_len - pad, y);
            self.root.draw(&Text::new(format_latitude(*lat), at, style))?;
        }

        if let Some(title) = canvas.title() {
            let x = (frame.left + frame.right) / 2;
            let y = frame.top - self.layout.px(6.0).round() as i32;
            let pos = Pos::new(HPos::Center, VPos::Bottom);
            let style = self.text_style(title.size_pt, FontWeight::Bold, pos);
            self.root.draw(&Text::new(title.text.clone(), (x, y), style))?;
        }
        Ok(())
    }

    fn draw_labels(&self, canvas: &MapCanvas) -> Result<()> {
        for label in canvas.labels() {
            let pos = self.layout.to_pixel(label.position);
            let style = self.text_style(label.size_pt, label.weight, text_pos(label));
            self.root.draw(&Text::new(label.text.clone(), pos, style))?;
        }
        Ok(())
    }

    fn draw_colorbar(&self, canvas: &MapCanvas) -> Result<()> {
        let Some(colorbar) = canvas.colorbar() else {
            return Ok(());
        };
        if colorbar.buckets.is_empty() {
            return Ok(());
        }

        let frame = self.layout.figure_rect(colorbar.rect);
        let count = colorbar.buckets.len() as f64;
        let step = frame.height() as f64 / count;
        let edge_y = |i: usize| frame.bottom - (i as f64 * step).round() as i32;

        // Buckets are stacked bottom-up with equal heights
        for (i, bucket) in colorbar.buckets.iter().enumerate() {
            let color = parse_color(&bucket.color)?;
            self.root.draw(&Rectangle::new(
                [(frame.left, edge_y(i + 1)), (frame.right, edge_y(i))],
                color.filled(),
            ))?;
        }
        self.root.draw(&Rectangle::new(
            [(frame.left, frame.top), (frame.right, frame.bottom)],
            BLACK.stroke_width(2),
        ))?;

        let tick_len = self.layout.px(3.5).round() as i32;
        let tick_size = colorbar.label_size_pt;
        for (i, tick) in colorbar.ticks.iter().enumerate() {
            let y = edge_y(i);
            self.root.draw(&PathElement::new(
                vec![(frame.right, y), (frame.right + tick_len, y)],
                BLACK.stroke_width(2),
            ))?;
            let pos = Pos::new(HPos::Left, VPos::Center);
            let style = self.text_style(tick_size, FontWeight::Normal, pos);
            let at = (frame.right + 2 * tick_len, y);
            self.root.draw(&Text::new(format!("{}", tick), at, style))?;
        }

        let pos = Pos::new(HPos::Left, VPos::Bottom);
        let style = self.text_style(colorbar.label_size_pt, FontWeight::Normal, pos);
        let label_y = frame.top - self.layout.px(8.0).round() as i32;
        let at = (frame.left, label_y);
        self.root.draw(&Text::new(colorbar.label.clone(), at, style))?;
        Ok(())
    }
}

fn paint(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    canvas: &MapCanvas,
    layout: RasterLayout,
    family: &str,
) -> Result<()> {
    root.fill(&WHITE)?;

    let painter = Painter {
        root,
        layout,
        family,
    };
    painter.draw_patches(canvas)?;
    painter.draw_outlines(canvas)?;
    painter.draw_frame(canvas)?;
    painter.draw_labels(canvas)?;
    painter.draw_colorbar(canvas)?;
    Ok(())
}

/// Rasterize the canvas into a PNG file
pub fn render_png(
    canvas: &MapCanvas,
    path: &Path,
    options: RasterOptions,
    fonts: &FontSettings,
) -> Result<()> {
    register_fonts(fonts)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }

    let layout = RasterLayout::new(canvas, options);
    let root = BitMapBackend::new(path, (layout.width, layout.height)).into_drawing_area();
    paint(&root, canvas, layout, &fonts.family)?;

    root.present().with_context(|| format!("Failed to write image: {:?}", path))?;
    info!(
        "Map saved to: {:?} ({}x{} px at {} dpi)",
        path, layout.width, layout.height, options.dpi
    );
    Ok(())
}

/// Rasterize the canvas in memory, as row-major RGB bytes
pub fn render_rgb(
    canvas: &MapCanvas,
    options: RasterOptions,
    fonts: &FontSettings,
) -> Result<Vec<u8>> {
    register_fonts(fonts)?;

    let layout = RasterLayout::new(canvas, options);
    let mut buffer = vec![0u8; layout.width as usize * layout.height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (layout.width, layout.height))
            .into_drawing_area();
        paint(&root, canvas, layout, &fonts.family)?;
        root.present()?;
    }
    Ok(buffer)
}
