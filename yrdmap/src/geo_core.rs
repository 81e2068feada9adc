use geo::Coord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::collect::global_variables::get_output_path;

/// Base struct for map geometry handling
/// Holds the visible WGS84 extent and the output directory of a map
#[derive(Debug, Clone)]
pub struct GeoCore {
    /// Visible map extent
    pub bbox: BoundingBox,
    /// Output directory for rendered images
    pub output_path: PathBuf,
}

impl GeoCore {
    pub fn new(bbox: BoundingBox) -> Self {
        GeoCore {
            bbox,
            output_path: get_output_path(),
        }
    }

    /// Create GeoCore for the Yangtze River Delta extent
    pub fn yrd() -> Self {
        GeoCore::new(BoundingBox::yrd())
    }

    pub fn get_bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn set_bbox(&mut self, bbox: BoundingBox) {
        self.bbox = bbox;
    }

    pub fn get_output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn set_output_path(&mut self, output_path: impl Into<PathBuf>) {
        self.output_path = output_path.into();
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// lon 112.9..123, lat 24.3..35.5
    pub fn yrd() -> Self {
        BoundingBox::new(112.9, 24.3, 123.0, 35.5)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, coord: Coord<f64>) -> bool {
        coord.x >= self.min_x
            && coord.x <= self.max_x
            && coord.y >= self.min_y
            && coord.y <= self.max_y
    }
}

/// Pixel rectangle of the map frame inside the image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelFrame {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl PixelFrame {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Plate carrée projection of a lon/lat extent into a pixel frame.
///
/// Degrees keep the same scale on both axes, so the frame is centered in
/// the available area and shrunk along the longer side.
#[derive(Debug, Clone, Copy)]
pub struct MapProjection {
    bbox: BoundingBox,
    frame: PixelFrame,
    scale: f64,
}

impl MapProjection {
    /// Fit `bbox` into the pixel area `[left, top, right, bottom]`
    pub fn fit(bbox: BoundingBox, area: PixelFrame) -> Self {
        let scale_x = area.width() as f64 / bbox.width();
        let scale_y = area.height() as f64 / bbox.height();
        let scale = scale_x.min(scale_y);

        let width = (bbox.width() * scale).round() as i32;
        let height = (bbox.height() * scale).round() as i32;
        let left = area.left + (area.width() - width) / 2;
        let top = area.top + (area.height() - height) / 2;

        MapProjection {
            bbox,
            frame: PixelFrame {
                left,
                top,
                right: left + width,
                bottom: top + height,
            },
            scale,
        }
    }

    pub fn frame(&self) -> PixelFrame {
        self.frame
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Pixels per degree
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Project a lon/lat coordinate to image pixels (y grows downwards)
    pub fn to_pixel(&self, coord: Coord<f64>) -> (i32, i32) {
        let x = self.frame.left as f64 + (coord.x - self.bbox.min_x) * self.scale;
        let y = self.frame.bottom as f64 - (coord.y - self.bbox.min_y) * self.scale;
        (x.round() as i32, y.round() as i32)
    }
}

/// Format a longitude tick the way cartographic axes do: `121°E`
pub fn format_longitude(lon: f64) -> String {
    let value = trim_degrees(lon.abs());
    if lon < 0.0 {
        format!("{}°W", value)
    } else {
        format!("{}°E", value)
    }
}

/// Format a latitude tick: `30°N`
pub fn format_latitude(lat: f64) -> String {
    let value = trim_degrees(lat.abs());
    if lat > 0.0 {
        format!("{}°N", value)
    } else if lat < 0.0 {
        format!("{}°S", value)
    } else {
        format!("{}°", value)
    }
}

fn trim_degrees(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    #[test]
    fn test_geo_core_yrd() {
        let gc = GeoCore::yrd();
        assert_eq!(gc.get_bbox(), BoundingBox::new(112.9, 24.3, 123.0, 35.5));
        assert_eq!(gc.get_output_path(), Path::new("./output"));
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::new(0.0, 0.0, 2.0, 1.0);
        assert_eq!(bbox.width(), 2.0);
        assert_eq!(bbox.height(), 1.0);
        assert!(bbox.contains(coord! { x: 1.0, y: 0.5 }));
        assert!(!bbox.contains(coord! { x: 3.0, y: 0.5 }));
    }

    #[test]
    fn test_projection_corners() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let area = PixelFrame {
            left: 0,
            top: 0,
            right: 100,
            bottom: 100,
        };
        let proj = MapProjection::fit(bbox, area);
        assert_eq!(proj.to_pixel(coord! { x: 0.0, y: 0.0 }), (0, 100));
        assert_eq!(proj.to_pixel(coord! { x: 10.0, y: 10.0 }), (100, 0));
        assert_eq!(proj.to_pixel(coord! { x: 5.0, y: 5.0 }), (50, 50));
    }

    #[test]
    fn test_projection_keeps_aspect() {
        // Taller than wide: frame is narrowed and centered horizontally
        let bbox = BoundingBox::new(0.0, 0.0, 5.0, 10.0);
        let area = PixelFrame {
            left: 0,
            top: 0,
            right: 100,
            bottom: 100,
        };
        let proj = MapProjection::fit(bbox, area);
        let frame = proj.frame();
        assert_eq!(frame.width(), 50);
        assert_eq!(frame.height(), 100);
        assert_eq!(frame.left, 25);
        assert_eq!(proj.scale(), 10.0);
    }

    #[test]
    fn test_tick_formatting() {
        assert_eq!(format_longitude(121.0), "121°E");
        assert_eq!(format_longitude(-3.5), "3.5°W");
        assert_eq!(format_latitude(30.0), "30°N");
        assert_eq!(format_latitude(-12.0), "12°S");
        assert_eq!(format_latitude(0.0), "0°");
    }
}
