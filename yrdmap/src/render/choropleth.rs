use tracing::{debug, warn};

use crate::geometric::boundary::{BoundaryCollection, MatchStrategy};
use crate::geometric::score_scale::FillColor;
use crate::render::canvas::{FilledPatch, MapCanvas};

/// Outcome of filling one city
#[derive(Debug, Clone, PartialEq)]
pub struct FillResult {
    pub city: String,
    pub color: String,
    /// Boundaries matched, one patch each
    pub patches: usize,
    /// Polygon parts over all matched boundaries
    pub parts: usize,
}

impl FillResult {
    pub fn is_matched(&self) -> bool {
        self.patches > 0
    }
}

/// Fill every boundary belonging to `city_name` with `fill`.
///
/// A city with several boundary records gets one patch per record, all in
/// the same color. No match leaves the canvas untouched and only logs a
/// warning.
pub fn match_and_fill(
    canvas: &mut MapCanvas,
    city_name: &str,
    boundaries: &BoundaryCollection,
    fill: &FillColor,
    strategy: MatchStrategy,
) -> FillResult {
    let mut result = FillResult {
        city: city_name.to_string(),
        color: fill.color.clone(),
        patches: 0,
        parts: 0,
    };

    for boundary in boundaries.matching(city_name, strategy) {
        canvas.add_patch(FilledPatch {
            city: city_name.to_string(),
            geometry: boundary.geometry.clone(),
            color: fill.color.clone(),
        });
        result.patches += 1;
        result.parts += boundary.part_count();
    }

    if result.is_matched() {
        debug!(
            "Filled {} with {} ({} patches, {} parts)",
            city_name, fill.color, result.patches, result.parts
        );
    } else {
        warn!("No boundary found for city {}", city_name);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::GeoCore;
    use crate::geometric::boundary::CityBoundary;
    use crate::geometric::score_scale::ScoreScale;
    use geo::{polygon, MultiPolygon};

    fn square(x: f64, y: f64) -> geo::Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + 0.5, y: y),
            (x: x + 0.5, y: y + 0.5),
            (x: x, y: y + 0.5),
            (x: x, y: y),
        ]
    }

    fn boundaries() -> BoundaryCollection {
        BoundaryCollection::new(vec![
            CityBoundary::new("Shanghai", MultiPolygon::new(vec![square(121.0, 31.0)])),
            CityBoundary::new("Suzhou", MultiPolygon::new(vec![square(120.5, 31.2)])),
            CityBoundary::new(
                "Zhoushan",
                MultiPolygon::new(vec![square(122.0, 30.0), square(122.6, 30.2)]),
            ),
        ])
    }

    #[test]
    fn test_single_match_fills_one_patch() {
        let scale = ScoreScale::yrd_default();
        let fill = scale.resolve_fill("Shanghai", 45.0).unwrap();
        let mut canvas = MapCanvas::new(GeoCore::yrd());

        let result = match_and_fill(
            &mut canvas,
            "Shanghai",
            &boundaries(),
            &fill,
            MatchStrategy::Exact,
        );

        assert_eq!(result.patches, 1);
        assert_eq!(canvas.patches().len(), 1);
        assert_eq!(canvas.patches()[0].color, scale.classify(45.0).unwrap().color);
        assert_eq!(canvas.patches()[0].city, "Shanghai");
    }

    #[test]
    fn test_absent_city_is_noop() {
        let fill = ScoreScale::yrd_default().resolve_fill("Hefei", 80.0).unwrap();
        let mut canvas = MapCanvas::new(GeoCore::yrd());

        let result = match_and_fill(
            &mut canvas,
            "Hefei",
            &boundaries(),
            &fill,
            MatchStrategy::Exact,
        );

        assert!(!result.is_matched());
        assert_eq!(result.parts, 0);
        assert!(canvas.patches().is_empty());
    }

    #[test]
    fn test_multi_part_city() {
        let fill = ScoreScale::yrd_default().resolve_fill("Zhoushan", 91.0).unwrap();
        let mut canvas = MapCanvas::new(GeoCore::yrd());

        let result = match_and_fill(
            &mut canvas,
            "Zhoushan",
            &boundaries(),
            &fill,
            MatchStrategy::Exact,
        );

        assert_eq!(result.patches, 1);
        assert_eq!(result.parts, 2);
        assert_eq!(canvas.patches()[0].geometry.0.len(), 2);
        assert_eq!(canvas.patches()[0].color, "darkblue");
    }

    #[test]
    fn test_repeated_records_share_color() {
        let mut collection = boundaries();
        collection.add_boundary(CityBoundary::new(
            "Shanghai",
            MultiPolygon::new(vec![square(121.8, 31.6)]),
        ));
        let fill = ScoreScale::yrd_default().resolve_fill("Shanghai", 25.0).unwrap();
        let mut canvas = MapCanvas::new(GeoCore::yrd());

        let result = match_and_fill(
            &mut canvas,
            "Shanghai",
            &collection,
            &fill,
            MatchStrategy::Exact,
        );

        assert_eq!(result.patches, 2);
        assert!(canvas.patches().iter().all(|p| p.color == "darkred"));
    }

    #[test]
    fn test_equal_scores_equal_colors() {
        let scale = ScoreScale::yrd_default();
        let mut canvas = MapCanvas::new(GeoCore::yrd());
        let collection = boundaries();
        for city in ["Shanghai", "Suzhou"] {
            let fill = scale.resolve_fill(city, 63.0).unwrap();
            match_and_fill(&mut canvas, city, &collection, &fill, MatchStrategy::Exact);
        }
        assert_eq!(canvas.patches().len(), 2);
        assert_eq!(canvas.patches()[0].color, canvas.patches()[1].color);
    }

    #[test]
    fn test_contains_strategy() {
        let fill = ScoreScale::yrd_default().resolve_fill("Shanghai City", 55.0).unwrap();
        let mut canvas = MapCanvas::new(GeoCore::yrd());
        let collection = boundaries();

        let exact = match_and_fill(
            &mut canvas,
            "Shanghai City",
            &collection,
            &fill,
            MatchStrategy::Exact,
        );
        assert!(!exact.is_matched());

        let loose = match_and_fill(
            &mut canvas,
            "Shanghai City",
            &collection,
            &fill,
            MatchStrategy::Contains,
        );
        assert_eq!(loose.patches, 1);
        assert_eq!(canvas.patches()[0].color, "lightsalmon");
    }
}
