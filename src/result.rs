use std::fmt;

use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<GeoPoint> for Coord<f64> {
    fn from(point: GeoPoint) -> Self {
        Coord {
            x: point.lng,
            y: point.lat,
        }
    }
}

impl From<Coord<f64>> for GeoPoint {
    fn from(coord: Coord<f64>) -> Self {
        GeoPoint {
            lat: coord.y,
            lng: coord.x,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolygonId(pub u32);

impl fmt::Display for PolygonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A committed parcel outline. Vertices are never empty and hold at least three points.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelPolygon {
    pub id: PolygonId,
    pub vertices: Vec<GeoPoint>,
    pub last_vertex: GeoPoint,
}

impl ParcelPolygon {
    pub fn to_geo(&self) -> Polygon<f64> {
        let ring = self
            .vertices
            .iter()
            .map(|vertex| Coord::from(*vertex))
            .collect::<Vec<_>>();
        Polygon::new(LineString::new(ring), vec![])
    }
}

/// Axis-aligned crop rectangle in surface pixels, valid only for the raster it was taken with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelBoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelBoundingBox {
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Part of the box that lies on a `width` x `height` raster. Empty when the box is
    /// entirely off the raster.
    pub fn intersect_raster(&self, width: u32, height: u32) -> PixelBoundingBox {
        let (width, height) = (width as f64, height as f64);
        let min_x = self.min_x.clamp(0.0, width);
        let min_y = self.min_y.clamp(0.0, height);
        let max_x = (self.min_x + self.width).clamp(min_x, width);
        let max_y = (self.min_y + self.height).clamp(min_y, height);
        PixelBoundingBox {
            min_x,
            min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub polygon_id: PolygonId,
    /// Handle returned by the backend, usually a URL of the stored crop.
    pub source_image: String,
    pub last_vertex: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub polygon_id: PolygonId,
    pub input_image: String,
    pub processed_image: String,
    pub polygon_area_sqft: f64,
    pub red_land_area_sqft: f64,
    pub land_rate: Option<f64>,
    pub land_value: Option<f64>,
    pub score: f64,
}

#[derive(Debug)]
pub struct AnalysisFailure {
    pub polygon_id: PolygonId,
    /// Position of the thumbnail in the submitted batch.
    pub index: usize,
    pub error: AnalysisError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub rank: usize,
    pub result: AnalysisResult,
}

impl fmt::Display for RankedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = &self.result;
        writeln!(f, "Rank #{} (polygon {})", self.rank, result.polygon_id)?;
        writeln!(f, "  Input: {}", result.input_image)?;
        writeln!(f, "  Score: {:.2}", result.score)?;
        writeln!(f, "  Total Polygon Area: {} sq ft", result.polygon_area_sqft)?;
        writeln!(f, "  Red Land Area: {} sq ft", result.red_land_area_sqft)?;
        match result.land_rate {
            Some(rate) => writeln!(f, "  Land Rate: {rate} INR/sq ft")?,
            None => writeln!(f, "  Land Rate: n/a")?,
        }
        match result.land_value {
            Some(value) => write!(f, "  Land Value: {value} INR"),
            None => write!(f, "  Land Value: n/a"),
        }
    }
}

/// Outcome of one batch analysis: results ranked by descending score plus per-item failures.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub ranked: Vec<RankedEntry>,
    pub failures: Vec<AnalysisFailure>,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn results(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.ranked.iter().map(|entry| &entry.result)
    }
}
