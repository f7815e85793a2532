use std::f64::consts::PI;

use geo::{BoundingRect, MultiPoint, Point, Rect};
use nalgebra::{Point2, Vector2};

use crate::{error::ProjectionUnavailable, GeoPoint, ParcelPolygon, PixelBoundingBox};

pub type PixelPoint = Point2<f64>;

const TILE_SIZE: f64 = 256.0;
const MAX_SIN_LAT: f64 = 0.9999;
pub const MIN_ZOOM: u8 = 0;
pub const MAX_ZOOM: u8 = 22;

/// Geographic to on-screen pixel transform of a rendered map surface.
pub trait Projection {
    fn project(&self, point: GeoPoint) -> Result<PixelPoint, ProjectionUnavailable>;
}

/// Projects every vertex and returns the componentwise min/max box. Colinear vertices give a
/// zero-area box, which callers have to treat as unusable.
pub fn bounding_box<P: Projection + ?Sized>(
    projection: &P,
    polygon: &ParcelPolygon,
) -> Result<PixelBoundingBox, ProjectionUnavailable> {
    let points = polygon
        .vertices
        .iter()
        .map(|vertex| {
            projection
                .project(*vertex)
                .map(|pixel| Point::new(pixel.x, pixel.y))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let rect = MultiPoint::new(points)
        .bounding_rect()
        .unwrap_or_else(|| Rect::new((0.0, 0.0), (0.0, 0.0)));
    Ok(PixelBoundingBox {
        min_x: rect.min().x,
        min_y: rect.min().y,
        width: rect.width(),
        height: rect.height(),
    })
}

/// Web-Mercator viewport with 256 px tiles and integer zoom levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapViewport {
    center: GeoPoint,
    zoom: u8,
    min_zoom: u8,
    max_zoom: u8,
    width: u32,
    height: u32,
    laid_out: bool,
}

impl MapViewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            center: GeoPoint::new(0.0, 0.0),
            zoom: MIN_ZOOM,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            width,
            height,
            laid_out: false,
        }
    }

    pub fn with_center(mut self, center: GeoPoint) -> Self {
        self.center = center;
        self
    }

    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.set_zoom(zoom);
        self
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn zoom_limits(&self) -> (u8, u8) {
        (self.min_zoom, self.max_zoom)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_laid_out(&self) -> bool {
        self.laid_out
    }

    /// Marks the first layout pass as done; projection is refused until then.
    pub fn complete_layout(&mut self) {
        self.laid_out = true;
    }

    pub fn pan_to(&mut self, center: GeoPoint) {
        self.center = center;
    }

    /// Sets the zoom level, clamped to the current limits. Returns the applied level.
    pub fn set_zoom(&mut self, zoom: u8) -> u8 {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        self.zoom
    }

    /// Latches the current zoom as both minimum and maximum.
    pub fn lock_zoom(&mut self) {
        self.min_zoom = self.zoom;
        self.max_zoom = self.zoom;
    }

    pub fn unlock_zoom(&mut self) {
        self.min_zoom = MIN_ZOOM;
        self.max_zoom = MAX_ZOOM;
    }

    pub fn is_zoom_locked(&self) -> bool {
        self.min_zoom == self.max_zoom
    }

    /// Centers on `bounds` (x = lng, y = lat) at the largest zoom that still shows all of it.
    pub fn fit_bounds(&mut self, bounds: Rect<f64>) {
        let south_west = world_point(GeoPoint::new(bounds.min().y, bounds.min().x));
        let north_east = world_point(GeoPoint::new(bounds.max().y, bounds.max().x));
        let span = Vector2::new(
            (north_east.x - south_west.x).abs(),
            (north_east.y - south_west.y).abs(),
        );
        let zoom = (self.min_zoom..=self.max_zoom)
            .rev()
            .find(|zoom| {
                let scale = scale(*zoom);
                span.x * scale <= self.width as f64 && span.y * scale <= self.height as f64
            })
            .unwrap_or(self.min_zoom);
        let middle = nalgebra::center(&south_west, &north_east);
        self.center = geo_point(middle);
        self.zoom = zoom;
        log::debug!("Fitted viewport to {bounds:?}: center {:?}, zoom {zoom}.", self.center);
    }

    /// Inverse of [`Projection::project`], for clicks delivered in surface pixels.
    pub fn unproject(&self, pixel: PixelPoint) -> Result<GeoPoint, ProjectionUnavailable> {
        let origin = self.origin()?;
        let world = (origin + pixel.coords) / scale(self.zoom);
        Ok(geo_point(world))
    }

    fn origin(&self) -> Result<PixelPoint, ProjectionUnavailable> {
        if !self.laid_out {
            return Err(ProjectionUnavailable);
        }
        let center = world_point(self.center) * scale(self.zoom);
        Ok(center - Vector2::new(self.width as f64 / 2.0, self.height as f64 / 2.0))
    }
}

impl Projection for MapViewport {
    fn project(&self, point: GeoPoint) -> Result<PixelPoint, ProjectionUnavailable> {
        let origin = self.origin()?;
        let pixel = world_point(point) * scale(self.zoom);
        Ok(PixelPoint::from(pixel - origin))
    }
}

fn scale(zoom: u8) -> f64 {
    (1u64 << zoom) as f64
}

fn world_point(point: GeoPoint) -> PixelPoint {
    let sin_lat = point.lat.to_radians().sin().clamp(-MAX_SIN_LAT, MAX_SIN_LAT);
    PixelPoint::new(
        TILE_SIZE * (0.5 + point.lng / 360.0),
        TILE_SIZE * (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI)),
    )
}

fn geo_point(world: PixelPoint) -> GeoPoint {
    let n = PI - 2.0 * PI * world.y / TILE_SIZE;
    GeoPoint::new(
        n.sinh().atan().to_degrees(),
        world.x / TILE_SIZE * 360.0 - 180.0,
    )
}
