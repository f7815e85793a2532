use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use geo::Rect;
use image::{imageops::FilterType, DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;
use tracing::instrument;

use crate::{
    error::CaptureError,
    projection::{MapViewport, Projection},
    GeoPoint, ParcelPolygon,
};

const OUTLINE_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const OUTLINE_WIDTH: u32 = 4;

/// Whether the surface could confirm that everything drawn so far is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderAck {
    Acknowledged,
    Unsupported,
}

/// The rendered map the user draws on. Implementations wrap the map engine and its
/// rasterizer; the pipeline only needs these hooks.
#[async_trait]
pub trait MapSurface: Send + Sync {
    /// Viewport transform as of now. Scroll and zoom change it, so read it right before use.
    fn viewport(&self) -> MapViewport;

    fn lock_zoom(&self);

    fn unlock_zoom(&self);

    /// Frames a geographic rectangle (x = lng, y = lat).
    fn fit_bounds(&self, bounds: Rect<f64>);

    fn draw_outline(&self, polygon: &ParcelPolygon);

    fn clear_outlines(&self);

    /// Resolves once pending outlines are rendered, or returns `Unsupported` right away when
    /// the surface has no such signal.
    async fn await_render(&self) -> RenderAck {
        RenderAck::Unsupported
    }

    async fn rasterize(&self) -> Result<DynamicImage, CaptureError>;
}

#[derive(Debug)]
struct CanvasState {
    viewport: MapViewport,
    outlines: Vec<ParcelPolygon>,
}

/// In-memory surface over a static base raster. Outlines are painted at rasterization time,
/// so render completion is always acknowledged.
#[derive(Debug)]
pub struct CanvasSurface {
    base: RgbaImage,
    state: Mutex<CanvasState>,
}

impl CanvasSurface {
    pub fn new(base: DynamicImage, viewport: MapViewport) -> Self {
        let (width, height) = viewport.size();
        let base = if base.width() != width || base.height() != height {
            log::debug!(
                "Resizing base raster from (w: {}, h: {}) to viewport (w: {width}, h: {height}).",
                base.width(),
                base.height()
            );
            base.resize_exact(width, height, FilterType::Triangle)
        } else {
            base
        };
        Self {
            base: base.to_rgba8(),
            state: Mutex::new(CanvasState {
                viewport,
                outlines: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CanvasState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn complete_layout(&self) {
        self.state().viewport.complete_layout();
    }

    pub fn set_zoom(&self, zoom: u8) -> u8 {
        self.state().viewport.set_zoom(zoom)
    }

    pub fn pan_to(&self, center: GeoPoint) {
        self.state().viewport.pan_to(center);
    }

    pub fn outline_count(&self) -> usize {
        self.state().outlines.len()
    }
}

#[async_trait]
impl MapSurface for CanvasSurface {
    fn viewport(&self) -> MapViewport {
        self.state().viewport
    }

    fn lock_zoom(&self) {
        self.state().viewport.lock_zoom();
    }

    fn unlock_zoom(&self) {
        self.state().viewport.unlock_zoom();
    }

    fn fit_bounds(&self, bounds: Rect<f64>) {
        self.state().viewport.fit_bounds(bounds);
    }

    fn draw_outline(&self, polygon: &ParcelPolygon) {
        self.state().outlines.push(polygon.clone());
    }

    fn clear_outlines(&self) {
        self.state().outlines.clear();
    }

    async fn await_render(&self) -> RenderAck {
        RenderAck::Acknowledged
    }

    #[instrument(skip(self), level = "debug")]
    async fn rasterize(&self) -> Result<DynamicImage, CaptureError> {
        let mut canvas = self.base.clone();
        let (viewport, outlines) = {
            let state = self.state();
            (state.viewport, state.outlines.clone())
        };
        for outline in &outlines {
            let pixels = match outline
                .vertices
                .iter()
                .map(|vertex| viewport.project(*vertex))
                .collect::<Result<Vec<_>, _>>()
            {
                Ok(pixels) => pixels,
                Err(err) => {
                    log::debug!("Outline {} not drawn: {err}", outline.id);
                    continue;
                }
            };
            for (index, start) in pixels.iter().enumerate() {
                let end = pixels[(index + 1) % pixels.len()];
                draw_stroke(&mut canvas, (start.x, start.y), (end.x, end.y));
            }
        }
        Ok(DynamicImage::ImageRgba8(canvas))
    }
}

fn draw_stroke(canvas: &mut RgbaImage, start: (f64, f64), end: (f64, f64)) {
    let half = (OUTLINE_WIDTH / 2) as i32;
    for offset in -half..half {
        let offset = offset as f32;
        let (x0, y0, x1, y1) = (start.0 as f32, start.1 as f32, end.0 as f32, end.1 as f32);
        draw_line_segment_mut(canvas, (x0 + offset, y0), (x1 + offset, y1), OUTLINE_COLOR);
        draw_line_segment_mut(canvas, (x0, y0 + offset), (x1, y1 + offset), OUTLINE_COLOR);
    }
}
