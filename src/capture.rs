use std::{sync::Arc, time::Duration};

use image::DynamicImage;
use tracing::instrument;

use crate::{
    backend::{ClassifierBackend, CropRequest},
    error::{CaptureError, SubmissionError},
    projection::bounding_box,
    surface::{MapSurface, RenderAck},
    util::{crop_to_bbox, png_data_uri},
    ParcelPolygon, PixelBoundingBox, Thumbnail,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureOptions {
    /// Wait before rasterizing when the surface cannot acknowledge rendering. A heuristic:
    /// slow renders can still race it.
    pub settle_delay: Duration,
    pub thumbnail: bool,
    /// Crop on the client and submit without a bbox.
    pub crop_locally: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1000),
            thumbnail: true,
            crop_locally: false,
        }
    }
}

/// Runs settle, rasterize, bbox, submit for one committed polygon.
#[derive(Clone)]
pub struct CaptureOrchestrator {
    surface: Arc<dyn MapSurface>,
    backend: Arc<dyn ClassifierBackend>,
    options: CaptureOptions,
}

impl CaptureOrchestrator {
    pub fn new(
        surface: Arc<dyn MapSurface>,
        backend: Arc<dyn ClassifierBackend>,
        options: CaptureOptions,
    ) -> Self {
        Self {
            surface,
            backend,
            options,
        }
    }

    pub fn options(&self) -> CaptureOptions {
        self.options
    }

    /// Produces the thumbnail for `polygon`. On any error nothing is returned that could be
    /// registered, and the polygon can be captured again later.
    #[instrument(skip(self, polygon), fields(polygon = %polygon.id))]
    pub async fn capture(&self, polygon: &ParcelPolygon) -> Result<Thumbnail, CaptureError> {
        self.settle().await;
        let raster = self.surface.rasterize().await?;
        #[cfg(feature = "debug")]
        save_raster(&raster, polygon);

        let projected = bounding_box(&self.surface.viewport(), polygon).inspect_err(|err| {
            log::error!("Capture of polygon {} aborted: {err}", polygon.id);
        })?;
        // The view may have moved while settling; only the on-raster part is usable.
        let b_box = projected.intersect_raster(raster.width(), raster.height());
        if b_box != projected {
            log::debug!("Polygon {} only partly on raster: {projected:?}", polygon.id);
        }
        if b_box.is_empty() {
            return Err(CaptureError::EmptyCrop {
                polygon: polygon.id,
                width: b_box.width,
                height: b_box.height,
            });
        }

        let request = self.crop_request(&raster, b_box)?;
        let response = self.backend.submit_crop(&request).await?;
        let source_image = response
            .processed_image_url
            .ok_or(SubmissionError::MissingImage)?;
        log::debug!("Polygon {} captured as {source_image}.", polygon.id);

        Ok(Thumbnail {
            polygon_id: polygon.id,
            source_image,
            last_vertex: Some(polygon.last_vertex),
        })
    }

    async fn settle(&self) {
        match self.surface.await_render().await {
            RenderAck::Acknowledged => log::trace!("Surface acknowledged render."),
            RenderAck::Unsupported => {
                log::debug!(
                    "Surface has no render signal, settling for {:?}.",
                    self.options.settle_delay
                );
                tokio::time::sleep(self.options.settle_delay).await;
            }
        }
    }

    #[instrument(level = "debug", skip(self, raster))]
    fn crop_request(
        &self,
        raster: &DynamicImage,
        b_box: PixelBoundingBox,
    ) -> Result<CropRequest, CaptureError> {
        let thumbnail = self.options.thumbnail.then_some(true);
        if self.options.crop_locally {
            let crop = crop_to_bbox(raster, &b_box);
            return Ok(CropRequest {
                image: png_data_uri(&crop)?,
                thumbnail,
                bbox: None,
            });
        }
        Ok(CropRequest {
            image: png_data_uri(raster)?,
            thumbnail,
            bbox: Some(b_box),
        })
    }
}

#[cfg(feature = "debug")]
fn save_raster(raster: &DynamicImage, polygon: &ParcelPolygon) {
    let path = std::path::Path::new("captures").join(format!("{}.png", polygon.id.0));
    if let Err(err) = std::fs::create_dir_all("captures").map_err(image::ImageError::IoError) {
        log::warn!("Could not create capture dump directory: {err}");
        return;
    }
    if let Err(err) = raster.save(&path) {
        log::warn!("Could not dump raster to {}: {err}", path.display());
    }
}
