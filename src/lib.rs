use std::{path::PathBuf, sync::Arc, time::Duration};

use backend::{ClassifierBackend, ResetResponse};
use error::{InputError, LoadError};
use surface::MapSurface;
use tracing::instrument;

mod analysis;
pub mod backend;
mod boundary;
mod capture;
pub mod config;
pub mod error;
pub mod projection;
mod registry;
mod result;
pub mod surface;
pub mod util;

pub use analysis::{rank, score, AnalysisEngine};
pub use boundary::{RegionBoundary, RegionSelector};
pub use capture::{CaptureOptions, CaptureOrchestrator};
pub use error::{Error, Result};
pub use registry::PolygonRegistry;
pub use result::*;

enum RegionSource {
    Path(PathBuf),
    GeoJson(String),
    Loaded(RegionBoundary),
}

pub struct SurveySessionBuilder {
    surface: Arc<dyn MapSurface>,
    backend: Arc<dyn ClassifierBackend>,
    region: Option<RegionSource>,
    selector: RegionSelector,
    capture: CaptureOptions,
    frame_region: bool,
}

impl SurveySessionBuilder {
    pub fn new(surface: Arc<dyn MapSurface>, backend: Arc<dyn ClassifierBackend>) -> Self {
        Self {
            surface,
            backend,
            region: None,
            selector: RegionSelector::default(),
            capture: CaptureOptions::default(),
            frame_region: true,
        }
    }

    pub fn region_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.region = Some(RegionSource::Path(path.into()));
        self
    }

    pub fn region_geojson(mut self, source: impl Into<String>) -> Self {
        self.region = Some(RegionSource::GeoJson(source.into()));
        self
    }

    pub fn region(mut self, boundary: RegionBoundary) -> Self {
        self.region = Some(RegionSource::Loaded(boundary));
        self
    }

    pub fn selector(mut self, selector: RegionSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn region_name(mut self, name: impl Into<String>) -> Self {
        self.selector.name = name.into();
        self
    }

    pub fn name_property(mut self, property: impl Into<String>) -> Self {
        self.selector.property = property.into();
        self
    }

    pub fn capture_options(mut self, options: CaptureOptions) -> Self {
        self.capture = options;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.capture.settle_delay = delay;
        self
    }

    /// Fit the surface to the region extent once it is loaded. On by default.
    pub fn frame_region(mut self, frame_region: bool) -> Self {
        self.frame_region = frame_region;
        self
    }

    fn load_region(&mut self) -> Result<RegionBoundary, LoadError> {
        match self.region.take() {
            Some(RegionSource::Path(path)) => RegionBoundary::load_path(path, &self.selector),
            Some(RegionSource::GeoJson(source)) => RegionBoundary::load(&source, &self.selector),
            Some(RegionSource::Loaded(boundary)) => Ok(boundary),
            None => Err(LoadError::FeatureNotFound {
                property: self.selector.property.clone(),
                name: self.selector.name.clone(),
            }),
        }
    }

    /// Builds the session. A region that fails to load is logged and leaves the session
    /// usable, but every marker placement is refused.
    #[instrument(skip(self))]
    pub fn build(mut self) -> SurveySession {
        let region = match self.load_region() {
            Ok(region) => {
                if self.frame_region {
                    self.surface.fit_bounds(region.extent());
                }
                Some(Arc::new(region))
            }
            Err(err) => {
                log::error!("Region boundary unavailable, marker placement disabled: {err}");
                None
            }
        };
        SurveySession {
            region,
            registry: PolygonRegistry::new(),
            thumbnails: Vec::new(),
            capture: CaptureOrchestrator::new(
                self.surface.clone(),
                self.backend.clone(),
                self.capture,
            ),
            analysis: AnalysisEngine::new(self.backend.clone()),
            surface: self.surface,
            backend: self.backend,
        }
    }
}

/// Everything one user works on: the region, drawn polygons, and their thumbnails.
pub struct SurveySession {
    region: Option<Arc<RegionBoundary>>,
    registry: PolygonRegistry,
    thumbnails: Vec<Thumbnail>,
    surface: Arc<dyn MapSurface>,
    backend: Arc<dyn ClassifierBackend>,
    capture: CaptureOrchestrator,
    analysis: AnalysisEngine,
}

impl SurveySession {
    pub fn region(&self) -> Option<&RegionBoundary> {
        self.region.as_deref()
    }

    pub fn surface(&self) -> &Arc<dyn MapSurface> {
        &self.surface
    }

    /// Adds a marker if `point` lies inside the region.
    pub fn place_marker(&mut self, point: GeoPoint) -> Result<(), InputError> {
        let region = self.region.as_ref().ok_or(InputError::RegionUnavailable)?;
        if !region.contains(point) {
            log::debug!("Rejected marker at {point:?}: outside region.");
            return Err(InputError::OutsideRegion {
                lat: point.lat,
                lng: point.lng,
            });
        }
        self.registry.add_vertex(point);
        Ok(())
    }

    /// Places a marker and reports it to the backend. A failed report is only logged, the
    /// marker stays placed.
    pub async fn place_and_record_marker(&mut self, point: GeoPoint) -> Result<(), InputError> {
        self.place_marker(point)?;
        if let Err(err) = self.backend.record_marker(point).await {
            log::warn!("Failed to record marker at {point:?}: {err}");
        }
        Ok(())
    }

    pub fn pending_markers(&self) -> &[GeoPoint] {
        self.registry.pending()
    }

    pub fn discard_markers(&mut self) {
        self.registry.discard_pending();
    }

    /// Turns the pending markers into a polygon and draws it. The first polygon of a session
    /// pins the zoom level so later crops share its scale.
    #[instrument(skip(self))]
    pub fn commit_polygon(&mut self) -> Result<ParcelPolygon, InputError> {
        let first = self.registry.is_empty();
        let polygon = self.registry.commit()?;
        self.surface.draw_outline(&polygon);
        if first {
            self.surface.lock_zoom();
            log::debug!(
                "Zoom latched at {} after first polygon.",
                self.surface.viewport().zoom()
            );
        }
        Ok(polygon)
    }

    pub fn polygons(&self) -> &[ParcelPolygon] {
        self.registry.polygons()
    }

    pub fn thumbnails(&self) -> &[Thumbnail] {
        &self.thumbnails
    }

    pub fn thumbnail(&self, id: PolygonId) -> Option<&Thumbnail> {
        self.thumbnails.iter().find(|thumb| thumb.polygon_id == id)
    }

    /// Polygons still waiting for a thumbnail, e.g. after a failed capture.
    pub fn uncaptured(&self) -> impl Iterator<Item = &ParcelPolygon> {
        self.registry
            .polygons()
            .iter()
            .filter(move |polygon| self.thumbnail(polygon.id).is_none())
    }

    /// Orchestrator sharing this session's surface and backend, for running several captures
    /// side by side before registering their thumbnails.
    pub fn capturer(&self) -> CaptureOrchestrator {
        self.capture.clone()
    }

    pub async fn commit_and_capture(&mut self) -> Result<Thumbnail> {
        let polygon = self.commit_polygon()?;
        self.capture_and_register(polygon.id).await
    }

    /// Captures `id` and registers the thumbnail, replacing any earlier one. Also used to retry
    /// a polygon whose capture failed.
    pub async fn capture_and_register(&mut self, id: PolygonId) -> Result<Thumbnail> {
        let polygon = self
            .registry
            .get(id)
            .cloned()
            .ok_or(Error::UnknownPolygon(id))?;
        let thumbnail = self.capture.capture(&polygon).await.inspect_err(|err| {
            log::warn!("Failed to capture thumbnail for polygon {id}: {err}");
        })?;
        self.register_thumbnail(thumbnail.clone())?;
        Ok(thumbnail)
    }

    /// Keeps one thumbnail per polygon, and only for polygons still in the registry.
    pub fn register_thumbnail(&mut self, thumbnail: Thumbnail) -> Result<()> {
        if !self.registry.contains(thumbnail.polygon_id) {
            return Err(Error::StaleThumbnail(thumbnail.polygon_id));
        }
        match self
            .thumbnails
            .iter_mut()
            .find(|existing| existing.polygon_id == thumbnail.polygon_id)
        {
            Some(existing) => *existing = thumbnail,
            None => self.thumbnails.push(thumbnail),
        }
        Ok(())
    }

    pub async fn analyze_all(&self) -> BatchReport {
        self.analysis.analyze_all(&self.thumbnails).await
    }

    /// Asks the backend to drop stored images, then clears local state. Local state is kept
    /// when the backend call fails.
    #[instrument(skip(self))]
    pub async fn reset(&mut self) -> Result<ResetResponse> {
        let response = self.backend.reset().await.map_err(Error::Reset)?;
        log::debug!(
            "{} (removed: {})",
            response.message,
            response.removed_files().collect::<Vec<_>>().join(", ")
        );
        self.clear();
        Ok(response)
    }

    /// Local half of [`SurveySession::reset`].
    pub fn clear(&mut self) {
        self.registry.clear();
        self.thumbnails.clear();
        self.surface.clear_outlines();
        self.surface.unlock_zoom();
    }
}
