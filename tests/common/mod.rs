#![allow(dead_code)]

use std::{
    collections::HashSet,
    io::Cursor,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use geo::Rect;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use landparcel::{
    backend::{
        AnalysisRequest, AnalysisResponse, ClassifierBackend, CropRequest, CropResponse,
        ResetResponse,
    },
    error::{CaptureError, SubmissionError},
    projection::MapViewport,
    surface::{CanvasSurface, MapSurface},
    GeoPoint, ParcelPolygon, SurveySession, SurveySessionBuilder,
};

pub const REGIONS: &str = include_str!("../data/regions.geojson");

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([40, 120, 40, 255]),
    ));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode png");
    bytes
}

pub fn land(red_land_area_sqft: f64, land_rate: Option<f64>) -> AnalysisResponse {
    AnalysisResponse {
        processed_image_url: Some(format!("/static/classified_{red_land_area_sqft}.png")),
        polygon_area_sqft: red_land_area_sqft * 2.0,
        red_land_area_sqft,
        land_rate,
        land_value: land_rate.map(|rate| rate * red_land_area_sqft),
    }
}

struct Scripted {
    marker: Option<GeoPoint>,
    outcome: Result<AnalysisResponse, u16>,
    delay: Duration,
}

/// Backend double that records requests and replays scripted analysis outcomes, matched by
/// the request's last marker.
#[derive(Default)]
pub struct MockBackend {
    pub crop_requests: Mutex<Vec<CropRequest>>,
    pub analysis_requests: Mutex<Vec<AnalysisRequest>>,
    pub crop_status: Mutex<Option<u16>>,
    pub omit_crop_url: AtomicBool,
    pub broken_images: Mutex<HashSet<String>>,
    pub reset_fails: AtomicBool,
    pub resets: AtomicUsize,
    pub recorded_markers: Mutex<Vec<GeoPoint>>,
    pub record_fails: AtomicBool,
    crops: AtomicUsize,
    script: Mutex<Vec<Scripted>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, marker: Option<GeoPoint>, outcome: Result<AnalysisResponse, u16>) {
        self.script_delayed(marker, outcome, Duration::ZERO);
    }

    pub fn script_delayed(
        &self,
        marker: Option<GeoPoint>,
        outcome: Result<AnalysisResponse, u16>,
        delay: Duration,
    ) {
        self.script.lock().unwrap().push(Scripted {
            marker,
            outcome,
            delay,
        });
    }

    pub fn fail_crops(&self, status: Option<u16>) {
        *self.crop_status.lock().unwrap() = status;
    }

    pub fn crop_count(&self) -> usize {
        self.crop_requests.lock().unwrap().len()
    }

    pub fn last_crop(&self) -> CropRequest {
        self.crop_requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("No crop submitted")
    }
}

#[async_trait]
impl ClassifierBackend for MockBackend {
    async fn submit_crop(&self, request: &CropRequest) -> Result<CropResponse, SubmissionError> {
        self.crop_requests.lock().unwrap().push(request.clone());
        if let Some(status) = *self.crop_status.lock().unwrap() {
            return Err(SubmissionError::Status {
                endpoint: "save-image".into(),
                status,
            });
        }
        if self.omit_crop_url.load(Ordering::SeqCst) {
            return Ok(CropResponse {
                processed_image_url: None,
            });
        }
        let n = self.crops.fetch_add(1, Ordering::SeqCst);
        Ok(CropResponse {
            processed_image_url: Some(format!("/static/thumb_{n}.png")),
        })
    }

    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResponse, SubmissionError> {
        self.analysis_requests.lock().unwrap().push(request.clone());
        let (outcome, delay) = {
            let script = self.script.lock().unwrap();
            match script.iter().find(|it| it.marker == request.last_marker) {
                Some(it) => (it.outcome.clone(), it.delay),
                None => (Err(404), Duration::ZERO),
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome.map_err(|status| SubmissionError::Status {
            endpoint: "get-land-data".into(),
            status,
        })
    }

    async fn fetch_image(&self, handle: &str) -> Result<Vec<u8>, SubmissionError> {
        if self.broken_images.lock().unwrap().contains(handle) {
            return Err(SubmissionError::Status {
                endpoint: handle.to_owned(),
                status: 404,
            });
        }
        Ok(png_bytes(4, 3))
    }

    async fn reset(&self) -> Result<ResetResponse, SubmissionError> {
        if self.reset_fails.load(Ordering::SeqCst) {
            return Err(SubmissionError::Status {
                endpoint: "clean-images".into(),
                status: 500,
            });
        }
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(ResetResponse {
            message: "Images cleaned".into(),
            removed_static: vec!["classified_land_image.png".into()],
            removed_images: vec!["cropped_polygon.png".into()],
            ..ResetResponse::default()
        })
    }

    async fn record_marker(&self, point: GeoPoint) -> Result<(), SubmissionError> {
        if self.record_fails.load(Ordering::SeqCst) {
            return Err(SubmissionError::Status {
                endpoint: "save-coordinates".into(),
                status: 500,
            });
        }
        self.recorded_markers.lock().unwrap().push(point);
        Ok(())
    }
}

/// Canvas surface that cannot acknowledge rendering, forcing the settle delay.
pub struct UnackedSurface(pub CanvasSurface);

#[async_trait]
impl MapSurface for UnackedSurface {
    fn viewport(&self) -> MapViewport {
        self.0.viewport()
    }

    fn lock_zoom(&self) {
        self.0.lock_zoom()
    }

    fn unlock_zoom(&self) {
        self.0.unlock_zoom()
    }

    fn fit_bounds(&self, bounds: Rect<f64>) {
        self.0.fit_bounds(bounds)
    }

    fn draw_outline(&self, polygon: &ParcelPolygon) {
        self.0.draw_outline(polygon)
    }

    fn clear_outlines(&self) {
        self.0.clear_outlines()
    }

    async fn rasterize(&self) -> Result<DynamicImage, CaptureError> {
        self.0.rasterize().await
    }
}

pub fn blank_surface() -> CanvasSurface {
    let base = DynamicImage::ImageRgba8(RgbaImage::from_pixel(640, 480, Rgba([0, 0, 0, 255])));
    CanvasSurface::new(base, MapViewport::new(640, 480))
}

/// Session over Testland with a laid-out canvas surface.
pub fn session(backend: Arc<MockBackend>) -> (SurveySession, Arc<CanvasSurface>) {
    let surface = Arc::new(blank_surface());
    let session = SurveySessionBuilder::new(surface.clone(), backend)
        .region_geojson(REGIONS)
        .region_name("Testland")
        .settle_delay(Duration::from_millis(250))
        .build();
    surface.complete_layout();
    (session, surface)
}

/// A small triangle inside Testland's mainland, shifted by `offset` degrees of latitude.
pub fn triangle(offset: f64) -> [GeoPoint; 3] {
    [
        GeoPoint::new(11.0 + offset, 11.0),
        GeoPoint::new(11.0 + offset, 12.5),
        GeoPoint::new(12.0 + offset, 12.0),
    ]
}

pub fn place_all(session: &mut SurveySession, points: &[GeoPoint]) {
    for point in points {
        session
            .place_marker(*point)
            .expect("Marker should be inside the region");
    }
}
