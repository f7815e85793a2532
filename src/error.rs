use std::path::PathBuf;

use thiserror::Error;

use crate::PolygonId;

/// Rejected user input. Nothing is mutated when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("select at least three points to form a polygon ({pending} pending)")]
    InsufficientVertices { pending: usize },
    #[error("point ({lat}, {lng}) lies outside the region, no marker placed")]
    OutsideRegion { lat: f64, lng: f64 },
    #[error("region boundary is not loaded, marker placement is disabled")]
    RegionUnavailable,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("projection unavailable: the map surface has not completed a layout pass")]
pub struct ProjectionUnavailable;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read region source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse region source: {0}")]
    Parse(#[from] geojson::Error),
    #[error("region source is not a feature collection")]
    NotFeatureCollection,
    #[error("no feature with {property} = {name:?} in region source")]
    FeatureNotFound { property: String, name: String },
    #[error("region feature has unsupported geometry {0}, expected Polygon or MultiPolygon")]
    UnsupportedGeometry(String),
    #[error("region feature has no ring with at least three points")]
    EmptyGeometry,
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend rejected {endpoint} with status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("backend response carries no processed image")]
    MissingImage,
    #[error("invalid image handle {0:?}")]
    InvalidHandle(String),
    #[error("invalid backend base url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("invalid data uri")]
    InvalidDataUri,
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Projection(#[from] ProjectionUnavailable),
    #[error("failed to rasterize map surface: {0}")]
    Rasterize(String),
    #[error("polygon {polygon} projects to an empty crop ({width}x{height} px)")]
    EmptyCrop {
        polygon: PolygonId,
        width: f64,
        height: f64,
    },
    #[error("failed to encode raster: {0}")]
    Encode(#[from] image::ImageError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to fetch thumbnail: {0}")]
    Fetch(#[source] SubmissionError),
    #[error("failed to re-encode thumbnail: {0}")]
    Image(#[from] image::ImageError),
    #[error("analysis request failed: {0}")]
    Submission(#[source] SubmissionError),
    #[error("failed to process image: backend returned no processed image")]
    MissingProcessedImage,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("reset failed: {0}")]
    Reset(#[source] SubmissionError),
    #[error("polygon {0} is not in the registry")]
    UnknownPolygon(PolygonId),
    #[error("thumbnail for polygon {0} outlived its polygon")]
    StaleThumbnail(PolygonId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
