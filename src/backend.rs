use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::instrument;

use crate::{
    error::SubmissionError,
    util::{decode_data_uri, is_data_uri},
    GeoPoint, PixelBoundingBox,
};

const SAVE_IMAGE_ENDPOINT: &str = "save-image";
const LAND_DATA_ENDPOINT: &str = "get-land-data";
const CLEAN_IMAGES_ENDPOINT: &str = "clean-images";
const SAVE_COORDINATES_ENDPOINT: &str = "save-coordinates";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRequest {
    /// PNG data URI of the full surface raster, or of the local crop.
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<PixelBoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropResponse {
    pub processed_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub image: String,
    pub last_marker: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub processed_image_url: Option<String>,
    pub polygon_area_sqft: f64,
    pub red_land_area_sqft: f64,
    #[serde(default)]
    pub land_rate: Option<f64>,
    #[serde(default)]
    pub land_value: Option<f64>,
}

/// Reply of the reset endpoint. Older backends report one `removed` list, newer ones split it
/// per storage area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub removed_static: Vec<String>,
    #[serde(default)]
    pub removed_images: Vec<String>,
}

impl ResetResponse {
    pub fn removed_files(&self) -> impl Iterator<Item = &str> {
        self.removed
            .iter()
            .chain(&self.removed_static)
            .chain(&self.removed_images)
            .map(String::as_str)
    }
}

/// Classifier and valuation service the pipeline talks to.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn submit_crop(&self, request: &CropRequest) -> Result<CropResponse, SubmissionError>;

    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResponse, SubmissionError>;

    /// Loads the bytes behind an image handle previously returned by the backend.
    async fn fetch_image(&self, handle: &str) -> Result<Vec<u8>, SubmissionError>;

    async fn reset(&self) -> Result<ResetResponse, SubmissionError>;

    /// Reports an accepted marker. Backends that do not track markers ignore it.
    async fn record_marker(&self, _point: GeoPoint) -> Result<(), SubmissionError> {
        Ok(())
    }
}

/// JSON-over-HTTP client for the classifier service.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, SubmissionError> {
        let client = Client::builder()
            .user_agent(concat!("landparcel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(base_url, client)
    }

    /// Uses a preconfigured client, e.g. one with custom timeouts or proxy settings.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self, SubmissionError> {
        let mut base_url = base_url.to_owned();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url).map_err(|err| SubmissionError::InvalidBaseUrl {
            reason: err.to_string(),
            url: base_url.clone(),
        })?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, SubmissionError> {
        self.base_url
            .join(path)
            .map_err(|_| SubmissionError::InvalidHandle(path.to_owned()))
    }

    async fn post_json<B, R>(&self, endpoint: &str, body: Option<&B>) -> Result<R, SubmissionError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(endpoint)?;
        let request = self.client.post(url);
        let request = match body {
            Some(body) => request.json(body),
            None => request.header(reqwest::header::CONTENT_TYPE, "application/json"),
        };
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SubmissionError::Status {
                endpoint: endpoint.to_owned(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ClassifierBackend for HttpBackend {
    #[instrument(skip_all, level = "debug")]
    async fn submit_crop(&self, request: &CropRequest) -> Result<CropResponse, SubmissionError> {
        self.post_json(SAVE_IMAGE_ENDPOINT, Some(request)).await
    }

    #[instrument(skip_all, fields(last_marker = ?request.last_marker), level = "debug")]
    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResponse, SubmissionError> {
        self.post_json(LAND_DATA_ENDPOINT, Some(request)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_image(&self, handle: &str) -> Result<Vec<u8>, SubmissionError> {
        if is_data_uri(handle) {
            return decode_data_uri(handle);
        }
        let url = self.endpoint(handle)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SubmissionError::Status {
                endpoint: handle.to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    #[instrument(skip(self), level = "debug")]
    async fn reset(&self) -> Result<ResetResponse, SubmissionError> {
        self.post_json::<(), _>(CLEAN_IMAGES_ENDPOINT, None).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn record_marker(&self, point: GeoPoint) -> Result<(), SubmissionError> {
        let _: serde_json::Value = self
            .post_json(SAVE_COORDINATES_ENDPOINT, Some(&point))
            .await?;
        Ok(())
    }
}
