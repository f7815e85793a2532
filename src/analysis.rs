use std::{cmp::Reverse, sync::Arc};

use float_ord::FloatOrd;
use futures::future::join_all;
use tracing::instrument;

use crate::{
    backend::{AnalysisRequest, ClassifierBackend},
    error::AnalysisError,
    util::reencode_png_data_uri,
    AnalysisFailure, AnalysisResult, BatchReport, RankedEntry, Thumbnail,
};

/// Red-land area per unit of land rate. Rates below 1, including zero and missing ones,
/// count as 1.
pub fn score(red_land_area_sqft: f64, land_rate: Option<f64>) -> f64 {
    red_land_area_sqft / land_rate.unwrap_or(1.0).max(1.0)
}

/// Stable sort by descending score; equal scores keep their input order.
pub fn rank(mut results: Vec<AnalysisResult>) -> Vec<RankedEntry> {
    results.sort_by_key(|result| Reverse(FloatOrd(result.score)));
    results
        .into_iter()
        .enumerate()
        .map(|(index, result)| RankedEntry {
            rank: index + 1,
            result,
        })
        .collect()
}

#[derive(Clone)]
pub struct AnalysisEngine {
    backend: Arc<dyn ClassifierBackend>,
}

impl AnalysisEngine {
    pub fn new(backend: Arc<dyn ClassifierBackend>) -> Self {
        Self { backend }
    }

    /// Submits every thumbnail at once and waits for all of them. A failed item is reported in
    /// [`BatchReport::failures`] and left out of the ranking.
    #[instrument(skip_all, fields(count = thumbnails.len()))]
    pub async fn analyze_all(&self, thumbnails: &[Thumbnail]) -> BatchReport {
        let outcomes = join_all(
            thumbnails
                .iter()
                .map(|thumbnail| self.analyze_one(thumbnail)),
        )
        .await;

        let mut results = Vec::with_capacity(thumbnails.len());
        let mut failures = Vec::new();
        for (index, (thumbnail, outcome)) in thumbnails.iter().zip(outcomes).enumerate() {
            match outcome {
                Ok(result) => results.push(result),
                Err(error) => {
                    log::warn!(
                        "Analysis of polygon {} failed: {error}",
                        thumbnail.polygon_id
                    );
                    failures.push(AnalysisFailure {
                        polygon_id: thumbnail.polygon_id,
                        index,
                        error,
                    });
                }
            }
        }
        log::debug!(
            "Batch finished with {} result(s) and {} failure(s).",
            results.len(),
            failures.len()
        );

        BatchReport {
            ranked: rank(results),
            failures,
        }
    }

    #[instrument(level = "debug", skip_all, fields(polygon = %thumbnail.polygon_id))]
    async fn analyze_one(&self, thumbnail: &Thumbnail) -> Result<AnalysisResult, AnalysisError> {
        let bytes = self
            .backend
            .fetch_image(&thumbnail.source_image)
            .await
            .map_err(AnalysisError::Fetch)?;
        let image = reencode_png_data_uri(&bytes)?;
        if thumbnail.last_vertex.is_none() {
            log::debug!(
                "Polygon {} has no last marker, analyzing without position.",
                thumbnail.polygon_id
            );
        }

        let response = self
            .backend
            .analyze(&AnalysisRequest {
                image,
                last_marker: thumbnail.last_vertex,
            })
            .await
            .map_err(AnalysisError::Submission)?;
        let processed_image = response
            .processed_image_url
            .ok_or(AnalysisError::MissingProcessedImage)?;

        Ok(AnalysisResult {
            polygon_id: thumbnail.polygon_id,
            input_image: thumbnail.source_image.clone(),
            processed_image,
            polygon_area_sqft: response.polygon_area_sqft,
            red_land_area_sqft: response.red_land_area_sqft,
            land_rate: response.land_rate,
            land_value: response.land_value,
            score: score(response.red_land_area_sqft, response.land_rate),
        })
    }
}
