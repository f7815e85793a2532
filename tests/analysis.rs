mod common;

use std::time::Duration;

use common::{init_logging, land, MockBackend};
use landparcel::{
    error::AnalysisError, rank, score, AnalysisEngine, AnalysisResult, GeoPoint, PolygonId,
    Thumbnail,
};

fn result(index: u32, red: f64, rate: Option<f64>) -> AnalysisResult {
    AnalysisResult {
        polygon_id: PolygonId(index),
        input_image: format!("/static/thumb_{index}.png"),
        processed_image: format!("/static/classified_{index}.png"),
        polygon_area_sqft: red * 2.0,
        red_land_area_sqft: red,
        land_rate: rate,
        land_value: None,
        score: score(red, rate),
    }
}

fn thumbnails(count: u32) -> Vec<Thumbnail> {
    (0..count)
        .map(|index| Thumbnail {
            polygon_id: PolygonId(index),
            source_image: format!("/static/thumb_{index}.png"),
            last_vertex: Some(marker(index)),
        })
        .collect()
}

fn marker(index: u32) -> GeoPoint {
    GeoPoint::new(11.0 + index as f64, 78.0)
}

#[test]
fn score_divides_red_area_by_rate() {
    assert_eq!(score(10.0, Some(2.0)), 5.0);
    assert_eq!(score(9.0, Some(1.0)), 9.0);
}

#[test]
fn degenerate_rates_count_as_one() {
    assert_eq!(score(7.0, Some(0.0)), 7.0);
    assert_eq!(score(7.0, None), 7.0);
    assert_eq!(score(7.0, Some(-3.0)), 7.0);
    assert_eq!(score(7.0, Some(f64::NAN)), 7.0);
    assert_eq!(score(7.0, Some(0.5)), 7.0);
}

#[test]
fn ranking_is_stable_descending() {
    let ranked = rank(vec![
        result(0, 10.0, Some(2.0)),
        result(1, 9.0, Some(1.0)),
        result(2, 10.0, Some(2.0)),
    ]);
    let order = ranked
        .iter()
        .map(|entry| entry.result.polygon_id)
        .collect::<Vec<_>>();
    assert_eq!(order, vec![PolygonId(1), PolygonId(0), PolygonId(2)]);
    assert_eq!(
        ranked.iter().map(|entry| entry.rank).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(ranked[0].result.score, 9.0);
}

#[test]
fn rank_card_shows_two_decimals() {
    let ranked = rank(vec![result(4, 10.0, Some(3.0))]);
    let card = ranked[0].to_string();
    assert!(card.starts_with("Rank #1 (polygon #4)"), "{card}");
    assert!(card.contains("Score: 3.33"), "{card}");
    assert!(card.contains("Land Rate: 3 INR/sq ft"), "{card}");
    assert!(card.contains("Land Value: n/a"), "{card}");
}

#[tokio::test]
async fn batch_keeps_going_when_one_item_fails() {
    init_logging();
    let backend = MockBackend::new();
    for index in 0..5 {
        let outcome = if index == 2 {
            Err(500)
        } else {
            Ok(land(10.0 + index as f64, Some(1.0)))
        };
        backend.script(Some(marker(index)), outcome);
    }
    let engine = AnalysisEngine::new(backend.clone());

    let report = engine.analyze_all(&thumbnails(5)).await;

    assert_eq!(report.ranked.len(), 4);
    assert_eq!(report.failures.len(), 1);
    assert!(report.has_failures());
    let failure = &report.failures[0];
    assert_eq!(failure.polygon_id, PolygonId(2));
    assert_eq!(failure.index, 2);
    assert!(matches!(failure.error, AnalysisError::Submission(_)));
    assert_eq!(backend.analysis_requests.lock().unwrap().len(), 5);
    assert_eq!(
        report
            .results()
            .map(|result| result.polygon_id)
            .collect::<Vec<_>>(),
        vec![PolygonId(4), PolygonId(3), PolygonId(1), PolygonId(0)]
    );
}

#[tokio::test(start_paused = true)]
async fn output_order_does_not_follow_completion_order() {
    let backend = MockBackend::new();
    // Earlier items answer last.
    for index in 0..4u32 {
        backend.script_delayed(
            Some(marker(index)),
            Ok(land(if index % 2 == 0 { 6.0 } else { 8.0 }, Some(2.0))),
            Duration::from_millis(100 * (4 - index as u64)),
        );
    }
    let engine = AnalysisEngine::new(backend);

    let started = tokio::time::Instant::now();
    let report = engine.analyze_all(&thumbnails(4)).await;

    // Submissions overlap, so the batch takes as long as the slowest one.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(400), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");
    assert_eq!(
        report
            .results()
            .map(|result| result.polygon_id)
            .collect::<Vec<_>>(),
        vec![PolygonId(1), PolygonId(3), PolygonId(0), PolygonId(2)]
    );
}

#[tokio::test]
async fn requests_carry_reencoded_image_and_marker() {
    let backend = MockBackend::new();
    backend.script(Some(marker(0)), Ok(land(3.0, Some(0.0))));
    backend.script(None, Ok(land(1.0, None)));
    let mut batch = thumbnails(2);
    batch[1].last_vertex = None;
    let engine = AnalysisEngine::new(backend.clone());

    let report = engine.analyze_all(&batch).await;

    assert!(!report.has_failures());
    let requests = backend.analysis_requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    for request in requests.iter() {
        assert!(request.image.starts_with("data:image/png;base64,"));
    }
    assert!(requests.iter().any(|request| request.last_marker.is_none()));

    let top = &report.ranked[0].result;
    assert_eq!(top.polygon_id, PolygonId(0));
    assert_eq!(top.score, 3.0);
    assert_eq!(top.land_rate, Some(0.0));
    assert_eq!(top.input_image, "/static/thumb_0.png");
    assert_eq!(top.processed_image, "/static/classified_3.png");
}

#[tokio::test]
async fn fetch_and_response_problems_are_per_item() {
    let backend = MockBackend::new();
    backend
        .broken_images
        .lock()
        .unwrap()
        .insert("/static/thumb_0.png".to_owned());
    let mut no_image = land(5.0, Some(1.0));
    no_image.processed_image_url = None;
    backend.script(Some(marker(1)), Ok(no_image));
    backend.script(Some(marker(2)), Ok(land(5.0, Some(1.0))));
    let engine = AnalysisEngine::new(backend.clone());

    let report = engine.analyze_all(&thumbnails(3)).await;

    assert_eq!(report.ranked.len(), 1);
    assert_eq!(report.ranked[0].result.polygon_id, PolygonId(2));
    assert!(matches!(report.failures[0].error, AnalysisError::Fetch(_)));
    assert!(matches!(
        report.failures[1].error,
        AnalysisError::MissingProcessedImage
    ));
    // The broken thumbnail never reaches the analysis endpoint.
    assert_eq!(backend.analysis_requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_batch_is_empty() {
    let engine = AnalysisEngine::new(MockBackend::new());
    let report = engine.analyze_all(&[]).await;
    assert!(report.ranked.is_empty());
    assert!(!report.has_failures());
}
