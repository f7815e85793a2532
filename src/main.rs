use std::sync::Arc;

use anyhow::Context;
use landparcel::{
    backend::HttpBackend, config::SurveyConfig, projection::MapViewport, surface::CanvasSurface,
    GeoPoint, SurveySessionBuilder,
};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = SurveyConfig::from_env();
    log::debug!("{config:#?}");

    let base = image::open(&config.base_image)
        .with_context(|| format!("Failed to load base map {}", config.base_image.display()))?;
    let parcels: Vec<Vec<GeoPoint>> = serde_json::from_str(
        &std::fs::read_to_string(&config.parcels)
            .with_context(|| format!("Failed to read parcels {}", config.parcels.display()))?,
    )
    .context("Failed to parse parcels")?;

    let surface = Arc::new(CanvasSurface::new(
        base.clone(),
        MapViewport::new(base.width(), base.height()),
    ));
    let backend = Arc::new(HttpBackend::new(&config.backend_url)?);
    let mut session = SurveySessionBuilder::new(surface.clone(), backend)
        .region_path(&config.region_path)
        .selector(config.region.clone())
        .capture_options(config.capture)
        .build();
    if let Some(zoom) = config.initial_zoom {
        surface.set_zoom(zoom);
    }
    surface.complete_layout();

    for (index, parcel) in parcels.into_iter().enumerate() {
        for point in parcel {
            if let Err(err) = session.place_and_record_marker(point).await {
                log::warn!("Parcel {index}: {err}");
            }
        }
        match session.commit_and_capture().await {
            Ok(thumbnail) => log::info!("Parcel {index} captured: {}", thumbnail.source_image),
            Err(err) => {
                log::error!("Parcel {index} not captured: {err}");
                session.discard_markers();
            }
        }
    }

    let report = session.analyze_all().await;
    if report.has_failures() {
        println!(
            "{} polygon(s) could not be analyzed.",
            report.failures.len()
        );
    }
    for entry in &report.ranked {
        println!("{entry}");
    }
    Ok(())
}
