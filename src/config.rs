use std::{path::PathBuf, time::Duration};

use crate::{boundary::RegionSelector, capture::CaptureOptions};

/// Runtime settings. [`SurveyConfig::from_env`] lets every field be overridden through a
/// `LANDPARCEL_*` environment variable; unparsable values fall back to the default.
#[derive(Debug, Clone)]
pub struct SurveyConfig {
    pub backend_url: String,
    pub region_path: PathBuf,
    pub region: RegionSelector,
    pub capture: CaptureOptions,
    pub base_image: PathBuf,
    pub parcels: PathBuf,
    pub initial_zoom: Option<u8>,
}

impl SurveyConfig {
    /// Defaults overridden by whatever `LANDPARCEL_*` variables are set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let settle_delay = env_parse::<u64>("LANDPARCEL_SETTLE_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.capture.settle_delay);

        Self {
            backend_url: env_string("LANDPARCEL_BACKEND_URL").unwrap_or(defaults.backend_url),
            region_path: env_string("LANDPARCEL_REGION_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.region_path),
            region: RegionSelector::new(
                env_string("LANDPARCEL_NAME_PROPERTY").unwrap_or(defaults.region.property),
                env_string("LANDPARCEL_REGION_NAME").unwrap_or(defaults.region.name),
            ),
            capture: CaptureOptions {
                settle_delay,
                ..defaults.capture
            },
            base_image: env_string("LANDPARCEL_BASE_IMAGE")
                .map(PathBuf::from)
                .unwrap_or(defaults.base_image),
            parcels: env_string("LANDPARCEL_PARCELS")
                .map(PathBuf::from)
                .unwrap_or(defaults.parcels),
            initial_zoom: env_parse("LANDPARCEL_ZOOM").or(defaults.initial_zoom),
        }
    }
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".to_owned(),
            region_path: PathBuf::from("static/gadm41_IND_1.json"),
            region: RegionSelector::default(),
            capture: CaptureOptions::default(),
            base_image: PathBuf::from("static/base_map.png"),
            parcels: PathBuf::from("parcels.json"),
            initial_zoom: None,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = env_string(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring unparsable {key}={value:?}.");
            None
        }
    }
}
