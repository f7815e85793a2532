use std::path::Path;

use geo::{BoundingRect, Contains, Coord, LineString, Point, Polygon, Rect};
use geojson::{Feature, GeoJson, PolygonType, Value};
use tracing::instrument;

use crate::{error::LoadError, GeoPoint};

/// Which feature of a named-feature collection describes the region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSelector {
    pub property: String,
    pub name: String,
}

impl RegionSelector {
    pub fn new(property: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            name: name.into(),
        }
    }
}

impl Default for RegionSelector {
    fn default() -> Self {
        Self::new("NAME_1", "Tamil Nadu")
    }
}

/// Administrative boundary stored as a flat set of closed rings.
///
/// Interior holes of the source polygons are kept as ordinary rings, so a point inside a
/// hole counts as inside the region. Containment is the union of all rings.
#[derive(Debug, Clone)]
pub struct RegionBoundary {
    rings: Vec<Polygon<f64>>,
    extent: Rect<f64>,
}

impl RegionBoundary {
    pub fn from_rings<I, R>(rings: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = GeoPoint>,
    {
        let rings = rings
            .into_iter()
            .filter_map(|ring| to_ring(ring.into_iter().map(Coord::from).collect()))
            .collect::<Vec<_>>();
        Self::from_polygons(rings)
    }

    fn from_polygons(rings: Vec<Polygon<f64>>) -> Result<Self, LoadError> {
        let extent = rings
            .iter()
            .filter_map(|ring| ring.bounding_rect())
            .reduce(|acc, rect| {
                Rect::new(
                    Coord {
                        x: acc.min().x.min(rect.min().x),
                        y: acc.min().y.min(rect.min().y),
                    },
                    Coord {
                        x: acc.max().x.max(rect.max().x),
                        y: acc.max().y.max(rect.max().y),
                    },
                )
            })
            .ok_or(LoadError::EmptyGeometry)?;
        Ok(Self { rings, extent })
    }

    /// Parses a GeoJSON feature collection and keeps the single feature selected by `selector`.
    #[instrument(skip(source), level = "debug")]
    pub fn load(source: &str, selector: &RegionSelector) -> Result<Self, LoadError> {
        let GeoJson::FeatureCollection(collection) = source.parse::<GeoJson>()? else {
            return Err(LoadError::NotFeatureCollection);
        };
        let feature = collection
            .features
            .iter()
            .find(|feature| matches_selector(feature, selector))
            .ok_or_else(|| LoadError::FeatureNotFound {
                property: selector.property.clone(),
                name: selector.name.clone(),
            })?;
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or(LoadError::EmptyGeometry)?;

        let polygons: Vec<&PolygonType> = match &geometry.value {
            Value::Polygon(polygon) => vec![polygon],
            Value::MultiPolygon(polygons) => polygons.iter().collect(),
            other => return Err(LoadError::UnsupportedGeometry(type_name(other).to_owned())),
        };

        let mut skipped = 0;
        let rings = polygons
            .into_iter()
            .flatten()
            .filter_map(|positions| {
                let coords = positions
                    .iter()
                    .filter(|position| position.len() >= 2)
                    .map(|position| Coord {
                        x: position[0],
                        y: position[1],
                    })
                    .collect();
                let ring = to_ring(coords);
                if ring.is_none() {
                    skipped += 1;
                }
                ring
            })
            .collect::<Vec<_>>();
        if skipped > 0 {
            log::warn!("Skipped {skipped} degenerate ring(s) in region {:?}.", selector.name);
        }

        let boundary = Self::from_polygons(rings)?;
        log::debug!(
            "Loaded region {:?} with {} ring(s), extent {:?}.",
            selector.name,
            boundary.rings.len(),
            boundary.extent
        );
        Ok(boundary)
    }

    pub fn load_path(path: impl AsRef<Path>, selector: &RegionSelector) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(&source, selector)
    }

    /// Point-in-polygon test OR-ed across every ring. Points exactly on a ring edge may go
    /// either way.
    pub fn contains(&self, point: GeoPoint) -> bool {
        let point = Point::from(Coord::from(point));
        self.rings.iter().any(|ring| ring.contains(&point))
    }

    pub fn extent(&self) -> Rect<f64> {
        self.extent
    }

    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }
}

fn matches_selector(feature: &Feature, selector: &RegionSelector) -> bool {
    feature
        .property(&selector.property)
        .and_then(|value| value.as_str())
        .is_some_and(|value| value == selector.name)
}

fn to_ring(mut coords: Vec<Coord<f64>>) -> Option<Polygon<f64>> {
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    if coords.len() < 3 {
        return None;
    }
    Some(Polygon::new(LineString::new(coords), vec![]))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}
