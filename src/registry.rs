use tracing::instrument;

use crate::{error::InputError, GeoPoint, ParcelPolygon, PolygonId};

const MIN_VERTICES: usize = 3;

/// Pending markers plus every committed polygon, in commit order.
#[derive(Debug, Default)]
pub struct PolygonRegistry {
    pending: Vec<GeoPoint>,
    polygons: Vec<ParcelPolygon>,
    next_id: u32,
}

impl PolygonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a marker. Containment is the caller's job.
    pub fn add_vertex(&mut self, point: GeoPoint) {
        self.pending.push(point);
    }

    pub fn pending(&self) -> &[GeoPoint] {
        &self.pending
    }

    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    #[instrument(skip(self), fields(pending = self.pending.len()), level = "debug")]
    pub fn commit(&mut self) -> Result<ParcelPolygon, InputError> {
        if self.pending.len() < MIN_VERTICES {
            return Err(InputError::InsufficientVertices {
                pending: self.pending.len(),
            });
        }
        let vertices = std::mem::take(&mut self.pending);
        let last_vertex = vertices[vertices.len() - 1];
        let polygon = ParcelPolygon {
            id: PolygonId(self.next_id),
            vertices,
            last_vertex,
        };
        self.next_id += 1;
        self.polygons.push(polygon.clone());
        Ok(polygon)
    }

    pub fn get(&self, id: PolygonId) -> Option<&ParcelPolygon> {
        self.polygons.iter().find(|polygon| polygon.id == id)
    }

    pub fn contains(&self, id: PolygonId) -> bool {
        self.get(id).is_some()
    }

    pub fn polygons(&self) -> &[ParcelPolygon] {
        &self.polygons
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Drops every polygon and pending marker. Ids are never reused across clears.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.polygons.clear();
    }
}
