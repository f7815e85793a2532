use landparcel::{error::InputError, GeoPoint, PolygonId, PolygonRegistry};

fn points(count: usize) -> Vec<GeoPoint> {
    (0..count)
        .map(|i| GeoPoint::new(11.0 + i as f64 * 0.001, 78.5 + (i % 2) as f64 * 0.001))
        .collect()
}

#[test]
fn commit_needs_three_vertices() {
    for count in 0..3 {
        let mut registry = PolygonRegistry::new();
        for point in points(count) {
            registry.add_vertex(point);
        }
        assert_eq!(
            registry.commit(),
            Err(InputError::InsufficientVertices { pending: count })
        );
        assert_eq!(registry.pending().len(), count, "pending markers are kept");
        assert!(registry.is_empty());
    }
}

#[test]
fn three_colinear_vertices_commit() {
    let mut registry = PolygonRegistry::new();
    let line = [
        GeoPoint::new(11.0, 78.5),
        GeoPoint::new(11.0, 78.501),
        GeoPoint::new(11.0, 78.502),
    ];
    for point in line {
        registry.add_vertex(point);
    }
    let polygon = registry.commit().expect("Three points are enough");
    assert_eq!(polygon.vertices, line);
    assert_eq!(polygon.last_vertex, line[2]);
    assert!(registry.pending().is_empty());
    assert_eq!(registry.len(), 1);
}

#[test]
fn polygons_get_distinct_ids_in_commit_order() {
    let mut registry = PolygonRegistry::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        for point in points(4) {
            registry.add_vertex(point);
        }
        ids.push(registry.commit().unwrap().id);
    }
    assert_eq!(ids, vec![PolygonId(0), PolygonId(1), PolygonId(2)]);
    assert_eq!(
        registry.polygons().iter().map(|it| it.id).collect::<Vec<_>>(),
        ids
    );
    assert_eq!(registry.get(PolygonId(1)).unwrap().vertices.len(), 4);
}

#[test]
fn clear_then_commit_leaves_a_single_polygon() {
    let mut registry = PolygonRegistry::new();
    for _ in 0..2 {
        for point in points(3) {
            registry.add_vertex(point);
        }
        registry.commit().unwrap();
    }
    registry.add_vertex(GeoPoint::new(12.0, 79.0));

    registry.clear();
    assert!(registry.is_empty());
    assert!(registry.pending().is_empty());

    let fresh = points(3);
    for point in fresh.iter().copied() {
        registry.add_vertex(point);
    }
    let polygon = registry.commit().unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.polygons()[0].vertices, fresh);
    assert!(!registry.contains(PolygonId(0)));
    assert!(registry.contains(polygon.id));
}

#[test]
fn discarding_pending_keeps_polygons() {
    let mut registry = PolygonRegistry::new();
    for point in points(3) {
        registry.add_vertex(point);
    }
    registry.commit().unwrap();
    registry.add_vertex(GeoPoint::new(12.0, 79.0));
    registry.discard_pending();
    assert!(registry.pending().is_empty());
    assert_eq!(registry.len(), 1);
}
