use geo::{BoundingRect, MultiPolygon, Rect};
use rstar::{RTree, RTreeObject, AABB};

/// A bounding box in an R-tree, associated with a record by its unique id.
#[derive(Debug, Clone)]
struct BoundingBox {
    id: i64,
    bbox: Rect<f64>,
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Bounding-box index over record geometries, answering "which ids might touch this?".
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    rtree: RTree<BoundingBox>,
}

impl SpatialIndex {
    pub fn new() -> Self { Self::default() }

    /// Bulk-load an index from `(id, geometry)` pairs. Empty geometries are skipped.
    pub fn from_geometries<'a>(items: impl IntoIterator<Item = (i64, &'a MultiPolygon<f64>)>) -> Self {
        Self {
            rtree: RTree::bulk_load(items.into_iter()
                .filter_map(|(id, geometry)| geometry.bounding_rect().map(|bbox| BoundingBox { id, bbox }))
                .collect()),
        }
    }

    pub fn add(&mut self, id: i64, geometry: &MultiPolygon<f64>) {
        if let Some(bbox) = geometry.bounding_rect() {
            self.rtree.insert(BoundingBox { id, bbox });
        }
    }

    #[inline] pub fn len(&self) -> usize { self.rtree.size() }

    #[inline] pub fn is_empty(&self) -> bool { self.rtree.size() == 0 }

    /// Get the ids whose bounding boxes intersect the geometry's, in ascending order.
    pub fn query(&self, geometry: &MultiPolygon<f64>) -> Vec<i64> {
        let Some(rect) = geometry.bounding_rect() else { return Vec::new() };
        let search = AABB::from_corners(rect.min().into(), rect.max().into());

        let mut ids = self.rtree.locate_in_envelope_intersecting(&search)
            .map(|candidate| candidate.id)
            .collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    fn unit_square(x: f64, y: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y), (x: x + 1.0, y: y), (x: x + 1.0, y: y + 1.0), (x: x, y: y + 1.0),
        ]])
    }

    #[test]
    fn query_returns_sorted_intersecting_ids() {
        let shapes = [(30, unit_square(1.0, 0.0)), (10, unit_square(0.0, 0.0)), (20, unit_square(5.0, 5.0))];
        let index = SpatialIndex::from_geometries(shapes.iter().map(|(id, g)| (*id, g)));
        assert_eq!(index.len(), 3);

        // Boxes sharing only an edge still intersect.
        assert_eq!(index.query(&unit_square(0.0, 0.0)), vec![10, 30]);
        assert_eq!(index.query(&unit_square(5.5, 5.5)), vec![20]);
        assert!(index.query(&unit_square(-9.0, -9.0)).is_empty());
    }

    #[test]
    fn incremental_add_matches_bulk_load() {
        let mut index = SpatialIndex::new();
        assert!(index.is_empty());
        index.add(2, &unit_square(0.0, 0.0));
        index.add(1, &unit_square(0.5, 0.5));
        assert_eq!(index.query(&unit_square(0.2, 0.2)), vec![1, 2]);
    }
}
