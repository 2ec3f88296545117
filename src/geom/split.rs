use geo::{BooleanOps, BoundingRect, Coord, MultiPolygon, Rect};
use tracing::trace;

/// Count the nodes of a geometry: the exterior coordinates of every part,
/// closing coordinate included.
pub fn node_count(geometry: &MultiPolygon<f64>) -> usize {
    geometry.0.iter().map(|polygon| polygon.exterior().0.len()).sum()
}

/// Side length of the cell grid used to split a geometry with `nodes` nodes.
fn grid_dim(nodes: usize, node_threshold: usize) -> usize {
    let n_splits = nodes.div_ceil(node_threshold);
    ((n_splits as f64).sqrt().ceil() as usize).max(2)
}

/// Build a `dim x dim` grid of cells covering `bounds` exactly, row by row from the bottom.
/// The last row and column end at the bounds so no sliver is lost to rounding.
fn grid_cells(bounds: Rect<f64>, dim: usize) -> Vec<Rect<f64>> {
    let (min, max) = (bounds.min(), bounds.max());
    let dx = (max.x - min.x) / dim as f64;
    let dy = (max.y - min.y) / dim as f64;
    let edge = |lo: f64, step: f64, hi: f64, i: usize| if i == dim { hi } else { lo + step * i as f64 };

    let mut cells = Vec::with_capacity(dim * dim);
    for row in 0..dim {
        for col in 0..dim {
            cells.push(Rect::new(
                Coord { x: edge(min.x, dx, max.x, col), y: edge(min.y, dy, max.y, row) },
                Coord { x: edge(min.x, dx, max.x, col + 1), y: edge(min.y, dy, max.y, row + 1) },
            ));
        }
    }
    cells
}

/// Subdivide a geometry whose node count exceeds `node_threshold` by intersecting
/// it with a rectangular grid spanning its bounding box. Every non-empty piece of
/// every cell is kept as its own part; pieces are never merged back.
pub fn split_if_needed(geometry: MultiPolygon<f64>, node_threshold: usize) -> MultiPolygon<f64> {
    let nodes = node_count(&geometry);
    if node_threshold == 0 || nodes <= node_threshold {
        return geometry;
    }

    let Some(bounds) = geometry.bounding_rect() else { return geometry };
    if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
        return geometry;
    }

    let dim = grid_dim(nodes, node_threshold);
    trace!(nodes, node_threshold, dim, "splitting oversized geometry");

    let pieces = grid_cells(bounds, dim).into_iter()
        .flat_map(|cell| geometry.intersection(&cell.to_polygon()).0)
        .filter(|piece| !piece.exterior().0.is_empty())
        .collect();

    MultiPolygon::new(pieces)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geo::{polygon, Area};

    use super::*;

    fn square() -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0),
        ]])
    }

    /// Three prongs on a base; a 2x2 grid cuts the top row through two prongs per cell.
    fn comb() -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: 3.0), (x: 4.0, y: 3.0),
            (x: 4.0, y: 1.0), (x: 3.0, y: 1.0), (x: 3.0, y: 3.0), (x: 2.0, y: 3.0),
            (x: 2.0, y: 1.0), (x: 1.0, y: 1.0), (x: 1.0, y: 3.0), (x: 0.0, y: 3.0),
        ]])
    }

    #[test]
    fn node_count_includes_closing_coordinate() {
        assert_eq!(node_count(&square()), 5);
        assert_eq!(node_count(&comb()), 13);
    }

    #[test]
    fn small_geometry_is_unchanged() {
        assert_eq!(split_if_needed(square(), 5), square());
        assert_eq!(split_if_needed(square(), 100), square());
    }

    #[test]
    fn grid_is_at_least_two_by_two() {
        assert_eq!(grid_dim(5, 4), 2);
        assert_eq!(grid_dim(100, 10), 4);
        assert_eq!(grid_dim(101, 10), 4);
        assert_eq!(grid_dim(170, 10), 5);
    }

    #[test]
    fn square_splits_into_four_equal_pieces() {
        let pieces = split_if_needed(square(), 4);
        assert_eq!(pieces.0.len(), 4);
        for piece in &pieces.0 {
            assert_relative_eq!(piece.unsigned_area(), 25.0, max_relative = 1e-9);
        }
        assert_relative_eq!(pieces.unsigned_area(), 100.0, max_relative = 1e-6);
    }

    #[test]
    fn disjoint_pieces_within_a_cell_are_kept() {
        let original = comb();
        let pieces = split_if_needed(original.clone(), 12);
        // Bottom cells hold one piece each, top cells two prong stubs each.
        assert_eq!(pieces.0.len(), 6);
        assert_relative_eq!(pieces.unsigned_area(), original.unsigned_area(), max_relative = 1e-6);
        assert_relative_eq!(pieces.unsigned_area(), 11.0, max_relative = 1e-9);
    }

    #[test]
    fn cells_cover_bounds_exactly() {
        let bounds = Rect::new(Coord { x: -1.3, y: 0.7 }, Coord { x: 2.9, y: 5.1 });
        let cells = grid_cells(bounds, 3);
        assert_eq!(cells.len(), 9);
        assert_eq!(cells[0].min(), bounds.min());
        assert_eq!(cells[8].max(), bounds.max());
        let total: f64 = cells.iter().map(|cell| cell.unsigned_area()).sum();
        assert_relative_eq!(total, bounds.unsigned_area(), max_relative = 1e-12);
    }
}
