use geo::{Coord, LineString, MultiPolygon, Polygon};
use ndarray::Array2;

use crate::error::{Error, Result};

use super::fragment::{GlobalMesh, NO_NEIGHBOR};

/// Fixed-shape mesh arrays, ready for the container.
///
/// Nodes are not deduplicated: every ring of every element gets its own run of
/// node indices, in element order.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatMeshArrays {
    /// `[nodeCount, 2]` longitude / latitude.
    pub node_coords: Array2<f64>,
    /// Node indices offset by `start_index`, rings of one element separated by `break_value`.
    pub element_conn: Vec<i64>,
    /// Number of `element_conn` entries per element, break values included.
    pub num_element_conn: Vec<i64>,
    /// `[elementCount, 2]` representative points.
    pub center_coords: Array2<f64>,
    pub element_ids: Vec<i64>,
    pub element_area: Vec<f64>,
    /// Flattened neighbor positions and per-element counts, when adjacency was computed.
    pub neighbors: Option<FlatNeighbors>,
    pub start_index: i64,
    pub break_value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatNeighbors {
    pub element_neighbors: Vec<i64>,
    pub num_element_neighbors: Vec<i64>,
}

impl FlatMeshArrays {
    #[inline] pub fn element_count(&self) -> usize { self.element_ids.len() }

    #[inline] pub fn node_count(&self) -> usize { self.node_coords.nrows() }

    /// Connectivity slice of every element, in order.
    pub fn element_slices(&self) -> Result<Vec<&[i64]>> {
        let total = self.num_element_conn.iter().sum::<i64>();
        if total != self.element_conn.len() as i64 || self.num_element_conn.iter().any(|&n| n < 0) {
            return Err(Error::artifact(
                "mesh",
                format!("per-element counts sum to {total}, connectivity has {} entries", self.element_conn.len()),
            ));
        }

        let mut offset = 0;
        Ok(self.num_element_conn.iter()
            .map(|&n| {
                let slice = &self.element_conn[offset..offset + n as usize];
                offset += n as usize;
                slice
            })
            .collect())
    }

    /// Rebuild every element's polygons from the flat arrays, one closed exterior
    /// ring per part.
    pub fn decode(&self) -> Result<Vec<MultiPolygon<f64>>> {
        self.element_slices()?.into_iter().enumerate()
            .map(|(element, slice)| -> Result<MultiPolygon<f64>> {
                slice.split(|&index| index == self.break_value)
                    .map(|ring| -> Result<Polygon<f64>> {
                        let mut coords = ring.iter()
                            .map(|&index| self.node(index).ok_or_else(|| Error::artifact(
                                "mesh",
                                format!("element {element} references node {index} outside the node array"),
                            )))
                            .collect::<Result<Vec<_>>>()?;
                        if let Some(&first) = coords.first() {
                            coords.push(first);
                        }
                        Ok(Polygon::new(LineString(coords), Vec::new()))
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(MultiPolygon)
            })
            .collect()
    }

    fn node(&self, index: i64) -> Option<Coord<f64>> {
        let row = usize::try_from(index - self.start_index).ok()?;
        (row < self.node_count()).then(|| Coord { x: self.node_coords[[row, 0]], y: self.node_coords[[row, 1]] })
    }
}

/// Flatten the ragged global mesh.
pub fn encode(mesh: &GlobalMesh, start_index: i64, break_value: i64) -> Result<FlatMeshArrays> {
    let n_nodes: usize = mesh.elements.iter().map(|element| element.node_count()).sum();
    let mut nodes = Vec::with_capacity(n_nodes * 2);
    let mut element_conn = Vec::with_capacity(n_nodes + mesh.len());
    let mut num_element_conn = Vec::with_capacity(mesh.len());
    let mut centers = Vec::with_capacity(mesh.len() * 2);

    let mut next = start_index;
    for element in &mesh.elements {
        let before = element_conn.len();
        for (i, ring) in element.rings.iter().enumerate() {
            if i > 0 {
                element_conn.push(break_value);
            }
            for coord in ring {
                nodes.extend([coord.x, coord.y]);
                element_conn.push(next);
                next += 1;
            }
        }
        num_element_conn.push((element_conn.len() - before) as i64);
        centers.extend([element.point.x, element.point.y]);
    }

    let shape_error = |e: ndarray::ShapeError| Error::artifact("mesh", e.to_string());
    let node_coords = Array2::from_shape_vec((n_nodes, 2), nodes).map_err(shape_error)?;
    let center_coords = Array2::from_shape_vec((mesh.len(), 2), centers).map_err(shape_error)?;

    let neighbors = mesh.neighbors.as_ref().map(|all| FlatNeighbors {
        element_neighbors: all.iter().flat_map(|ns| ns.iter().copied()).collect(),
        num_element_neighbors: all.iter().map(|ns| ns.len() as i64).collect(),
    });

    Ok(FlatMeshArrays {
        node_coords,
        element_conn,
        num_element_conn,
        center_coords,
        element_ids: mesh.elements.iter().map(|element| element.id).collect(),
        element_area: mesh.elements.iter().map(|element| element.area).collect(),
        neighbors,
        start_index,
        break_value,
    })
}

impl FlatNeighbors {
    /// Neighbor positions of every element, the sentinel dropped.
    pub fn per_element(&self) -> Result<Vec<Vec<i64>>> {
        let total = self.num_element_neighbors.iter().sum::<i64>();
        if total != self.element_neighbors.len() as i64 || self.num_element_neighbors.iter().any(|&n| n < 0) {
            return Err(Error::artifact(
                "mesh",
                format!("neighbor counts sum to {total}, neighbor list has {} entries", self.element_neighbors.len()),
            ));
        }

        let mut offset = 0;
        Ok(self.num_element_neighbors.iter()
            .map(|&n| {
                let slice = &self.element_neighbors[offset..offset + n as usize];
                offset += n as usize;
                slice.iter().copied().filter(|&p| p != NO_NEIGHBOR).collect()
            })
            .collect())
    }
}
