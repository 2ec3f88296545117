//! Mapping between flat mesh arrays and the ESMF unstructured container layout,
//! plus the end-to-end conversion entry point.

use std::path::Path;

use ahash::AHashSet;
use ndarray::Array2;
use tracing::{info, instrument};

use crate::{
    comm::Communicator,
    config::{MeshConfig, COORD_DIM_LABEL, FORMAT_VERSION, GRID_TYPE},
    context::Context,
    error::{Error, IdentifierError, Result},
    io::{AttrValue, Dataset, Values},
    source::GeometrySource,
};

use super::{
    assemble::build_mesh,
    encode::{encode, FlatMeshArrays, FlatNeighbors},
};

pub const NODE_COUNT: &str = "nodeCount";
pub const ELEMENT_COUNT: &str = "elementCount";
pub const COORD_DIM: &str = "coordDim";
pub const CONNECTION_COUNT: &str = "connectionCount";
pub const NEIGHBOR_COUNT: &str = "neighborCount";

pub const NODE_COORDS: &str = "nodeCoords";
pub const ELEMENT_CONN: &str = "elementConn";
pub const NUM_ELEMENT_CONN: &str = "numElementConn";
pub const CENTER_COORDS: &str = "centerCoords";
pub const ELEMENT_AREA: &str = "elementArea";
pub const ELEMENT_NEIGHBORS: &str = "elementNeighbors";
pub const NUM_ELEMENT_NEIGHBORS: &str = "numElementNeighbors";

const RESERVED: [&str; 7] = [
    NODE_COORDS, ELEMENT_CONN, NUM_ELEMENT_CONN, CENTER_COORDS, ELEMENT_AREA, ELEMENT_NEIGHBORS, NUM_ELEMENT_NEIGHBORS,
];

/// Lay the flat arrays out as an ESMF unstructured mesh container. The element
/// ids are stored under `uid_name`.
pub fn to_dataset(flat: &FlatMeshArrays, uid_name: &str) -> Result<Dataset> {
    if RESERVED.contains(&uid_name) {
        return Err(Error::artifact("mesh", format!("unique id name {uid_name:?} clashes with a mesh variable")));
    }

    let mut ds = Dataset::new();
    ds.set_attr("gridType", GRID_TYPE)
        .set_attr("version", FORMAT_VERSION)
        .set_attr("coordDim", COORD_DIM_LABEL);

    ds.add_dim(NODE_COUNT, flat.node_count())?;
    ds.add_dim(ELEMENT_COUNT, flat.element_count())?;
    ds.add_dim(COORD_DIM, 2)?;
    ds.add_dim(CONNECTION_COUNT, flat.element_conn.len())?;

    ds.add_variable(NODE_COORDS, &[NODE_COUNT, COORD_DIM], Values::Float(flat.node_coords.iter().copied().collect()))?
        .set_attr("units", "degrees");
    ds.add_variable(ELEMENT_CONN, &[CONNECTION_COUNT], Values::Int(flat.element_conn.clone()))?
        .set_attr("long_name", "Node indices that define the element connectivity.")
        .set_attr("start_index", flat.start_index)
        .set_attr("polygon_break_value", flat.break_value);
    ds.add_variable(NUM_ELEMENT_CONN, &[ELEMENT_COUNT], Values::Int(flat.num_element_conn.clone()))?
        .set_attr("long_name", "Number of nodes per element.");
    ds.add_variable(CENTER_COORDS, &[ELEMENT_COUNT, COORD_DIM], Values::Float(flat.center_coords.iter().copied().collect()))?
        .set_attr("units", "degrees");
    ds.add_variable(uid_name, &[ELEMENT_COUNT], Values::Int(flat.element_ids.clone()))?;
    ds.add_variable(ELEMENT_AREA, &[ELEMENT_COUNT], Values::Float(flat.element_area.clone()))?
        .set_attr("units", "native");

    if let Some(neighbors) = &flat.neighbors {
        ds.add_dim(NEIGHBOR_COUNT, neighbors.element_neighbors.len())?;
        ds.add_variable(ELEMENT_NEIGHBORS, &[NEIGHBOR_COUNT], Values::Int(neighbors.element_neighbors.clone()))?
            .set_attr("long_name", "Positions of touching elements, -1 when none.");
        ds.add_variable(NUM_ELEMENT_NEIGHBORS, &[ELEMENT_COUNT], Values::Int(neighbors.num_element_neighbors.clone()))?;
    }

    Ok(ds)
}

fn int_attr(ds: &Dataset, var: &str, name: &str) -> Result<i64> {
    ds.var(var)?.attr(name).and_then(AttrValue::as_int)
        .ok_or_else(|| Error::artifact("mesh", format!("{var} is missing integer attribute {name:?}")))
}

fn coords(ds: &Dataset, var: &str) -> Result<Array2<f64>> {
    let shape = ds.shape(var)?;
    let [rows, 2] = shape[..] else {
        return Err(Error::artifact("mesh", format!("{var} must have shape [n, 2], found {shape:?}")));
    };
    Array2::from_shape_vec((rows, 2), ds.floats(var)?).map_err(|e| Error::artifact("mesh", e.to_string()))
}

/// Read the flat arrays back from a mesh container.
pub fn from_dataset(ds: &Dataset, uid_name: &str) -> Result<FlatMeshArrays> {
    let neighbors = if ds.has_var(ELEMENT_NEIGHBORS) {
        Some(FlatNeighbors {
            element_neighbors: ds.ints(ELEMENT_NEIGHBORS)?.to_vec(),
            num_element_neighbors: ds.ints(NUM_ELEMENT_NEIGHBORS)?.to_vec(),
        })
    } else {
        None
    };

    Ok(FlatMeshArrays {
        node_coords: coords(ds, NODE_COORDS)?,
        element_conn: ds.ints(ELEMENT_CONN)?.to_vec(),
        num_element_conn: ds.ints(NUM_ELEMENT_CONN)?.to_vec(),
        center_coords: coords(ds, CENTER_COORDS)?,
        element_ids: ds.ints(uid_name)?.to_vec(),
        element_area: ds.floats(ELEMENT_AREA)?,
        neighbors,
        start_index: int_attr(ds, ELEMENT_CONN, "start_index")?,
        break_value: int_attr(ds, ELEMENT_CONN, "polygon_break_value")?,
    })
}

/// Check a written mesh for internal consistency: unique ids, the expected
/// element count, per-element counts matching the connectivity, and every
/// element decoding to polygons.
pub fn validate_mesh(ds: &Dataset, uid_name: &str, expected_elements: Option<usize>) -> Result<()> {
    match ds.attr("gridType").and_then(AttrValue::as_text) {
        Some(GRID_TYPE) => {}
        other => return Err(Error::artifact("mesh", format!("gridType must be {GRID_TYPE:?}, found {other:?}"))),
    }

    let flat = from_dataset(ds, uid_name)?;

    let mut seen = AHashSet::with_capacity(flat.element_count());
    for &id in &flat.element_ids {
        if !seen.insert(id) {
            return Err(IdentifierError::Duplicate(id).into());
        }
    }

    if let Some(expected) = expected_elements {
        if flat.element_count() != expected {
            return Err(Error::artifact(
                "mesh",
                format!("{} elements, expected {expected}", flat.element_count()),
            ));
        }
    }

    let polygons = flat.decode()?;
    if let Some(position) = polygons.iter().position(|polygon| polygon.0.iter().any(|p| p.exterior().0.len() < 4)) {
        return Err(Error::artifact("mesh", format!("element {position} has a ring with fewer than three nodes")));
    }

    if let Some(neighbors) = &flat.neighbors {
        if neighbors.num_element_neighbors.len() != flat.element_count() {
            return Err(Error::artifact("mesh", "neighbor counts do not match the element count"));
        }
        let elements = flat.element_count() as i64;
        for (element, positions) in neighbors.per_element()?.iter().enumerate() {
            if let Some(p) = positions.iter().find(|&&p| !(0..elements).contains(&p)) {
                return Err(Error::artifact("mesh", format!("element {element} has neighbor position {p} out of range")));
            }
        }
    }

    Ok(())
}

/// Convert a geometry source into a mesh file at `output`.
///
/// Every rank assembles its section; the coordinator merges, encodes and writes,
/// then all ranks meet at a barrier so the file exists when any rank returns.
/// Returns the flat arrays on the coordinator.
#[instrument(skip_all, fields(output = %output.display()))]
pub fn convert<C, S>(ctx: &Context<C, MeshConfig>, source: &S, output: &Path) -> Result<Option<FlatMeshArrays>>
where
    C: Communicator,
    S: GeometrySource + ?Sized,
{
    let mesh = build_mesh(ctx, source)?;

    let flat = match mesh {
        Some(mesh) => {
            let config = ctx.config();
            let flat = encode(&mesh, config.start_index, config.break_value)?;
            let ds = to_dataset(&flat, &config.uid_field)?;
            validate_mesh(&ds, &config.uid_field, Some(source.len()))?;
            ds.write(output)?;
            info!(elements = flat.element_count(), nodes = flat.node_count(), "wrote mesh");
            Some(flat)
        }
        None => None,
    };

    ctx.comm().barrier()?;
    Ok(flat)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geo::polygon;

    use super::*;
    use crate::{
        comm::{run_threads, SerialComm},
        mesh::fragment::{GlobalMesh, MeshElement},
        source::tests::unit_grid,
    };

    #[test]
    fn square_round_trip_through_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.json");

        let mut source = unit_grid(1, 1).records_ref().to_vec();
        source[0].geometry = polygon![
            (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0),
        ].into();
        let source = crate::source::MemorySource::new(source);

        let config = MeshConfig::new("GRIDCODE");
        let ctx = Context::new(&SerialComm, &config);
        convert(&ctx, &source, &path).unwrap().unwrap();

        let ds = Dataset::read(&path).unwrap();
        assert_eq!(ds.attr("gridType"), Some(&AttrValue::Text("unstructured".into())));
        assert_eq!(ds.attr("version"), Some(&AttrValue::Text("0.9".into())));
        assert_eq!(ds.ints(NUM_ELEMENT_CONN).unwrap(), &[4]);
        assert_eq!(ds.ints(ELEMENT_CONN).unwrap(), &[0, 1, 2, 3]);
        assert_eq!(ds.ints("GRIDCODE").unwrap(), &[1]);
        assert_relative_eq!(ds.floats(ELEMENT_AREA).unwrap()[0], 100.0);
        assert_eq!(ds.shape(NODE_COORDS).unwrap(), vec![4, 2]);
        assert_eq!(int_attr(&ds, ELEMENT_CONN, "polygon_break_value").unwrap(), -8);
        assert!(!ds.has_var(ELEMENT_NEIGHBORS));
    }

    #[test]
    fn multi_rank_convert_writes_adjacency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        let source = unit_grid(3, 2);
        let config = MeshConfig { compute_adjacency: true, ..MeshConfig::new("id") };

        let results = run_threads(3, |comm| {
            let ctx = Context::new(&comm, &config);
            convert(&ctx, &source, &path)
        }).unwrap();
        assert!(results[0].is_some());
        assert!(results[1..].iter().all(Option::is_none));

        let ds = Dataset::read(&path).unwrap();
        validate_mesh(&ds, "id", Some(6)).unwrap();
        let flat = from_dataset(&ds, "id").unwrap();
        assert_eq!(flat.element_ids, vec![1, 2, 3, 4, 5, 6]);
        // Cell 2 (bottom middle) touches every other cell of the 3x2 grid.
        assert_eq!(flat.neighbors.unwrap().per_element().unwrap()[1], vec![0, 2, 3, 4, 5]);
    }

    #[test]
    fn container_round_trip_preserves_arrays() {
        let element = |id, x: f64| MeshElement {
            id,
            rings: vec![vec![
                geo::Coord { x, y: 0.0 }, geo::Coord { x: x + 1.0, y: 0.0 }, geo::Coord { x: x + 1.0, y: 1.0 },
            ]],
            point: geo::Coord { x: x + 0.6, y: 0.3 },
            area: 0.5,
        };
        let mesh = GlobalMesh { elements: vec![element(4, 0.0), element(9, 5.0)], neighbors: None };
        let flat = encode(&mesh, 1, -9).unwrap();
        let back = from_dataset(&to_dataset(&flat, "uid").unwrap(), "uid").unwrap();
        assert_eq!(back, flat);
    }

    #[test]
    fn validation_catches_duplicates_and_count_mismatch() {
        let element = |id| MeshElement {
            id,
            rings: vec![vec![geo::Coord { x: 0.0, y: 0.0 }, geo::Coord { x: 1.0, y: 0.0 }, geo::Coord { x: 1.0, y: 1.0 }]],
            point: geo::Coord { x: 0.6, y: 0.3 },
            area: 0.5,
        };
        let ok = encode(&GlobalMesh { elements: vec![element(1), element(2)], neighbors: None }, 0, -8).unwrap();
        let ds = to_dataset(&ok, "uid").unwrap();
        assert!(validate_mesh(&ds, "uid", Some(2)).is_ok());
        assert!(validate_mesh(&ds, "uid", Some(3)).is_err());

        let dup = encode(&GlobalMesh { elements: vec![element(1), element(1)], neighbors: None }, 0, -8).unwrap();
        assert!(matches!(
            validate_mesh(&to_dataset(&dup, "uid").unwrap(), "uid", None),
            Err(Error::Identifier(IdentifierError::Duplicate(1)))
        ));
    }

    #[test]
    fn negative_neighbor_counts_are_rejected() {
        let element = |id| MeshElement {
            id,
            rings: vec![vec![geo::Coord { x: 0.0, y: 0.0 }, geo::Coord { x: 1.0, y: 0.0 }, geo::Coord { x: 1.0, y: 1.0 }]],
            point: geo::Coord { x: 0.6, y: 0.3 },
            area: 0.5,
        };
        let mut flat = encode(&GlobalMesh { elements: vec![element(1), element(2)], neighbors: None }, 0, -8).unwrap();
        flat.neighbors = Some(FlatNeighbors { element_neighbors: vec![1, 0], num_element_neighbors: vec![3, -1] });

        let ds = to_dataset(&flat, "uid").unwrap();
        assert!(matches!(validate_mesh(&ds, "uid", Some(2)), Err(Error::InvalidArtifact { .. })));
        assert!(flat.neighbors.unwrap().per_element().is_err());
    }

    #[test]
    fn neighbor_position_out_of_range_is_rejected() {
        let element = |id| MeshElement {
            id,
            rings: vec![vec![geo::Coord { x: 0.0, y: 0.0 }, geo::Coord { x: 1.0, y: 0.0 }, geo::Coord { x: 1.0, y: 1.0 }]],
            point: geo::Coord { x: 0.6, y: 0.3 },
            area: 0.5,
        };
        let mesh = GlobalMesh {
            elements: vec![element(1), element(2)],
            neighbors: Some(vec![smallvec::smallvec![1], smallvec::smallvec![5]]),
        };
        let ds = to_dataset(&encode(&mesh, 0, -8).unwrap(), "uid").unwrap();
        assert!(validate_mesh(&ds, "uid", Some(2)).is_err());
    }

    #[test]
    fn reserved_uid_name_is_rejected() {
        let flat = encode(&GlobalMesh::default(), 0, -8).unwrap();
        assert!(to_dataset(&flat, ELEMENT_CONN).is_err());
    }
}
