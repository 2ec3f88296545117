//! Distributed mesh assembly: partition the records, build one ragged fragment per
//! rank, gather and merge at the coordinator.

use ahash::AHashMap;
use geo::{Area, InteriorPoint, LineString, MultiPolygon, Relate};
use tracing::{debug, info, instrument};

use crate::{
    comm::{compute_sections, Communicator, Section},
    config::MeshConfig,
    context::Context,
    error::{Error, GeometryError, IdentifierError, Result},
    geom::{normalize_multi_orientation, split_if_needed, to_multi_polygon, validate, SpatialIndex},
    source::{GeometryRecord, GeometrySource},
};

use super::fragment::{GlobalMesh, MeshElement, Neighbors, RaggedMeshFragment, Ring, NO_NEIGHBOR};

/// Validate (and repair) a record, returning its id and areal geometry.
fn validate_record(record: GeometryRecord, config: &MeshConfig) -> Result<(i64, MultiPolygon<f64>), GeometryError> {
    let record = validate(record, config.allow_multipart)?;
    let geometry = to_multi_polygon(record.id, &record.geometry)?;
    Ok((record.id, geometry))
}

/// Drop the closing vertex of a ring.
fn open_ring(ring: &LineString<f64>) -> Ring {
    let mut coords = ring.0.clone();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    coords
}

/// Split and orient a validated geometry, then extract the element's rings,
/// representative point and area. Holes are not representable and are dropped
/// from the rings; the area still accounts for them.
pub fn build_element(id: i64, geometry: MultiPolygon<f64>, config: &MeshConfig) -> Result<MeshElement, GeometryError> {
    let point = geometry.interior_point().ok_or(GeometryError::Empty { id })?;
    let area = geometry.unsigned_area();

    let geometry = match config.node_threshold {
        Some(threshold) => split_if_needed(geometry, threshold),
        None => geometry,
    };
    let rings = normalize_multi_orientation(geometry).0.iter()
        .map(|polygon| open_ring(polygon.exterior()))
        .filter(|ring| !ring.is_empty())
        .collect::<Vec<_>>();
    if rings.is_empty() {
        return Err(GeometryError::Empty { id });
    }

    Ok(MeshElement { id, rings, point: point.0, area })
}

/// Build the fragment for one section.
///
/// With adjacency enabled every record is validated and indexed, not only the
/// section's, so neighbors owned by other ranks are still found.
#[instrument(skip_all, fields(start = section.start, stop = section.stop))]
pub fn assemble_local<C, S>(ctx: &Context<C, MeshConfig>, section: Section, source: &S) -> Result<RaggedMeshFragment>
where
    C: Communicator,
    S: GeometrySource + ?Sized,
{
    let config = ctx.config();
    let mut fragment = RaggedMeshFragment::new(section, config.compute_adjacency);

    if !config.compute_adjacency {
        for record in source.records(section.range())? {
            let (id, geometry) = validate_record(record, config)?;
            fragment.elements.push(build_element(id, geometry, config)?);
        }
        debug!(elements = fragment.len(), "assembled local fragment");
        return Ok(fragment);
    }

    let validated = source.all()?.into_iter()
        .map(|record| validate_record(record, config))
        .collect::<Result<Vec<_>, _>>()?;

    let mut positions = AHashMap::with_capacity(validated.len());
    for (i, (id, _)) in validated.iter().enumerate() {
        if positions.insert(*id, i).is_some() {
            return Err(IdentifierError::Duplicate(*id).into());
        }
    }
    let index = SpatialIndex::from_geometries(validated.iter().map(|(id, geometry)| (*id, geometry)));
    debug!(indexed = index.len(), "built spatial index over all records");

    let local = validated.get(section.range()).ok_or_else(|| Error::artifact(
        "geometry source",
        format!("section {}..{} is outside 0..{}", section.start, section.stop, validated.len()),
    ))?;

    for (id, geometry) in local {
        let mut neighbors = index.query(geometry).into_iter()
            .filter(|candidate| candidate != id)
            .filter(|candidate| positions.get(candidate)
                .is_some_and(|&j| geometry.relate(&validated[j].1).is_touches()))
            .collect::<Neighbors>();
        if neighbors.is_empty() {
            neighbors.push(NO_NEIGHBOR);
        }

        fragment.elements.push(build_element(*id, geometry.clone(), config)?);
        if let Some(all) = fragment.neighbors.as_mut() {
            all.push(neighbors);
        }
    }

    debug!(elements = fragment.len(), "assembled local fragment with adjacency");
    Ok(fragment)
}

/// Replace neighbor ids by positions; the sentinel passes through unchanged.
fn remap_neighbors(neighbors: Neighbors, positions: &AHashMap<i64, i64>) -> Result<Neighbors, IdentifierError> {
    neighbors.into_iter()
        .map(|id| match id {
            NO_NEIGHBOR => Ok(NO_NEIGHBOR),
            id => positions.get(&id).copied().ok_or(IdentifierError::UnknownNeighbor(id)),
        })
        .collect()
}

/// Concatenate fragments in record order and remap neighbor ids to positions
/// through an id → position map built once.
pub fn gather_and_merge(mut fragments: Vec<RaggedMeshFragment>) -> Result<GlobalMesh> {
    fragments.sort_by_key(|fragment| fragment.section.start);

    let with_adjacency = fragments.iter().any(|fragment| fragment.neighbors.is_some());
    if with_adjacency && fragments.iter().any(|fragment| fragment.neighbors.is_none()) {
        return Err(Error::artifact("mesh fragments", "adjacency was computed on some ranks only"));
    }

    let total: usize = fragments.iter().map(RaggedMeshFragment::len).sum();
    let mut elements = Vec::with_capacity(total);
    let mut neighbor_ids = Vec::with_capacity(if with_adjacency { total } else { 0 });
    for fragment in fragments {
        elements.extend(fragment.elements);
        neighbor_ids.extend(fragment.neighbors.into_iter().flatten());
    }

    let mut positions = AHashMap::with_capacity(elements.len());
    for (position, element) in elements.iter().enumerate() {
        if positions.insert(element.id, position as i64).is_some() {
            return Err(IdentifierError::Duplicate(element.id).into());
        }
    }

    let neighbors = if with_adjacency {
        Some(neighbor_ids.into_iter()
            .map(|ids| remap_neighbors(ids, &positions))
            .collect::<Result<Vec<_>, _>>()?)
    } else {
        None
    };

    Ok(GlobalMesh { elements, neighbors })
}

/// Run the whole assembly on every rank. Returns the merged mesh on the
/// coordinator and `None` elsewhere.
pub fn build_mesh<C, S>(ctx: &Context<C, MeshConfig>, source: &S) -> Result<Option<GlobalMesh>>
where
    C: Communicator,
    S: GeometrySource + ?Sized,
{
    let _enter = ctx.span().enter();
    ctx.config().validate()?;

    let sections = if ctx.is_coordinator() {
        let sections = compute_sections(source.len(), ctx.size())?;
        info!(records = source.len(), workers = ctx.size(), "partitioned records");
        Some(sections)
    } else {
        None
    };
    let section = ctx.comm().scatter(sections)?;

    let fragment = assemble_local(ctx, section, source)?;
    let Some(fragments) = ctx.comm().gather(fragment)? else { return Ok(None) };

    let mesh = gather_and_merge(fragments)?;
    info!(elements = mesh.len(), adjacency = mesh.neighbors.is_some(), "merged global mesh");
    Ok(Some(mesh))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geo::{polygon, Geometry};
    use smallvec::smallvec;

    use super::*;
    use crate::{
        comm::{run_threads, SerialComm},
        source::{tests::unit_grid, MemorySource, Properties},
    };

    fn square_record(id: i64, x: f64, y: f64, size: f64) -> GeometryRecord {
        GeometryRecord {
            id,
            geometry: polygon![
                (x: x, y: y), (x: x + size, y: y), (x: x + size, y: y + size), (x: x, y: y + size),
            ].into(),
            properties: Properties::new(),
        }
    }

    fn adjacency_config() -> MeshConfig {
        MeshConfig { compute_adjacency: true, ..MeshConfig::new("id") }
    }

    #[test]
    fn single_square_becomes_one_open_ring() {
        let source = MemorySource::new(vec![square_record(1, 0.0, 0.0, 10.0)]);
        let config = MeshConfig::new("id");
        let ctx = Context::new(&SerialComm, &config);

        let mesh = build_mesh(&ctx, &source).unwrap().unwrap();
        assert_eq!(mesh.len(), 1);
        let element = &mesh.elements[0];
        assert_eq!(element.id, 1);
        assert_eq!(element.rings.len(), 1);
        assert_eq!(element.node_count(), 4);
        assert_relative_eq!(element.area, 100.0);
        assert!(mesh.neighbors.is_none());
    }

    #[test]
    fn clockwise_input_is_reoriented() {
        let record = GeometryRecord {
            id: 3,
            geometry: polygon![(x: 0.0, y: 0.0), (x: 0.0, y: 1.0), (x: 1.0, y: 1.0), (x: 1.0, y: 0.0)].into(),
            properties: Properties::new(),
        };
        let (id, geometry) = validate_record(record, &MeshConfig::new("id")).unwrap();
        let element = build_element(id, geometry, &MeshConfig::new("id")).unwrap();

        let mut ring = element.rings[0].clone();
        ring.push(ring[0]);
        assert!(crate::geom::signed_area(&ring) > 0.0);
    }

    #[test]
    fn split_element_has_one_ring_per_piece() {
        let config = MeshConfig { node_threshold: Some(4), ..MeshConfig::new("id") };
        let (id, geometry) = validate_record(square_record(9, 0.0, 0.0, 10.0), &config).unwrap();
        let element = build_element(id, geometry, &config).unwrap();
        assert_eq!(element.rings.len(), 4);
        assert_relative_eq!(element.area, 100.0);
    }

    #[test]
    fn adjacency_crosses_partition_boundaries() {
        // 2x2 grid, ids 1 2 / 3 4; two ranks own [1, 2] and [3, 4].
        let source = unit_grid(2, 2);
        let config = adjacency_config();

        let meshes = run_threads(2, |comm| {
            let ctx = Context::new(&comm, &config);
            build_mesh(&ctx, &source)
        }).unwrap();

        let mesh = meshes[0].as_ref().unwrap();
        assert!(meshes[1].is_none());
        assert_eq!(mesh.elements.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        let neighbors = mesh.neighbors.as_ref().unwrap();
        // Corner contact counts as touching.
        assert_eq!(neighbors[0].as_slice(), &[1, 2, 3]);
        assert_eq!(neighbors[1].as_slice(), &[0, 2, 3]);
        assert_eq!(neighbors[2].as_slice(), &[0, 1, 3]);
        assert_eq!(neighbors[3].as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn isolated_element_gets_sentinel() {
        let source = MemorySource::new(vec![
            square_record(10, 0.0, 0.0, 1.0),
            square_record(20, 1.0, 0.0, 1.0),
            square_record(30, 5.0, 5.0, 1.0),
        ]);
        let config = adjacency_config();
        let ctx = Context::new(&SerialComm, &config);

        let mesh = build_mesh(&ctx, &source).unwrap().unwrap();
        let neighbors = mesh.neighbors.unwrap();
        assert_eq!(neighbors[0].as_slice(), &[1]);
        assert_eq!(neighbors[1].as_slice(), &[0]);
        assert_eq!(neighbors[2].as_slice(), &[NO_NEIGHBOR]);
    }

    #[test]
    fn trailing_empty_section_still_merges() {
        let source = unit_grid(5, 1);
        let config = MeshConfig::new("id");
        let meshes = run_threads(4, |comm| {
            let ctx = Context::new(&comm, &config);
            build_mesh(&ctx, &source)
        }).unwrap();
        let ids = meshes[0].as_ref().unwrap().elements.iter().map(|e| e.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn too_few_records_is_a_configuration_error() {
        let source = unit_grid(2, 1);
        let config = MeshConfig::new("id");
        let result = run_threads(3, |comm| {
            let ctx = Context::new(&comm, &config);
            build_mesh(&ctx, &source)
        });
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn invalid_record_on_any_rank_aborts_the_run() {
        let mut records = unit_grid(4, 1).records_ref().to_vec();
        records[3].geometry = Geometry::Point(geo::Point::new(0.0, 0.0));
        let source = MemorySource::new(records);
        let config = MeshConfig::new("id");

        let result = run_threads(2, |comm| {
            let ctx = Context::new(&comm, &config);
            build_mesh(&ctx, &source)
        });
        assert!(matches!(result, Err(Error::Geometry(GeometryError::UnsupportedType { id: 4, .. }))));
    }

    #[test]
    fn duplicate_ids_are_rejected_on_merge() {
        let element = MeshElement { id: 7, rings: vec![], point: geo::Coord { x: 0.0, y: 0.0 }, area: 0.0 };
        let fragments = vec![
            RaggedMeshFragment { section: Section::new(0, 1), elements: vec![element.clone()], neighbors: None },
            RaggedMeshFragment { section: Section::new(1, 2), elements: vec![element], neighbors: None },
        ];
        assert!(matches!(
            gather_and_merge(fragments),
            Err(Error::Identifier(IdentifierError::Duplicate(7)))
        ));
    }

    #[test]
    fn merge_orders_fragments_and_remaps_ids() {
        let element = |id| MeshElement { id, rings: vec![], point: geo::Coord { x: 0.0, y: 0.0 }, area: 1.0 };
        let fragments = vec![
            RaggedMeshFragment {
                section: Section::new(2, 3),
                elements: vec![element(300)],
                neighbors: Some(vec![smallvec![100]]),
            },
            RaggedMeshFragment {
                section: Section::new(0, 2),
                elements: vec![element(100), element(200)],
                neighbors: Some(vec![smallvec![300], smallvec![NO_NEIGHBOR]]),
            },
        ];
        let mesh = gather_and_merge(fragments).unwrap();
        assert_eq!(mesh.elements.iter().map(|e| e.id).collect::<Vec<_>>(), vec![100, 200, 300]);
        let neighbors = mesh.neighbors.unwrap();
        assert_eq!(neighbors[0].as_slice(), &[2]);
        assert_eq!(neighbors[1].as_slice(), &[NO_NEIGHBOR]);
        assert_eq!(neighbors[2].as_slice(), &[0]);
    }

    #[test]
    fn unknown_neighbor_is_rejected() {
        let fragments = vec![RaggedMeshFragment {
            section: Section::new(0, 1),
            elements: vec![MeshElement { id: 1, rings: vec![], point: geo::Coord { x: 0.0, y: 0.0 }, area: 1.0 }],
            neighbors: Some(vec![smallvec![99]]),
        }];
        assert!(matches!(
            gather_and_merge(fragments),
            Err(Error::Identifier(IdentifierError::UnknownNeighbor(99)))
        ));
    }
}
