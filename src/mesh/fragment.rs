use geo::Coord;
use smallvec::SmallVec;

use crate::comm::Section;

/// Sentinel for "nothing touches this element".
pub const NO_NEIGHBOR: i64 = -1;

/// Node coordinates of one ring, counter-clockwise, closing vertex removed.
pub type Ring = Vec<Coord<f64>>;

/// Neighbor references of one element: record ids inside a fragment, positions
/// once merged. `[NO_NEIGHBOR]` when nothing touches it.
pub type Neighbors = SmallVec<[i64; 8]>;

/// One output element: the rings of every part of a (possibly split) record.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshElement {
    pub id: i64,
    pub rings: Vec<Ring>,
    /// A point guaranteed to lie inside the element.
    pub point: Coord<f64>,
    pub area: f64,
}

impl MeshElement {
    /// Number of nodes over all rings.
    #[inline] pub fn node_count(&self) -> usize { self.rings.iter().map(Vec::len).sum() }
}

/// Elements built by one rank for its section, in record order.
#[derive(Debug, Clone, PartialEq)]
pub struct RaggedMeshFragment {
    pub section: Section,
    pub elements: Vec<MeshElement>,
    /// Neighbor record ids per element, present when adjacency was computed.
    pub neighbors: Option<Vec<Neighbors>>,
}

impl RaggedMeshFragment {
    pub fn new(section: Section, compute_adjacency: bool) -> Self {
        Self {
            section,
            elements: Vec::with_capacity(section.len()),
            neighbors: compute_adjacency.then(|| Vec::with_capacity(section.len())),
        }
    }

    #[inline] pub fn len(&self) -> usize { self.elements.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.elements.is_empty() }
}

/// All fragments concatenated at the coordinator, with neighbor ids replaced by
/// positions in `elements`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalMesh {
    pub elements: Vec<MeshElement>,
    pub neighbors: Option<Vec<Neighbors>>,
}

impl GlobalMesh {
    #[inline] pub fn len(&self) -> usize { self.elements.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.elements.is_empty() }
}
