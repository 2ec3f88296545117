//! Polygon collection to unstructured mesh: per-rank fragment assembly, the merge
//! at the coordinator, flat encoding and the ESMF container layout. Meshes can be
//! exported back to shapefiles.

mod assemble;
mod encode;
pub mod esmf;
mod export;
mod fragment;

pub use assemble::{assemble_local, build_element, build_mesh, gather_and_merge};
pub use encode::{encode, FlatMeshArrays, FlatNeighbors};
pub use esmf::{convert, from_dataset, to_dataset, validate_mesh};
pub use export::to_shapefile;
pub use fragment::{GlobalMesh, MeshElement, Neighbors, RaggedMeshFragment, Ring, NO_NEIGHBOR};
