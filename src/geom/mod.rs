//! Per-record geometry processing: validation and repair, ring orientation,
//! oversized-element splitting, the bounding-box index used for adjacency, and
//! reprojection.

mod index;
mod proj;
mod split;
mod validate;

pub use index::SpatialIndex;
pub use proj::Reprojector;
pub use split::{node_count, split_if_needed};
pub use validate::{normalize_multi_orientation, normalize_orientation, to_multi_polygon, validate};
#[cfg(test)]
pub(crate) use validate::signed_area;
