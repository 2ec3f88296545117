//! Sparse weight application over a mesh, and merging of regional weight files.

mod apply;
mod field;
mod matrix;
mod merge;

pub use apply::{apply_weights, compute_local, ApplyPaths, ConservationWarning, LocalWeighted};
pub use field::SourceField;
pub use matrix::{read_triples, triples_from_csv, triples_from_dataset, WeightMatrix, WeightTriple};
pub use merge::{merge_weight_sets, merge_weights, pair_files, WeightSet};
