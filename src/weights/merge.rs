//! Merge per-region weight files into one master weight file.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use tracing::{info, instrument};
use walkdir::WalkDir;

use crate::{
    config::COORD_DIM_LABEL,
    error::{Error, Result},
    io::{Dataset, Values},
    mesh::esmf::{CENTER_COORDS, COORD_DIM, ELEMENT_COUNT},
};

use super::matrix::{read_triples, WeightTriple};

/// One regional weight file and the mesh its destination rows index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightSet {
    pub weights: PathBuf,
    pub mesh: PathBuf,
}

/// Files directly inside `dir` whose names start with `prefix`, sorted by name.
fn list_prefixed(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::io(path, e.into())
        })?;
        if entry.file_type().is_file() && entry.file_name().to_string_lossy().starts_with(prefix) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

/// Pair the weight files of `weights_dir` with the meshes of `mesh_dir` by sorted
/// name order.
pub fn pair_files(weights_dir: &Path, weights_prefix: &str, mesh_dir: &Path, mesh_prefix: &str) -> Result<Vec<WeightSet>> {
    let weights = list_prefixed(weights_dir, weights_prefix)?;
    let meshes = list_prefixed(mesh_dir, mesh_prefix)?;
    if weights.len() != meshes.len() {
        return Err(Error::artifact(
            "weights",
            format!("{} weight files but {} mesh files", weights.len(), meshes.len()),
        ));
    }
    Ok(weights.into_iter().zip(meshes).map(|(weights, mesh)| WeightSet { weights, mesh }).collect())
}

/// Combine weight sets into one container.
///
/// Destination rows are renumbered globally from 1 in first-seen order per set,
/// so row `r` of set `k` keeps its own master row. Source columns and factors are
/// copied; the unique ids and center coordinates of every mesh are appended.
pub fn merge_weight_sets(sets: &[(Vec<WeightTriple>, Dataset)], uid_name: &str) -> Result<Dataset> {
    let mut master: AHashMap<(usize, i64), i64> = AHashMap::new();
    let (mut rows, mut cols, mut factors) = (Vec::new(), Vec::new(), Vec::new());
    let (mut uids, mut centers) = (Vec::new(), Vec::new());

    for (set, (triples, mesh)) in sets.iter().enumerate() {
        for triple in triples {
            if triple.row < 1 {
                return Err(Error::artifact(
                    "weights",
                    format!("set {set}: row {} is not a 1-based index", triple.row),
                ));
            }
            let next = master.len() as i64 + 1;
            rows.push(*master.entry((set, triple.row)).or_insert(next));
            cols.push(triple.col);
            factors.push(triple.value);
        }
        uids.extend_from_slice(mesh.ints(uid_name)?);
        centers.extend(mesh.floats(CENTER_COORDS)?);
    }

    let mut out = Dataset::new();
    out.set_attr("coordDim", COORD_DIM_LABEL)
        .set_attr("description", "Merged ESMF weights file with auxiliary variables.");
    out.add_dim("n_s", rows.len())?;
    out.add_dim(ELEMENT_COUNT, uids.len())?;
    out.add_dim(COORD_DIM, 2)?;
    out.add_variable("row", &["n_s"], Values::Int(rows))?
        .set_attr("long_name", "ESMF index to destination array.");
    out.add_variable("col", &["n_s"], Values::Int(cols))?
        .set_attr("long_name", "ESMF index to source array.");
    out.add_variable("S", &["n_s"], Values::Float(factors))?
        .set_attr("long_name", "ESMF weight factor.");
    out.add_variable(uid_name, &[ELEMENT_COUNT], Values::Int(uids))?
        .set_attr("long_name", "Element unique identifier.");
    out.add_variable(CENTER_COORDS, &[ELEMENT_COUNT, COORD_DIM], Values::Float(centers))?
        .set_attr("units", "degrees");
    Ok(out)
}

/// Read every set, merge and write the master file.
#[instrument(skip_all, fields(output = %output.display(), sets = sets.len()))]
pub fn merge_weights(sets: &[WeightSet], uid_name: &str, output: &Path) -> Result<Dataset> {
    let loaded = sets.iter()
        .map(|set| {
            info!(weights = %set.weights.display(), mesh = %set.mesh.display(), "merging weight set");
            Ok((read_triples(&set.weights)?, Dataset::read(&set.mesh)?))
        })
        .collect::<Result<Vec<_>>>()?;

    let merged = merge_weight_sets(&loaded, uid_name)?;
    merged.write(output)?;
    info!(nnz = merged.require_dim("n_s")?, elements = merged.require_dim(ELEMENT_COUNT)?, "wrote master weights");
    Ok(merged)
}
