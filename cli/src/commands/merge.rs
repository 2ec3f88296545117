use anyhow::{ensure, Context as _, Result};
use polymesh::weights::{merge_weights, pair_files};
use tracing::info;

use crate::cli::{Cli, MergeArgs};

pub fn run(_cli: &Cli, args: &MergeArgs) -> Result<()> {
    let sets = pair_files(&args.weights_dir, &args.weights_prefix, &args.mesh_dir, &args.mesh_prefix)
        .context("[merge] Failed to pair weight and mesh files")?;
    ensure!(!sets.is_empty(), "[merge] No files starting with {:?} in {}", args.weights_prefix, args.weights_dir.display());

    info!(sets = sets.len(), "merging weight files");
    merge_weights(&sets, &args.uid, &args.output)
        .with_context(|| format!("[merge] Failed to write {}", args.output.display()))?;
    info!(output = %args.output.display(), "done");

    Ok(())
}
