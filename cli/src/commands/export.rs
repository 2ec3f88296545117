use anyhow::{Context as _, Result};
use polymesh::{
    io::Dataset,
    mesh::{from_dataset, to_shapefile, validate_mesh},
};
use tracing::info;

use crate::cli::{Cli, ExportArgs};

pub fn run(_cli: &Cli, args: &ExportArgs) -> Result<()> {
    let ds = Dataset::read(&args.mesh)
        .with_context(|| format!("[export] Failed to read mesh {}", args.mesh.display()))?;
    validate_mesh(&ds, &args.uid, None)
        .with_context(|| format!("[export] {} is not a valid mesh", args.mesh.display()))?;
    let flat = from_dataset(&ds, &args.uid)?;

    to_shapefile(&flat, &args.uid, &args.output)
        .with_context(|| format!("[export] Failed to write {}", args.output.display()))?;
    info!(output = %args.output.display(), elements = flat.element_count(), "done");

    Ok(())
}
