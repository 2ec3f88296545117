use anyhow::{Context as _, Result};
use polymesh::{comm::run_threads, config::ApplyConfig, weights::apply_weights, ApplyPaths, Context};
use tracing::{info, warn};

use crate::cli::{ApplyArgs, Cli};

pub fn run(cli: &Cli, args: &ApplyArgs) -> Result<()> {
    let settings = super::load_settings(cli.config.as_deref())?;
    let workers = super::workers(args.workers, &settings);

    let mut config = ApplyConfig::new(args.name.clone());
    if let Some(tolerance) = args.tolerance.or(settings.conservation_tolerance) {
        config.conservation_tolerance = tolerance;
    }

    let paths = ApplyPaths {
        source: args.source.clone(),
        weights: args.weights.clone(),
        mesh: args.mesh.clone(),
        output: args.output.clone(),
    };

    let locals = run_threads(workers, |comm| apply_weights(&Context::new(&comm, &config), &paths))
        .with_context(|| format!("[apply] Failed to apply {} to {}", args.weights.display(), args.source.display()))?;

    let warnings = locals.iter().map(|local| local.warnings.len()).sum::<usize>();
    if warnings > 0 {
        warn!(warnings, tolerance = config.conservation_tolerance, "some destinations are not conservative");
    }
    info!(output = %args.output.display(), "done");

    Ok(())
}
