use std::path::Path;

use anyhow::{bail, Context as _, Result};
use polymesh::{
    comm::run_threads,
    config::{MeshConfig, Settings, DEFAULT_SOURCE_CRS},
    mesh::esmf,
    source::{explode_multipart, GeoJsonSource, GeometrySource, Limited, Reprojected, ShapefileSource},
    Context,
};
use tracing::info;

use crate::cli::{Cli, ConvertArgs};

type BoxedSource = Box<dyn GeometrySource>;

/// Open a shapefile or GeoJSON collection by extension.
fn open_source(path: &Path, uid_field: Option<&str>) -> Result<BoxedSource> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("shp") => Box::new(ShapefileSource::open(path, uid_field)
            .with_context(|| format!("[convert] Failed to open shapefile {}", path.display()))?),
        Some("geojson") | Some("json") => Box::new(GeoJsonSource::open(path, uid_field)
            .with_context(|| format!("[convert] Failed to open GeoJSON {}", path.display()))?),
        _ => bail!("[convert] Unsupported geometry source {}, expected .shp, .geojson or .json", path.display()),
    })
}

/// Resolve `--dest-crs` through the settings table when a settings file was given.
fn dest_crs(cli: &Cli, settings: &Settings, value: &str) -> Result<String> {
    if cli.config.is_some() {
        Ok(settings.crs(value).context("[convert] Failed to resolve destination CRS")?.to_string())
    } else {
        Ok(value.to_string())
    }
}

pub fn run(cli: &Cli, args: &ConvertArgs) -> Result<()> {
    let settings = super::load_settings(cli.config.as_deref())?;
    let workers = super::workers(args.workers, &settings);

    let uid_field = (!args.explode_multipart).then_some(args.uid.as_str());
    let mut source = open_source(&args.source, uid_field)?;

    if let Some(limit) = args.limit {
        source = Box::new(Limited::new(source, limit));
    }
    if let Some(dest) = &args.dest_crs {
        let from = args.source_crs.as_deref()
            .or(settings.source_crs.as_deref())
            .unwrap_or(DEFAULT_SOURCE_CRS);
        let to = dest_crs(cli, &settings, dest)?;
        source = Box::new(Reprojected::new(source, from, &to)
            .context("[convert] Failed to set up reprojection")?);
    }
    if args.explode_multipart {
        let records = source.all().context("[convert] Failed to read records for multipart explode")?;
        source = Box::new(explode_multipart(records, &args.uid, 0));
    }

    let mut config = MeshConfig::new(args.uid.clone());
    config.node_threshold = args.node_threshold.or(settings.node_threshold);
    config.allow_multipart = args.allow_multipart;
    config.compute_adjacency = args.adjacency;
    config.start_index = settings.start_index.unwrap_or(config.start_index);
    config.break_value = settings.break_value.unwrap_or(config.break_value);

    info!(source = %args.source.display(), records = source.len(), workers, "converting");
    run_threads(workers, |comm| esmf::convert(&Context::new(&comm, &config), &source, &args.output))
        .with_context(|| format!("[convert] Failed to convert {}", args.source.display()))?;
    info!(output = %args.output.display(), "done");

    Ok(())
}
