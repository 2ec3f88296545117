use std::path::PathBuf;

/// Polygon to unstructured-mesh conversion and weight application
#[derive(clap::Parser, Debug)]
#[command(name = "polymesh", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// JSON settings file with defaults and named CRS definitions
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Convert a polygon collection (shapefile or GeoJSON) into an ESMF unstructured mesh
    Convert(ConvertArgs),

    /// Apply sparse weights to a source field over a mesh
    Apply(ApplyArgs),

    /// Merge per-region weight files into one master weight file
    Merge(MergeArgs),

    /// Export the elements of a mesh file as an ESRI shapefile
    Export(ExportArgs),
}

#[derive(clap::Args, Debug)]
pub struct ConvertArgs {
    /// Input polygons (.shp, .geojson or .json)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub source: PathBuf,

    /// Output mesh file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,

    /// Integer unique id field, also the id variable name in the mesh
    #[arg(short, long)]
    pub uid: String,

    /// Split elements with more nodes than this
    #[arg(short, long)]
    pub node_threshold: Option<usize>,

    /// Destination CRS: a key of the settings CRS table, or a PROJ string
    #[arg(short, long)]
    pub dest_crs: Option<String>,

    /// Source CRS as a PROJ string, defaults to WGS84 lon/lat
    #[arg(long)]
    pub source_crs: Option<String>,

    /// Number of ranks
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Keep multipart records as multi-ring elements
    #[arg(long, conflicts_with = "explode_multipart")]
    pub allow_multipart: bool,

    /// Split multipart records into single parts first; new ids are stored under --uid
    #[arg(long)]
    pub explode_multipart: bool,

    /// Compute touching neighbors of every element
    #[arg(long)]
    pub adjacency: bool,

    /// Only convert the first N records
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct ApplyArgs {
    /// Source field file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub source: PathBuf,

    /// Weight file (.csv with row,col,S or a weight container)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub weights: PathBuf,

    /// Destination mesh file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub mesh: PathBuf,

    /// Output file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,

    /// Field variable name
    #[arg(short, long)]
    pub name: String,

    /// Number of ranks
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Allowed deviation of a weight row sum from 1
    #[arg(short, long)]
    pub tolerance: Option<f64>,
}

#[derive(clap::Args, Debug)]
pub struct MergeArgs {
    /// Directory holding the weight files
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub weights_dir: PathBuf,

    /// Directory holding the mesh files
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub mesh_dir: PathBuf,

    /// Output master weight file
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,

    /// Unique id variable of the meshes
    #[arg(short, long, default_value = "GRIDCODE")]
    pub uid: String,

    /// Weight file name prefix
    #[arg(long, default_value = "weights_")]
    pub weights_prefix: String,

    /// Mesh file name prefix
    #[arg(long, default_value = "catchments_esmf_")]
    pub mesh_prefix: String,
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Mesh file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub mesh: PathBuf,

    /// Output shapefile (.shp)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,

    /// Unique id variable of the mesh, also the attribute field name
    #[arg(short, long, default_value = "GRIDCODE")]
    pub uid: String,
}
