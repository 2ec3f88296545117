//! Error taxonomy shared by the mesh assembler and the weight engine.
//!
//! Every variant here aborts a run. Non-fatal findings (conservation drift) are
//! reported as [`crate::weights::ConservationWarning`] values instead.

use std::path::PathBuf;

use thiserror::Error;

/// Unrepairable or disallowed geometry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("record {id}: geometry is invalid and a zero-width repair did not fix it")]
    Unrepairable { id: i64 },
    #[error("record {id}: multipart geometry found but multipart is not allowed (explode multipart records first)")]
    MultipartNotAllowed { id: i64 },
    #[error("record {id}: unsupported geometry type {kind}, expected Polygon or MultiPolygon")]
    UnsupportedType { id: i64, kind: &'static str },
    #[error("record {id}: geometry is empty")]
    Empty { id: i64 },
}

/// Invalid run parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("record count ({records}) must be greater than or equal to the worker count ({workers})")]
    TooFewRecords { records: usize, workers: usize },
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("node threshold must be at least 1")]
    ZeroNodeThreshold,
    #[error("missing required parameter: {0}")]
    Missing(&'static str),
    #[error("break value {break_value} collides with node indices; it must be negative and below the start index {start_index}")]
    BreakValueCollision { break_value: i64, start_index: i64 },
    #[error("conservation tolerance must be non-negative, got {0}")]
    NegativeTolerance(f64),
    #[error("unknown CRS key {0:?} in configuration")]
    UnknownCrs(String),
}

/// Missing, malformed or duplicated unique identifiers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentifierError {
    #[error("record {index}: unique id field {field:?} is missing")]
    Missing { index: usize, field: String },
    #[error("record {index}: unique id field {field:?} is not an integer")]
    NotInteger { index: usize, field: String },
    #[error("duplicate unique id {0}")]
    Duplicate(i64),
    #[error("neighbor id {0} does not belong to any gathered element")]
    UnknownNeighbor(i64),
}

/// Failures of the scatter / gather / barrier primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollectiveError {
    #[error("rank {peer} disconnected during a collective call")]
    PeerDisconnected { peer: usize },
    #[error("scatter on the coordinator needs exactly {expected} values, got {found}")]
    ScatterLength { expected: usize, found: usize },
    #[error("message from rank {peer} has an unexpected type")]
    TypeMismatch { peer: usize },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    #[error(transparent)]
    Collective(#[from] CollectiveError),
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {what}: {message}")]
    InvalidArtifact { what: &'static str, message: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),
    #[error("table error: {0}")]
    Table(#[from] polars::error::PolarsError),
    #[error("projection error: {0}")]
    Projection(String),
    #[error("rank {rank} panicked")]
    RankPanicked { rank: usize },
}

impl Error {
    /// Attach a path to an I/O error.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn artifact(what: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArtifact { what, message: message.into() }
    }

    /// True when this error only reports that a peer went away.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::Collective(CollectiveError::PeerDisconnected { .. }))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
