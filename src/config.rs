use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;

use crate::error::{ConfigurationError, Error, Result};

/// Sentinel separating the rings of a multi-ring element in `elementConn`.
pub const DEFAULT_BREAK_VALUE: i64 = -8;

/// ESMF unstructured format version written to the `version` attribute.
pub const FORMAT_VERSION: &str = "0.9";

/// Value of the `coordDim` global attribute.
pub const COORD_DIM_LABEL: &str = "longitude latitude";

/// Value of the `gridType` global attribute.
pub const GRID_TYPE: &str = "unstructured";

/// Link field written by the multipart explode.
pub const DEFAULT_LINK_FIELD: &str = "MID";

/// Maximum deviation of a weight row sum from 1.0 before a conservation warning.
pub const DEFAULT_CONSERVATION_TOLERANCE: f64 = 1e-4;

/// Geographic lon/lat on WGS84, assumed for sources that carry no CRS of their own.
pub const DEFAULT_SOURCE_CRS: &str = "+proj=longlat +datum=WGS84 +no_defs +type=crs";

/// Parameters of a mesh conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshConfig {
    /// Name of the integer unique id field, also the name of the id variable in the output.
    pub uid_field: String,
    /// Elements with more nodes than this are subdivided. `None` disables splitting.
    pub node_threshold: Option<usize>,
    pub allow_multipart: bool,
    pub compute_adjacency: bool,
    /// Offset added to every node index in the connectivity vector.
    pub start_index: i64,
    pub break_value: i64,
}

impl MeshConfig {
    pub fn new(uid_field: impl Into<String>) -> Self {
        Self { uid_field: uid_field.into(), ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.uid_field.trim().is_empty() {
            return Err(ConfigurationError::Missing("unique id field").into());
        }
        if self.node_threshold == Some(0) {
            return Err(ConfigurationError::ZeroNodeThreshold.into());
        }
        // Node indices run from `start_index` upwards.
        if self.break_value >= 0 || self.break_value >= self.start_index {
            return Err(ConfigurationError::BreakValueCollision {
                break_value: self.break_value,
                start_index: self.start_index,
            }
            .into());
        }
        Ok(())
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            uid_field: String::new(),
            node_threshold: None,
            allow_multipart: false,
            compute_adjacency: false,
            start_index: 0,
            break_value: DEFAULT_BREAK_VALUE,
        }
    }
}

/// Parameters of a weight application.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyConfig {
    /// Name of the field variable in the source artifact, reused in the output.
    pub variable: String,
    pub conservation_tolerance: f64,
}

impl ApplyConfig {
    pub fn new(variable: impl Into<String>) -> Self {
        Self { variable: variable.into(), conservation_tolerance: DEFAULT_CONSERVATION_TOLERANCE }
    }

    pub fn validate(&self) -> Result<()> {
        if self.variable.trim().is_empty() {
            return Err(ConfigurationError::Missing("variable name").into());
        }
        if !(self.conservation_tolerance >= 0.0) {
            return Err(ConfigurationError::NegativeTolerance(self.conservation_tolerance).into());
        }
        Ok(())
    }
}

/// Optional JSON configuration file. Every field is a default that command-line
/// flags override.
///
/// ```json
/// {
///   "workers": 8,
///   "node_threshold": 10000,
///   "crs": { "conus_albers": "+proj=aea +lat_1=29.5 +lat_2=45.5 +lat_0=23 +lon_0=-96 +datum=NAD83 +units=m" }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub workers: Option<usize>,
    pub node_threshold: Option<usize>,
    pub start_index: Option<i64>,
    pub break_value: Option<i64>,
    pub conservation_tolerance: Option<f64>,
    pub source_crs: Option<String>,
    /// Named CRS definitions (PROJ strings), looked up by `--dest-crs KEY`.
    pub crs: BTreeMap<String, String>,
}

impl Settings {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Resolve a CRS key against the named table.
    pub fn crs(&self, key: &str) -> Result<&str> {
        self.crs.get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigurationError::UnknownCrs(key.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mesh_config_uses_esmf_break_value() {
        let config = MeshConfig::new("GRIDCODE");
        assert_eq!(config.break_value, -8);
        assert_eq!(config.start_index, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_threshold_is_a_configuration_error() {
        let config = MeshConfig { node_threshold: Some(0), ..MeshConfig::new("UID") };
        assert!(matches!(
            config.validate(),
            Err(Error::Configuration(ConfigurationError::ZeroNodeThreshold))
        ));
    }

    #[test]
    fn empty_uid_field_is_rejected() {
        assert!(MeshConfig::default().validate().is_err());
    }

    #[test]
    fn positive_break_value_is_rejected() {
        let config = MeshConfig { break_value: 3, ..MeshConfig::new("UID") };
        assert!(matches!(
            config.validate(),
            Err(Error::Configuration(ConfigurationError::BreakValueCollision { break_value: 3, .. }))
        ));
    }

    #[test]
    fn break_value_inside_shifted_index_range_is_rejected() {
        let config = MeshConfig { start_index: -10, break_value: -8, ..MeshConfig::new("UID") };
        assert!(matches!(
            config.validate(),
            Err(Error::Configuration(ConfigurationError::BreakValueCollision { break_value: -8, start_index: -10 }))
        ));
        let below = MeshConfig { start_index: -10, break_value: -11, ..MeshConfig::new("UID") };
        assert!(below.validate().is_ok());
        let one_based = MeshConfig { start_index: 1, ..MeshConfig::new("UID") };
        assert!(one_based.validate().is_ok());
    }

    #[test]
    fn apply_config_rejects_nan_tolerance() {
        let config = ApplyConfig { conservation_tolerance: f64::NAN, ..ApplyConfig::new("pr") };
        assert!(config.validate().is_err());
    }

    #[test]
    fn settings_parse_and_resolve_crs() {
        let settings: Settings = serde_json::from_str(r#"{
            "workers": 4,
            "crs": { "albers": "+proj=aea +lat_1=29.5 +lat_2=45.5" }
        }"#).unwrap();
        assert_eq!(settings.workers, Some(4));
        assert_eq!(settings.crs("albers").unwrap(), "+proj=aea +lat_1=29.5 +lat_2=45.5");
        assert!(settings.crs("missing").is_err());
    }

    #[test]
    fn settings_reject_unknown_fields() {
        assert!(serde_json::from_str::<Settings>(r#"{ "wokers": 4 }"#).is_err());
    }
}
