use std::{
    collections::BTreeMap,
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::write::open_for_write;

/// Attribute value attached to a dataset or a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self { Self::Int(value) }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self { Self::Float(value) }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self { Self::Text(value.to_string()) }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self { Self::Text(value) }
}

/// Flat row-major values of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Values {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl Values {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Int(values) => values.len(),
            Self::Float(values) => values.len(),
        }
    }

    #[inline] pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Copy the values as floats, widening integers.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            Self::Int(values) => values.iter().map(|&v| v as f64).collect(),
            Self::Float(values) => values.clone(),
        }
    }
}

/// A named, dimensioned array with attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub dims: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, AttrValue>,
    pub values: Values,
}

impl Variable {
    #[inline] pub fn attr(&self, name: &str) -> Option<&AttrValue> { self.attrs.get(name) }

    pub fn set_attr(&mut self, name: &str, value: impl Into<AttrValue>) -> &mut Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }
}

/// Fixed-array container: named dimensions, typed variables over them, and global
/// attributes. Every variable holds exactly the product of its dimension lengths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
    pub dims: BTreeMap<String, usize>,
    pub variables: BTreeMap<String, Variable>,
}

impl Dataset {
    pub fn new() -> Self { Self::default() }

    /// Declare a dimension. Redeclaring with the same length is a no-op.
    pub fn add_dim(&mut self, name: &str, len: usize) -> Result<()> {
        match self.dims.get(name) {
            Some(&existing) if existing != len => Err(Error::artifact(
                "dataset",
                format!("dimension {name:?} already has length {existing}, cannot redefine as {len}"),
            )),
            _ => {
                self.dims.insert(name.to_string(), len);
                Ok(())
            }
        }
    }

    #[inline] pub fn dim(&self, name: &str) -> Option<usize> { self.dims.get(name).copied() }

    /// Get the length of a dimension, failing if it is not declared.
    pub fn require_dim(&self, name: &str) -> Result<usize> {
        self.dim(name).ok_or_else(|| Error::artifact("dataset", format!("missing dimension {name:?}")))
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<AttrValue>) -> &mut Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    #[inline] pub fn attr(&self, name: &str) -> Option<&AttrValue> { self.attrs.get(name) }

    /// Shape of a variable over its declared dimensions.
    fn shape_of(&self, name: &str, dims: &[String]) -> Result<Vec<usize>> {
        dims.iter()
            .map(|dim| self.dim(dim).ok_or_else(|| Error::artifact(
                "dataset",
                format!("variable {name:?} uses undeclared dimension {dim:?}"),
            )))
            .collect()
    }

    /// Add (or replace) a variable after checking its size against its dimensions.
    pub fn add_variable(&mut self, name: &str, dims: &[&str], values: Values) -> Result<&mut Variable> {
        let dims = dims.iter().map(|d| d.to_string()).collect::<Vec<_>>();
        let expected = self.shape_of(name, &dims)?.iter().product::<usize>();
        if values.len() != expected {
            return Err(Error::artifact(
                "dataset",
                format!("variable {name:?} has {} values, its dimensions {dims:?} need {expected}", values.len()),
            ));
        }

        self.variables.insert(name.to_string(), Variable { dims, attrs: BTreeMap::new(), values });
        self.var_mut(name)
    }

    #[inline] pub fn has_var(&self, name: &str) -> bool { self.variables.contains_key(name) }

    pub fn var(&self, name: &str) -> Result<&Variable> {
        self.variables.get(name)
            .ok_or_else(|| Error::artifact("dataset", format!("missing variable {name:?}")))
    }

    pub fn var_mut(&mut self, name: &str) -> Result<&mut Variable> {
        self.variables.get_mut(name)
            .ok_or_else(|| Error::artifact("dataset", format!("missing variable {name:?}")))
    }

    /// Shape of a variable, one length per dimension.
    pub fn shape(&self, name: &str) -> Result<Vec<usize>> {
        self.shape_of(name, &self.var(name)?.dims)
    }

    pub fn ints(&self, name: &str) -> Result<&[i64]> {
        match &self.var(name)?.values {
            Values::Int(values) => Ok(values),
            Values::Float(_) => Err(Error::artifact("dataset", format!("variable {name:?} is not an integer variable"))),
        }
    }

    /// Values of a numeric variable as floats (integers are widened).
    pub fn floats(&self, name: &str) -> Result<Vec<f64>> {
        Ok(self.var(name)?.values.to_f64())
    }

    pub fn floats_mut(&mut self, name: &str) -> Result<&mut [f64]> {
        match &mut self.var_mut(name)?.values {
            Values::Float(values) => Ok(values),
            Values::Int(_) => Err(Error::artifact("dataset", format!("variable {name:?} is not a float variable"))),
        }
    }

    /// Check that every variable's dimensions exist and its size matches their product.
    pub fn check(&self) -> Result<()> {
        for (name, variable) in &self.variables {
            let expected = self.shape_of(name, &variable.dims)?.iter().product::<usize>();
            if variable.values.len() != expected {
                return Err(Error::artifact(
                    "dataset",
                    format!("variable {name:?} has {} values, expected {expected}", variable.values.len()),
                ));
            }
        }
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        let dataset: Self = serde_json::from_slice(&bytes)?;
        dataset.check()?;
        debug!(path = %path.display(), variables = dataset.variables.len(), "read dataset");
        Ok(dataset)
    }

    /// Write atomically: the file at `path` is replaced only once fully written.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut pending = open_for_write(path)?;
        {
            let mut writer = BufWriter::new(&mut pending);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush().map_err(|e| Error::io(path, e))?;
        }
        pending.finalize()?;
        debug!(path = %path.display(), variables = self.variables.len(), "wrote dataset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_dim("x", 3).unwrap();
        ds.add_dim("y", 2).unwrap();
        ds.add_variable("ids", &["x"], Values::Int(vec![1, 2, 3])).unwrap()
            .set_attr("long_name", "identifiers");
        ds.add_variable("grid", &["x", "y"], Values::Float(vec![0.5; 6])).unwrap();
        ds.set_attr("version", "0.9").set_attr("count", 3i64);
        ds
    }

    #[test]
    fn size_must_match_dimensions() {
        let mut ds = sample();
        assert!(ds.add_variable("bad", &["x", "y"], Values::Float(vec![0.0; 5])).is_err());
        assert!(ds.add_variable("bad", &["z"], Values::Float(vec![])).is_err());
        assert!(!ds.has_var("bad"));
    }

    #[test]
    fn dimensions_cannot_be_redefined() {
        let mut ds = sample();
        assert!(ds.add_dim("x", 3).is_ok());
        assert!(ds.add_dim("x", 4).is_err());
    }

    #[test]
    fn typed_accessors() {
        let ds = sample();
        assert_eq!(ds.ints("ids").unwrap(), &[1, 2, 3]);
        assert_eq!(ds.floats("ids").unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(ds.ints("grid").is_err());
        assert_eq!(ds.shape("grid").unwrap(), vec![3, 2]);
        assert_eq!(ds.var("ids").unwrap().attr("long_name").and_then(AttrValue::as_text), Some("identifiers"));
        assert!(ds.var("missing").is_err());
    }

    #[test]
    fn write_then_read_preserves_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        let ds = sample();
        ds.write(&path).unwrap();

        let back = Dataset::read(&path).unwrap();
        assert_eq!(back, ds);
        assert_eq!(back.attr("count"), Some(&AttrValue::Int(3)));
    }

    #[test]
    fn read_rejects_inconsistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"dims": {"n": 2}, "variables": {"v": {"dims": ["n"], "values": {"int": [1]}}}}"#).unwrap();
        assert!(matches!(Dataset::read(&path), Err(Error::InvalidArtifact { .. })));
    }
}
