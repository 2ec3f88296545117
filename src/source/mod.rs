//! Geometry sources: anything that can report a record count and yield records in
//! a stable order, optionally a contiguous slice at a time.

mod explode;
mod geojson;
mod shapefile;

use std::{collections::BTreeMap, ops::Range};

use geo::Geometry;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, IdentifierError, Result},
    geom::Reprojector,
};

pub use explode::explode_multipart;
pub use geojson::GeoJsonSource;
pub use self::shapefile::ShapefileSource;

/// Attribute value of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            Value::String(s) => Self::Text(s),
            other => Self::Text(other.to_string()),
        }
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// One input feature: unique integer id, areal geometry, attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    pub id: i64,
    pub geometry: Geometry<f64>,
    pub properties: Properties,
}

/// Read the unique id of the record at `index` from its `field` attribute.
/// Integral floats and integer strings are accepted.
pub(crate) fn uid_from_properties(properties: &Properties, field: &str, index: usize) -> Result<i64, IdentifierError> {
    let missing = || IdentifierError::Missing { index, field: field.to_string() };
    let not_integer = || IdentifierError::NotInteger { index, field: field.to_string() };

    match properties.get(field) {
        None | Some(PropertyValue::Null) => Err(missing()),
        Some(PropertyValue::Int(id)) => Ok(*id),
        Some(PropertyValue::Float(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(*f as i64),
        Some(PropertyValue::Text(s)) => s.trim().parse().map_err(|_| not_integer()),
        Some(_) => Err(not_integer()),
    }
}

/// Ordered, sliceable access to geometry records.
///
/// Implementations must return the same records in the same order on every call,
/// since each rank reads its own section independently.
pub trait GeometrySource: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool { self.len() == 0 }

    /// Read the records at positions `range`, in order.
    fn records(&self, range: Range<usize>) -> Result<Vec<GeometryRecord>>;

    fn all(&self) -> Result<Vec<GeometryRecord>> { self.records(0..self.len()) }
}

impl<S: GeometrySource + ?Sized> GeometrySource for &S {
    #[inline] fn len(&self) -> usize { (**self).len() }

    fn records(&self, range: Range<usize>) -> Result<Vec<GeometryRecord>> { (**self).records(range) }
}

impl<S: GeometrySource + ?Sized> GeometrySource for Box<S> {
    #[inline] fn len(&self) -> usize { (**self).len() }

    fn records(&self, range: Range<usize>) -> Result<Vec<GeometryRecord>> { (**self).records(range) }
}

/// Fail unless `range` lies within `[0, len)`.
pub(crate) fn check_range(range: &Range<usize>, len: usize) -> Result<()> {
    if range.start > range.end || range.end > len {
        return Err(Error::artifact(
            "geometry source",
            format!("record range {}..{} is outside 0..{len}", range.start, range.end),
        ));
    }
    Ok(())
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<GeometryRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<GeometryRecord>) -> Self { Self { records } }

    #[inline] pub fn records_ref(&self) -> &[GeometryRecord] { &self.records }
}

impl GeometrySource for MemorySource {
    #[inline] fn len(&self) -> usize { self.records.len() }

    fn records(&self, range: Range<usize>) -> Result<Vec<GeometryRecord>> {
        check_range(&range, self.records.len())?;
        Ok(self.records[range].to_vec())
    }
}

/// The first `len` records of another source.
#[derive(Debug, Clone)]
pub struct Limited<S> {
    inner: S,
    len: usize,
}

impl<S: GeometrySource> Limited<S> {
    pub fn new(inner: S, limit: usize) -> Self {
        let len = limit.min(inner.len());
        Self { inner, len }
    }
}

impl<S: GeometrySource> GeometrySource for Limited<S> {
    #[inline] fn len(&self) -> usize { self.len }

    fn records(&self, range: Range<usize>) -> Result<Vec<GeometryRecord>> {
        check_range(&range, self.len)?;
        self.inner.records(range)
    }
}

/// Another source with every geometry transformed to a destination CRS on read.
#[derive(Debug, Clone)]
pub struct Reprojected<S> {
    inner: S,
    from: String,
    to: String,
}

impl<S: GeometrySource> Reprojected<S> {
    /// Fails early if either PROJ.4 definition cannot be parsed.
    pub fn new(inner: S, from: &str, to: &str) -> Result<Self> {
        Reprojector::new(from, to)?;
        Ok(Self { inner, from: from.to_string(), to: to.to_string() })
    }
}

impl<S: GeometrySource> GeometrySource for Reprojected<S> {
    #[inline] fn len(&self) -> usize { self.inner.len() }

    fn records(&self, range: Range<usize>) -> Result<Vec<GeometryRecord>> {
        let reprojector = Reprojector::new(&self.from, &self.to)?;
        self.inner.records(range)?
            .into_iter()
            .map(|record| Ok(GeometryRecord { geometry: reprojector.reproject(&record.geometry)?, ..record }))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use geo::{polygon, MultiPolygon};

    use super::*;

    /// A `cols x rows` grid of unit squares with ids `1..`, row by row.
    pub(crate) fn unit_grid(cols: usize, rows: usize) -> MemorySource {
        let mut records = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                let (x, y) = (col as f64, row as f64);
                records.push(GeometryRecord {
                    id: (records.len() + 1) as i64,
                    geometry: polygon![
                        (x: x, y: y), (x: x + 1.0, y: y), (x: x + 1.0, y: y + 1.0), (x: x, y: y + 1.0),
                    ].into(),
                    properties: Properties::new(),
                });
            }
        }
        MemorySource::new(records)
    }

    #[test]
    fn uid_accepts_integer_like_values() {
        let mut props = Properties::new();
        props.insert("a".into(), PropertyValue::Int(7));
        props.insert("b".into(), PropertyValue::Float(8.0));
        props.insert("c".into(), PropertyValue::Text(" 9 ".into()));
        props.insert("d".into(), PropertyValue::Float(1.5));
        props.insert("e".into(), PropertyValue::Null);

        assert_eq!(uid_from_properties(&props, "a", 0), Ok(7));
        assert_eq!(uid_from_properties(&props, "b", 0), Ok(8));
        assert_eq!(uid_from_properties(&props, "c", 0), Ok(9));
        assert_eq!(
            uid_from_properties(&props, "d", 3),
            Err(IdentifierError::NotInteger { index: 3, field: "d".into() })
        );
        assert_eq!(
            uid_from_properties(&props, "e", 4),
            Err(IdentifierError::Missing { index: 4, field: "e".into() })
        );
        assert!(uid_from_properties(&props, "zz", 0).is_err());
    }

    #[test]
    fn memory_source_slices_in_order() {
        let source = unit_grid(3, 2);
        assert_eq!(source.len(), 6);
        let ids = source.records(2..5).unwrap().iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 4, 5]);
        assert!(source.records(4..7).is_err());
        assert!(source.records(3..3).unwrap().is_empty());
    }

    #[test]
    fn limited_source_truncates() {
        let source = Limited::new(unit_grid(3, 2), 4);
        assert_eq!(source.len(), 4);
        assert_eq!(source.all().unwrap().last().map(|r| r.id), Some(4));
        assert!(source.records(0..5).is_err());
        assert_eq!(Limited::new(unit_grid(1, 1), 10).len(), 1);
    }

    #[test]
    fn reprojected_source_transforms_geometry() {
        let wgs84 = crate::config::DEFAULT_SOURCE_CRS;
        let mercator = "+proj=merc +lon_0=0 +k=1 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs +type=crs";
        let source = Reprojected::new(unit_grid(2, 1), wgs84, mercator).unwrap();
        let records = source.all().unwrap();
        assert_eq!(records.len(), 2);

        let Geometry::Polygon(first) = &records[1].geometry else { panic!("expected polygon") };
        // One degree of longitude on the equator is about 111 km.
        let xs = first.exterior().0.iter().map(|c| c.x).collect::<Vec<_>>();
        assert!(xs.iter().all(|&x| (111_000.0..=222_700.0).contains(&x)));

        let empty: MultiPolygon<f64> = MultiPolygon::new(vec![]);
        assert!(Reprojector::new(wgs84, mercator).unwrap().reproject(&empty.into()).is_ok());
    }

    #[test]
    fn json_values_map_to_properties() {
        assert_eq!(PropertyValue::from(serde_json::json!(3)), PropertyValue::Int(3));
        assert_eq!(PropertyValue::from(serde_json::json!(2.5)), PropertyValue::Float(2.5));
        assert_eq!(PropertyValue::from(serde_json::json!("x")), PropertyValue::Text("x".into()));
        assert_eq!(PropertyValue::from(serde_json::Value::Null), PropertyValue::Null);
    }
}
