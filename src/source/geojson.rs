use std::{fs, ops::Range, path::Path};

use geo::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, GeometryError, Result};

use super::{check_range, uid_from_properties, GeometryRecord, GeometrySource, Properties, PropertyValue};

fn invalid(message: impl Into<String>) -> Error {
    Error::artifact("GeoJSON", message)
}

/// Parse a ring from GeoJSON coordinates `[[x, y], ...]`, closing it if needed.
fn parse_ring_coords(coords: &Value) -> Result<LineString<f64>> {
    let coords = coords.as_array().ok_or_else(|| invalid("ring must be an array of positions"))?;
    let mut points = Vec::with_capacity(coords.len() + 1);

    for pair in coords {
        let (x, y) = match pair.as_array().map(Vec::as_slice) {
            Some([x, y, ..]) => (x.as_f64(), y.as_f64()),
            _ => (None, None),
        };
        let (Some(x), Some(y)) = (x, y) else {
            return Err(invalid(format!("invalid position {pair}")));
        };
        points.push(Coord { x, y });
    }

    if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
        if first != last {
            points.push(first);
        }
    }
    Ok(LineString(points))
}

/// Parse Polygon coordinates `[exterior, hole, ...]`.
fn parse_polygon_coords(coords: &Value) -> Result<Polygon<f64>> {
    let rings = coords.as_array().ok_or_else(|| invalid("polygon must be an array of rings"))?;
    let Some((exterior, interiors)) = rings.split_first() else {
        return Ok(Polygon::new(LineString(Vec::new()), Vec::new()));
    };
    Ok(Polygon::new(
        parse_ring_coords(exterior)?,
        interiors.iter().map(parse_ring_coords).collect::<Result<_>>()?,
    ))
}

/// Convert a GeoJSON geometry object to a Polygon or MultiPolygon.
fn parse_geometry(id: i64, geometry: &Value) -> Result<Geometry<f64>> {
    let coords = &geometry["coordinates"];
    match geometry["type"].as_str() {
        Some("Polygon") => Ok(Geometry::Polygon(parse_polygon_coords(coords)?)),
        Some("MultiPolygon") => {
            let parts = coords.as_array().ok_or_else(|| invalid("multipolygon must be an array of polygons"))?;
            Ok(Geometry::MultiPolygon(MultiPolygon(
                parts.iter().map(parse_polygon_coords).collect::<Result<_>>()?,
            )))
        }
        Some("Point") | Some("MultiPoint") => Err(GeometryError::UnsupportedType { id, kind: "Point" }.into()),
        Some("LineString") | Some("MultiLineString") => {
            Err(GeometryError::UnsupportedType { id, kind: "LineString" }.into())
        }
        Some("GeometryCollection") => Err(GeometryError::UnsupportedType { id, kind: "GeometryCollection" }.into()),
        None if geometry.is_null() => Err(GeometryError::Empty { id }.into()),
        _ => Err(invalid(format!("record {id}: unknown geometry type {}", geometry["type"]))),
    }
}

/// GeoJSON FeatureCollection reader. Features are parsed once on open; geometry
/// conversion happens per slice.
#[derive(Debug, Clone)]
pub struct GeoJsonSource {
    features: Vec<Value>,
    uid_field: Option<String>,
}

impl GeoJsonSource {
    pub fn open(path: &Path, uid_field: Option<&str>) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        let source = Self::from_slice(&bytes, uid_field)?;
        debug!(path = %path.display(), records = source.features.len(), "opened GeoJSON");
        Ok(source)
    }

    pub fn from_slice(bytes: &[u8], uid_field: Option<&str>) -> Result<Self> {
        let mut value: Value = serde_json::from_slice(bytes)?;
        let features = match value.get_mut("features").map(Value::take) {
            Some(Value::Array(features)) => features,
            _ => return Err(invalid("expected a FeatureCollection with a features array")),
        };
        Ok(Self { features, uid_field: uid_field.map(str::to_string) })
    }
}

impl GeometrySource for GeoJsonSource {
    #[inline] fn len(&self) -> usize { self.features.len() }

    fn records(&self, range: Range<usize>) -> Result<Vec<GeometryRecord>> {
        check_range(&range, self.features.len())?;

        range.map(|index| -> Result<GeometryRecord> {
            let feature = &self.features[index];
            let properties = match &feature["properties"] {
                Value::Object(map) => map.iter()
                    .map(|(key, value)| (key.clone(), PropertyValue::from(value.clone())))
                    .collect::<Properties>(),
                _ => Properties::new(),
            };
            let id = match &self.uid_field {
                Some(field) => uid_from_properties(&properties, field, index)?,
                None => index as i64,
            };
            Ok(GeometryRecord { id, geometry: parse_geometry(id, &feature["geometry"])?, properties })
        })
        .collect()
    }
}
