use std::{
    ops::Range,
    path::{Path, PathBuf},
};

use ::shapefile::{self as shp, dbase::FieldValue, PolygonRing, Reader, Shape};
use geo::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use tracing::debug;

use crate::error::{Error, GeometryError, Result};

use super::{check_range, uid_from_properties, GeometryRecord, GeometrySource, Properties, PropertyValue};

/// Ensure first and last are the same for geo::LineString coords.
fn ensure_closed(coords: &mut Vec<Coord<f64>>) {
    if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
        if first != last {
            coords.push(first);
        }
    }
}

/// Convert shapefile polygon rings to a MultiPolygon. Shapefiles store each outer
/// ring followed by its holes.
fn rings_to_geo<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> Coord<f64>) -> MultiPolygon<f64> {
    let mut polys = Vec::new();
    let mut current_exterior: Option<LineString<f64>> = None;
    let mut current_holes = Vec::new();

    for ring in rings {
        let mut coords = ring.points().iter().map(&xy).collect::<Vec<_>>();
        ensure_closed(&mut coords);
        let ls = LineString(coords);

        match ring {
            PolygonRing::Outer(_) => {
                if let Some(ext) = current_exterior.take() {
                    polys.push(Polygon::new(ext, std::mem::take(&mut current_holes)));
                }
                current_exterior = Some(ls);
            }
            PolygonRing::Inner(_) => current_holes.push(ls),
        }
    }
    if let Some(ext) = current_exterior {
        polys.push(Polygon::new(ext, current_holes));
    }

    MultiPolygon(polys)
}

/// Convert a shape to an areal geometry, rejecting anything that is not a polygon.
fn shape_to_geo(id: i64, shape: Shape) -> Result<Geometry<f64>, GeometryError> {
    let multi = match shape {
        Shape::Polygon(p) => rings_to_geo(p.rings(), |pt: &shp::Point| Coord { x: pt.x, y: pt.y }),
        Shape::PolygonM(p) => rings_to_geo(p.rings(), |pt: &shp::PointM| Coord { x: pt.x, y: pt.y }),
        Shape::PolygonZ(p) => rings_to_geo(p.rings(), |pt: &shp::PointZ| Coord { x: pt.x, y: pt.y }),
        Shape::NullShape => return Err(GeometryError::Empty { id }),
        Shape::Point(_) | Shape::PointM(_) | Shape::PointZ(_) => {
            return Err(GeometryError::UnsupportedType { id, kind: "Point" })
        }
        Shape::Polyline(_) | Shape::PolylineM(_) | Shape::PolylineZ(_) => {
            return Err(GeometryError::UnsupportedType { id, kind: "Polyline" })
        }
        Shape::Multipoint(_) | Shape::MultipointM(_) | Shape::MultipointZ(_) => {
            return Err(GeometryError::UnsupportedType { id, kind: "Multipoint" })
        }
        Shape::Multipatch(_) => return Err(GeometryError::UnsupportedType { id, kind: "Multipatch" }),
    };

    // Single-part polygons stay polygons so the multipart check sees the true part count.
    let mut parts = multi.0;
    Ok(if parts.len() == 1 {
        Geometry::Polygon(parts.remove(0))
    } else {
        Geometry::MultiPolygon(MultiPolygon(parts))
    })
}

fn field_to_property(value: FieldValue) -> PropertyValue {
    match value {
        FieldValue::Character(Some(s)) => PropertyValue::Text(s.trim().to_string()),
        FieldValue::Memo(s) => PropertyValue::Text(s),
        FieldValue::Numeric(Some(n)) => PropertyValue::Float(n),
        FieldValue::Float(Some(f)) => PropertyValue::Float(f as f64),
        FieldValue::Double(d) => PropertyValue::Float(d),
        FieldValue::Currency(c) => PropertyValue::Float(c),
        FieldValue::Integer(i) => PropertyValue::Int(i as i64),
        FieldValue::Logical(Some(b)) => PropertyValue::Bool(b),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None) => PropertyValue::Null,
        other => PropertyValue::Text(format!("{other:?}")),
    }
}

/// ESRI shapefile reader. The file is reopened for every slice so ranks share nothing.
#[derive(Debug, Clone)]
pub struct ShapefileSource {
    path: PathBuf,
    uid_field: Option<String>,
    len: usize,
}

impl ShapefileSource {
    /// Open a shapefile. Record ids come from `uid_field` when given, else from
    /// the record position.
    pub fn open(path: &Path, uid_field: Option<&str>) -> Result<Self> {
        let reader = Reader::from_path(path)?;
        let len = reader.shape_count()?;
        debug!(path = %path.display(), records = len, "opened shapefile");
        Ok(Self { path: path.to_path_buf(), uid_field: uid_field.map(str::to_string), len })
    }

    #[inline] pub fn path(&self) -> &Path { &self.path }
}

impl GeometrySource for ShapefileSource {
    #[inline] fn len(&self) -> usize { self.len }

    fn records(&self, range: Range<usize>) -> Result<Vec<GeometryRecord>> {
        check_range(&range, self.len)?;
        let mut reader = Reader::from_path(&self.path)?;

        let mut records = Vec::with_capacity(range.len());
        for (index, result) in reader.iter_shapes_and_records().enumerate().skip(range.start).take(range.len()) {
            let (shape, record) = result?;
            let properties = record.into_iter()
                .map(|(field, value)| (field, field_to_property(value)))
                .collect::<Properties>();

            let id = match &self.uid_field {
                Some(field) => uid_from_properties(&properties, field, index)?,
                None => index as i64,
            };
            records.push(GeometryRecord { id, geometry: shape_to_geo(id, shape)?, properties });
        }

        if records.len() != range.len() {
            return Err(Error::artifact(
                "shapefile",
                format!("{} ended after {} of {} requested records", self.path.display(), records.len(), range.len()),
            ));
        }
        Ok(records)
    }
}
