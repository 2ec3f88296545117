use geo::{BooleanOps, Coord, Geometry, MultiPolygon, Polygon, Validation};

use crate::{error::GeometryError, source::GeometryRecord};

/// Get the signed area of a closed coordinate ring (positive for CCW).
pub(crate) fn signed_area(ring: &[Coord<f64>]) -> f64 {
    let mut a = 0.0;
    for w in ring.windows(2) {
        a += w[0].x * w[1].y - w[1].x * w[0].y;
    }
    a / 2.0
}

/// Name of a geometry variant, for error messages.
fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// View an areal record geometry as a MultiPolygon.
pub fn to_multi_polygon(id: i64, geometry: &Geometry<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon.clone()])),
        Geometry::MultiPolygon(multi) => Ok(multi.clone()),
        Geometry::Rect(rect) => Ok(MultiPolygon::new(vec![rect.to_polygon()])),
        Geometry::Triangle(triangle) => Ok(MultiPolygon::new(vec![triangle.to_polygon()])),
        other => Err(GeometryError::UnsupportedType { id, kind: geometry_kind(other) }),
    }
}

/// Reject disallowed multipart geometry, then repair invalid geometry with a
/// zero-width overlay (a union against the empty set rebuilds the rings with
/// self-intersections resolved). Fails if the repaired geometry is still invalid.
pub fn validate(record: GeometryRecord, allow_multipart: bool) -> Result<GeometryRecord, GeometryError> {
    let id = record.id;

    // Must happen before repair: the repair may turn one polygon into several.
    if !allow_multipart {
        if let Geometry::MultiPolygon(multi) = &record.geometry {
            if !multi.0.is_empty() {
                return Err(GeometryError::MultipartNotAllowed { id });
            }
        }
    }

    let multi = to_multi_polygon(id, &record.geometry)?;
    if multi.0.is_empty() || multi.0.iter().all(|p| p.exterior().0.is_empty()) {
        return Err(GeometryError::Empty { id });
    }
    if multi.is_valid() {
        return Ok(record);
    }

    let repaired = multi.union(&MultiPolygon::<f64>::new(Vec::new()));
    if repaired.0.is_empty() || !repaired.is_valid() {
        return Err(GeometryError::Unrepairable { id });
    }

    Ok(GeometryRecord { geometry: Geometry::MultiPolygon(repaired), ..record })
}

/// Orient the exterior ring counter-clockwise and interior rings clockwise.
/// Idempotent: an already normalized polygon is returned unchanged.
pub fn normalize_orientation(polygon: Polygon<f64>) -> Polygon<f64> {
    let (mut exterior, mut interiors) = polygon.into_inner();
    if signed_area(&exterior.0) < 0.0 {
        exterior.0.reverse();
    }
    for ring in &mut interiors {
        if signed_area(&ring.0) > 0.0 {
            ring.0.reverse();
        }
    }
    Polygon::new(exterior, interiors)
}

/// Apply [`normalize_orientation`] to every part.
pub fn normalize_multi_orientation(multi: MultiPolygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(multi.0.into_iter().map(normalize_orientation).collect())
}
