//! Mesh elements written back out as polygons.

use std::path::Path;

use ::shapefile::{self as shp, dbase, PolygonRing};
use geo::MultiPolygon;
use tracing::{info, instrument};

use crate::error::{Error, Result};

use super::encode::FlatMeshArrays;

/// Width of the numeric uid column.
const UID_WIDTH: u8 = 18;

/// Convert one decoded element to a shapefile polygon, one outer ring per part.
fn element_to_shp(element: usize, polygon: &MultiPolygon<f64>) -> Result<shp::Polygon> {
    let rings = polygon.0.iter()
        .map(|part| {
            let points = part.exterior().0.iter().map(|c| shp::Point { x: c.x, y: c.y }).collect::<Vec<_>>();
            if points.len() < 4 {
                return Err(Error::artifact("mesh", format!("element {element} has a ring with fewer than three nodes")));
            }
            Ok(PolygonRing::Outer(points))
        })
        .collect::<Result<Vec<_>>>()?;

    if rings.is_empty() {
        return Err(Error::artifact("mesh", format!("element {element} has no rings")));
    }
    Ok(shp::Polygon::with_rings(rings))
}

/// Write every element as a polygon record of an ESRI shapefile at `path`, with
/// the element id in a numeric `uid_name` column. Sidecar `.shx` and `.dbf`
/// files are written next to it.
///
/// The mesh is decoded before any file is created, so a broken mesh leaves
/// nothing behind.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn to_shapefile(flat: &FlatMeshArrays, uid_name: &str, path: &Path) -> Result<()> {
    let field = dbase::FieldName::try_from(uid_name)
        .map_err(|e| Error::artifact("shapefile", format!("field name {uid_name:?}: {e}")))?;

    let shapes = flat.decode()?.iter().enumerate()
        .map(|(element, polygon)| element_to_shp(element, polygon))
        .collect::<Result<Vec<_>>>()?;

    let table = dbase::TableWriterBuilder::new().add_numeric_field(field, UID_WIDTH, 0);
    let mut writer = shp::Writer::from_path(path, table)?;
    for (shape, &id) in shapes.iter().zip(&flat.element_ids) {
        let mut record = dbase::Record::default();
        record.insert(uid_name.to_string(), dbase::FieldValue::Numeric(Some(id as f64)));
        writer.write_shape_and_record(shape, &record)?;
    }

    info!(elements = shapes.len(), "wrote shapefile");
    Ok(())
}
