use geo::{Coord, Geometry, MapCoords};
use proj4rs::{proj::Proj as Proj4, transform::transform};

use crate::error::{Error, Result};

/// Coordinate transform between two PROJ.4 definitions.
///
/// Geographic (lon/lat) sides take and return degrees; proj4rs works in radians,
/// so the conversion is handled here.
pub struct Reprojector {
    from: Proj4,
    to: Proj4,
}

impl std::fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reprojector")
            .field("from_latlong", &self.from.is_latlong())
            .field("to_latlong", &self.to.is_latlong())
            .finish()
    }
}

impl Reprojector {
    pub fn new(from: &str, to: &str) -> Result<Self> {
        let build = |proj_string: &str| Proj4::from_proj_string(proj_string)
            .map_err(|e| Error::Projection(format!("failed to build PROJ.4 {proj_string:?}: {e}")));
        Ok(Self { from: build(from)?, to: build(to)? })
    }

    pub fn transform_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut point = if self.from.is_latlong() {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        transform(&self.from, &self.to, &mut point)
            .map_err(|e| Error::Projection(format!("transform of ({}, {}) failed: {e}", coord.x, coord.y)))?;

        Ok(if self.to.is_latlong() {
            Coord { x: point.0.to_degrees(), y: point.1.to_degrees() }
        } else {
            Coord { x: point.0, y: point.1 }
        })
    }

    pub fn reproject(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        geometry.try_map_coords(|coord| self.transform_coord(coord))
    }
}
