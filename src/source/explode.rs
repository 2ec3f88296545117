use geo::Geometry;
use tracing::info;

use super::{GeometryRecord, MemorySource, Properties, PropertyValue};

/// Split every multi-part record into single-part records.
///
/// Each output record gets a new sequential id starting at `start`, also stored
/// as an integer under `link_field`. All other attributes are copied.
pub fn explode_multipart(records: Vec<GeometryRecord>, link_field: &str, start: i64) -> MemorySource {
    let input = records.len();
    let mut next = start;
    let mut output = Vec::with_capacity(input);

    let mut push = |geometry: Geometry<f64>, properties: &Properties| {
        let mut properties = properties.clone();
        properties.insert(link_field.to_string(), PropertyValue::Int(next));
        output.push(GeometryRecord { id: next, geometry, properties });
        next += 1;
    };

    for record in records {
        match record.geometry {
            Geometry::MultiPolygon(multi) => {
                for part in multi.0 {
                    push(Geometry::Polygon(part), &record.properties);
                }
            }
            geometry => push(geometry, &record.properties),
        }
    }

    info!(input, output = output.len(), link_field, "exploded multipart records");
    MemorySource::new(output)
}

#[cfg(test)]
mod tests {
    use geo::{polygon, MultiPolygon};

    use super::*;
    use crate::source::GeometrySource;

    #[test]
    fn parts_get_sequential_ids_and_copied_attributes() {
        let mut properties = Properties::new();
        properties.insert("name".into(), PropertyValue::Text("basin".into()));

        let records = vec![
            GeometryRecord {
                id: 100,
                geometry: polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)].into(),
                properties: properties.clone(),
            },
            GeometryRecord {
                id: 200,
                geometry: MultiPolygon::new(vec![
                    polygon![(x: 2.0, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 1.0)],
                    polygon![(x: 4.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: 1.0)],
                ]).into(),
                properties,
            },
        ];

        let exploded = explode_multipart(records, "MID", 1);
        let out = exploded.all().unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(out.iter().all(|r| matches!(r.geometry, Geometry::Polygon(_))));
        assert_eq!(out[2].properties["MID"], PropertyValue::Int(3));
        assert_eq!(out[2].properties["name"], PropertyValue::Text("basin".into()));
    }
}
