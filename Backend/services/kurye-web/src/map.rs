use serde_json::{json, Value};

use crate::types::{District, Neighborhood};

/// Turns a district into whatever the map widget on the page consumes.
pub trait MapRenderer: Send + Sync {
    /// `None` when this renderer has nothing to show.
    fn render(&self, district: &District, neighborhoods: &[Neighborhood]) -> Option<Value>;
}

/// GeoJSON `FeatureCollection`: the district outline plus one point per neighborhood.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonMapRenderer;

impl MapRenderer for GeoJsonMapRenderer {
    fn render(&self, district: &District, neighborhoods: &[Neighborhood]) -> Option<Value> {
        let mut features = Vec::with_capacity(neighborhoods.len() + 2);

        if let Some(geometry) = &district.geometry {
            features.push(json!({
                "type": "Feature",
                "geometry": geometry,
                "properties": { "kind": "district", "name": district.name },
            }));
        }
        features.push(point_feature("center", &district.name, district.center.lng, district.center.lat));
        for n in neighborhoods {
            features.push(point_feature("neighborhood", &n.name, n.center.lng, n.center.lat));
        }

        let mut collection = json!({
            "type": "FeatureCollection",
            "features": features,
        });
        if let Some(b) = district.bbox {
            // GeoJSON bbox order is [west, south, east, north]
            collection["bbox"] = json!([b.min_lng, b.min_lat, b.max_lng, b.max_lat]);
        }
        Some(collection)
    }
}

fn point_feature(kind: &str, name: &str, lng: f64, lat: f64) -> Value {
    json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [lng, lat] },
        "properties": { "kind": kind, "name": name },
    })
}

/// Renders nothing; for deployments and tests without a map.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMapRenderer;

impl MapRenderer for NoopMapRenderer {
    fn render(&self, _district: &District, _neighborhoods: &[Neighborhood]) -> Option<Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, GeoPoint};

    fn kadikoy() -> District {
        District {
            id: 1,
            name: "Kadıköy".into(),
            center: GeoPoint::new(40.99, 29.03),
            bbox: Some(BoundingBox {
                min_lat: 40.95,
                min_lng: 29.01,
                max_lat: 41.01,
                max_lng: 29.10,
            }),
            geometry: Some(json!({
                "type": "Polygon",
                "coordinates": [[[29.01, 40.95], [29.10, 40.95], [29.10, 41.01], [29.01, 40.95]]]
            })),
            neighborhood_count: 1,
            photo_url: None,
        }
    }

    #[test]
    fn geojson_has_outline_center_and_points() {
        let hoods = vec![Neighborhood {
            id: 2,
            name: "Moda".into(),
            district_id: 1,
            center: GeoPoint::new(40.983, 29.026),
        }];
        let v = GeoJsonMapRenderer.render(&kadikoy(), &hoods).unwrap();
        assert_eq!(v["type"], "FeatureCollection");
        let features = v["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0]["geometry"]["type"], "Polygon");
        assert_eq!(features[2]["properties"]["name"], "Moda");
        assert_eq!(features[2]["geometry"]["coordinates"][0], 29.026);
        assert_eq!(v["bbox"][0], 29.01);
    }

    #[test]
    fn noop_renders_nothing() {
        assert!(NoopMapRenderer.render(&kadikoy(), &[]).is_none());
    }
}
