//! One-off loading of the district GeoJSON and neighborhood fixtures into a store.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::store::Store;
use crate::types::{BoundingBox, GeoPoint, NewDistrict, NewNeighborhood};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("districts file is not a GeoJSON FeatureCollection")]
    NotFeatureCollection,
    #[error("feature #{0} has no name property")]
    UnnamedFeature(usize),
    #[error("district {0:?} has neither a center nor usable geometry")]
    NoCoordinates(String),
    #[error("invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NeighborhoodFixture {
    #[serde(alias = "mahalle")]
    pub name: String,
    #[serde(alias = "ilce")]
    pub district: String,
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub districts: usize,
    pub neighborhoods: usize,
    /// "neighborhood (district)" entries whose district was not in the GeoJSON.
    pub skipped: Vec<String>,
}

fn property_str<'a>(props: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| props.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Walk nested GeoJSON coordinate arrays collecting every `[lng, lat]` pair.
fn collect_positions(coords: &Value, out: &mut Vec<(f64, f64)>) {
    let Some(items) = coords.as_array() else {
        return;
    };
    if let (Some(lng), Some(lat)) = (
        items.first().and_then(Value::as_f64),
        items.get(1).and_then(Value::as_f64),
    ) {
        out.push((lng, lat));
        return;
    }
    for item in items {
        collect_positions(item, out);
    }
}

pub fn geometry_bounds(geometry: &Value) -> Option<BoundingBox> {
    let mut positions = Vec::new();
    collect_positions(geometry.get("coordinates")?, &mut positions);
    let (first_lng, first_lat) = *positions.first()?;
    let mut b = BoundingBox {
        min_lat: first_lat,
        min_lng: first_lng,
        max_lat: first_lat,
        max_lng: first_lng,
    };
    for (lng, lat) in positions {
        b.min_lat = b.min_lat.min(lat);
        b.max_lat = b.max_lat.max(lat);
        b.min_lng = b.min_lng.min(lng);
        b.max_lng = b.max_lng.max(lng);
    }
    Some(b)
}

fn center_property(props: &Value) -> Option<GeoPoint> {
    let lat = props.get("center_lat").or_else(|| props.get("lat"))?.as_f64()?;
    let lng = props.get("center_lng").or_else(|| props.get("lng"))?.as_f64()?;
    Some(GeoPoint::new(lat, lng))
}

/// Parse a district FeatureCollection. Center falls back to the middle of the
/// geometry's bounding box.
pub fn parse_districts(geojson: &str) -> Result<Vec<NewDistrict>, ImportError> {
    let root: Value = serde_json::from_str(geojson)?;
    if root.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(ImportError::NotFeatureCollection);
    }
    let features = root
        .get("features")
        .and_then(Value::as_array)
        .ok_or(ImportError::NotFeatureCollection)?;

    let mut out = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let props = feature.get("properties").cloned().unwrap_or(Value::Null);
        let name = property_str(&props, &["name", "ilce", "NAME"])
            .ok_or(ImportError::UnnamedFeature(i))?
            .to_string();
        let geometry = feature.get("geometry").filter(|g| !g.is_null()).cloned();
        let bbox = geometry.as_ref().and_then(geometry_bounds);
        let center = center_property(&props)
            .or_else(|| {
                bbox.map(|b| {
                    GeoPoint::new((b.min_lat + b.max_lat) / 2.0, (b.min_lng + b.max_lng) / 2.0)
                })
            })
            .ok_or_else(|| ImportError::NoCoordinates(name.clone()))?;
        out.push(NewDistrict {
            photo_url: property_str(&props, &["photo_url", "photo"]).map(str::to_string),
            name,
            center,
            bbox,
            geometry,
            neighborhood_count: 0,
        });
    }
    Ok(out)
}

pub fn parse_neighborhoods(json: &str) -> Result<Vec<NeighborhoodFixture>, ImportError> {
    Ok(serde_json::from_str(json)?)
}

pub async fn import_locations(
    store: &dyn Store,
    mut districts: Vec<NewDistrict>,
    neighborhoods: Vec<NeighborhoodFixture>,
) -> Result<ImportSummary> {
    let mut counts: HashMap<&str, i32> = HashMap::new();
    for n in &neighborhoods {
        *counts.entry(n.district.as_str()).or_default() += 1;
    }
    for d in districts.iter_mut() {
        d.neighborhood_count = counts.get(d.name.as_str()).copied().unwrap_or(0);
    }

    let mut summary = ImportSummary::default();
    let mut ids: HashMap<String, i64> = HashMap::new();
    for d in &districts {
        let row = store
            .upsert_district(d)
            .await
            .with_context(|| format!("upsert district {}", d.name))?;
        ids.insert(row.name, row.id);
        summary.districts += 1;
    }

    for n in neighborhoods {
        let Some(&district_id) = ids.get(&n.district) else {
            warn!(neighborhood=%n.name, district=%n.district, "skipping neighborhood of unknown district");
            summary.skipped.push(format!("{} ({})", n.name, n.district));
            continue;
        };
        store
            .upsert_neighborhood(&NewNeighborhood {
                name: n.name.clone(),
                district_id,
                center: GeoPoint::new(n.lat, n.lng),
            })
            .await
            .with_context(|| format!("upsert neighborhood {}", n.name))?;
        summary.neighborhoods += 1;
    }

    info!(
        districts = summary.districts,
        neighborhoods = summary.neighborhoods,
        skipped = summary.skipped.len(),
        "location import finished"
    );
    Ok(summary)
}

pub async fn import_files(
    store: &dyn Store,
    districts_path: &Path,
    neighborhoods_path: &Path,
) -> Result<ImportSummary> {
    let districts_raw = std::fs::read_to_string(districts_path)
        .with_context(|| format!("read {}", districts_path.display()))?;
    let neighborhoods_raw = std::fs::read_to_string(neighborhoods_path)
        .with_context(|| format!("read {}", neighborhoods_path.display()))?;
    let districts = parse_districts(&districts_raw)?;
    let neighborhoods = parse_neighborhoods(&neighborhoods_raw)?;
    import_locations(store, districts, neighborhoods).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    const GEOJSON: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "properties": { "name": "Kadıköy" },
          "geometry": {
            "type": "Polygon",
            "coordinates": [[[29.0, 40.9], [29.1, 40.9], [29.1, 41.0], [29.0, 41.0], [29.0, 40.9]]]
          }
        },
        {
          "type": "Feature",
          "properties": { "name": "Beşiktaş", "center_lat": 41.04, "center_lng": 29.0 },
          "geometry": null
        }
      ]
    }"#;

    const HOODS: &str = r#"[
      { "name": "Moda", "district": "Kadıköy", "lat": 40.98, "lng": 29.02 },
      { "mahalle": "Bebek", "ilce": "Beşiktaş", "lat": 41.07, "lon": 29.04 },
      { "name": "Kayıp", "district": "Atlantis", "lat": 0.0, "lng": 0.0 }
    ]"#;

    #[test]
    fn center_defaults_to_bbox_middle() {
        let districts = parse_districts(GEOJSON).unwrap();
        assert_eq!(districts.len(), 2);
        let kadikoy = &districts[0];
        let bbox = kadikoy.bbox.unwrap();
        assert_eq!((bbox.min_lng, bbox.max_lng), (29.0, 29.1));
        assert!((kadikoy.center.lat - 40.95).abs() < 1e-9);
        assert!((kadikoy.center.lng - 29.05).abs() < 1e-9);
        assert_eq!(districts[1].center, GeoPoint::new(41.04, 29.0));
        assert!(districts[1].bbox.is_none());
    }

    #[test]
    fn rejects_non_collections_and_unnamed_features() {
        assert!(matches!(
            parse_districts(r#"{"type":"Feature"}"#),
            Err(ImportError::NotFeatureCollection)
        ));
        let unnamed = r#"{"type":"FeatureCollection","features":[{"properties":{},"geometry":null}]}"#;
        assert!(matches!(
            parse_districts(unnamed),
            Err(ImportError::UnnamedFeature(0))
        ));
    }

    #[tokio::test]
    async fn orphans_are_skipped_and_counts_set() {
        let store = MemoryStore::new();
        let summary = import_locations(
            &store,
            parse_districts(GEOJSON).unwrap(),
            parse_neighborhoods(HOODS).unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(summary.districts, 2);
        assert_eq!(summary.neighborhoods, 2);
        assert_eq!(summary.skipped, vec!["Kayıp (Atlantis)".to_string()]);

        let kadikoy = store.district_by_name("Kadıköy").await.unwrap().unwrap();
        assert_eq!(kadikoy.neighborhood_count, 1);
        assert_eq!(store.count_neighborhoods().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let store = MemoryStore::new();
        for _ in 0..2 {
            import_locations(
                &store,
                parse_districts(GEOJSON).unwrap(),
                parse_neighborhoods(HOODS).unwrap(),
            )
            .await
            .unwrap();
        }
        assert_eq!(store.count_districts().await.unwrap(), 2);
        assert_eq!(store.count_neighborhoods().await.unwrap(), 2);
    }
}
