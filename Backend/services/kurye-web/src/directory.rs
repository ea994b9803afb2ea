//! District and neighborhood lookups behind the location landing pages.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::error;

use crate::slug::{matches, slugify};
use crate::store::Store;
use crate::types::{District, Neighborhood};

pub const DEFAULT_NEARBY_LIMIT: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct DistrictSummary {
    pub name: String,
    pub slug: String,
    pub neighborhood_count: i32,
    pub photo_url: Option<String>,
}

impl From<&District> for DistrictSummary {
    fn from(d: &District) -> Self {
        Self {
            name: d.name.clone(),
            slug: slugify(&d.name),
            neighborhood_count: d.neighborhood_count,
            photo_url: d.photo_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborhoodSummary {
    pub name: String,
    pub slug: String,
    pub lat: f64,
    pub lng: f64,
}

impl From<&Neighborhood> for NeighborhoodSummary {
    fn from(n: &Neighborhood) -> Self {
        Self {
            name: n.name.clone(),
            slug: slugify(&n.name),
            lat: n.center.lat,
            lng: n.center.lng,
        }
    }
}

/// Everything a district landing page renders.
#[derive(Debug, Clone, Serialize)]
pub struct DistrictPage {
    pub district: District,
    pub slug: String,
    pub neighborhoods: Vec<NeighborhoodSummary>,
    pub nearby: Vec<DistrictSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborhoodPage {
    pub district: DistrictSummary,
    pub neighborhood: Neighborhood,
    pub slug: String,
    pub siblings: Vec<NeighborhoodSummary>,
}

/// Rank `others` by planar distance from `target`'s center.
///
/// Distance is Euclidean over (lat, lng), so two shores of the Bosphorus can
/// rank as neighbours. The target itself is never returned.
pub fn rank_nearby<'a>(
    target: &District,
    others: &'a [District],
    limit: usize,
) -> Vec<&'a District> {
    let mut ranked: Vec<(f64, &District)> = others
        .iter()
        .filter(|d| d.name != target.name)
        .map(|d| (target.center.planar_distance(&d.center), d))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked.into_iter().take(limit).map(|(_, d)| d).collect()
}

#[derive(Clone)]
pub struct LocationDirectory {
    store: Arc<dyn Store>,
}

impl LocationDirectory {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// All districts ordered by name. Store failures degrade to an empty list.
    pub async fn all_districts(&self) -> Vec<District> {
        match self.store.list_districts().await {
            Ok(v) => v,
            Err(e) => {
                error!(error=?e, "failed to list districts");
                Vec::new()
            }
        }
    }

    pub async fn district_by_name(&self, name: &str) -> Result<Option<District>> {
        self.store.district_by_name(name).await
    }

    pub async fn district_by_slug(&self, slug: &str) -> Result<Option<District>> {
        let districts = self.store.list_districts().await?;
        Ok(districts.into_iter().find(|d| matches(&d.name, slug)))
    }

    pub async fn neighborhoods_of(&self, district: &District) -> Vec<Neighborhood> {
        match self.store.neighborhoods_by_district(district.id).await {
            Ok(v) => v,
            Err(e) => {
                error!(error=?e, district=%district.name, "failed to list neighborhoods");
                Vec::new()
            }
        }
    }

    /// Up to `limit` other districts, closest center first.
    pub async fn nearby_districts(&self, name: &str, limit: usize) -> Result<Vec<District>> {
        let districts = self.store.list_districts().await?;
        let Some(target) = districts.iter().find(|d| d.name == name) else {
            return Ok(Vec::new());
        };
        Ok(rank_nearby(target, &districts, limit)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn district_page(&self, slug: &str) -> Result<Option<DistrictPage>> {
        let districts = self.store.list_districts().await?;
        let Some(district) = districts.iter().find(|d| matches(&d.name, slug)) else {
            return Ok(None);
        };
        let neighborhoods = self.neighborhoods_of(district).await;
        let nearby = rank_nearby(district, &districts, DEFAULT_NEARBY_LIMIT)
            .into_iter()
            .map(DistrictSummary::from)
            .collect();
        Ok(Some(DistrictPage {
            district: district.clone(),
            slug: slugify(&district.name),
            neighborhoods: neighborhoods.iter().map(NeighborhoodSummary::from).collect(),
            nearby,
        }))
    }

    pub async fn neighborhood_page(
        &self,
        district_slug: &str,
        neighborhood_slug: &str,
    ) -> Result<Option<NeighborhoodPage>> {
        let Some(district) = self.district_by_slug(district_slug).await? else {
            return Ok(None);
        };
        let neighborhoods = self.store.neighborhoods_by_district(district.id).await?;
        let Some(neighborhood) = neighborhoods
            .iter()
            .find(|n| matches(&n.name, neighborhood_slug))
            .cloned()
        else {
            return Ok(None);
        };
        let siblings = neighborhoods
            .iter()
            .filter(|n| n.id != neighborhood.id)
            .map(NeighborhoodSummary::from)
            .collect();
        Ok(Some(NeighborhoodPage {
            district: DistrictSummary::from(&district),
            slug: slugify(&neighborhood.name),
            neighborhood,
            siblings,
        }))
    }

    /// Every (district slug, neighborhood slug) pair, for static paths and the sitemap.
    pub async fn all_paths(&self) -> Result<Vec<(String, Vec<String>)>> {
        let mut out = Vec::new();
        for d in self.store.list_districts().await? {
            let hoods = self.store.neighborhoods_by_district(d.id).await?;
            out.push((
                slugify(&d.name),
                hoods.iter().map(|n| slugify(&n.name)).collect(),
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::types::{GeoPoint, NewDistrict, NewNeighborhood};

    const DISTRICTS: &[(&str, f64, f64)] = &[
        ("Kadıköy", 40.990, 29.030),
        ("Üsküdar", 41.023, 29.015),
        ("Beşiktaş", 41.043, 29.007),
        ("Ataşehir", 40.984, 29.107),
        ("Şişli", 41.060, 28.987),
        ("Maltepe", 40.935, 29.131),
        ("Fatih", 41.019, 28.940),
        ("Beylikdüzü", 41.002, 28.641),
    ];

    async fn seeded() -> (Arc<MemoryStore>, LocationDirectory) {
        let store = Arc::new(MemoryStore::new());
        for (name, lat, lng) in DISTRICTS {
            store
                .upsert_district(&NewDistrict {
                    name: name.to_string(),
                    center: GeoPoint::new(*lat, *lng),
                    bbox: None,
                    geometry: None,
                    neighborhood_count: 0,
                    photo_url: None,
                })
                .await
                .unwrap();
        }
        let dir = LocationDirectory::new(store.clone());
        (store, dir)
    }

    #[tokio::test]
    async fn districts_are_sorted_by_name() {
        let (_, dir) = seeded().await;
        let names: Vec<String> = dir.all_districts().await.into_iter().map(|d| d.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), DISTRICTS.len());
    }

    #[tokio::test]
    async fn nearby_excludes_self_and_respects_limit() {
        let (_, dir) = seeded().await;
        let target = dir.district_by_name("Kadıköy").await.unwrap().unwrap();
        for limit in [0, 1, 3, 6, 100] {
            let near = dir.nearby_districts("Kadıköy", limit).await.unwrap();
            assert!(near.len() <= limit);
            assert!(near.iter().all(|d| d.name != "Kadıköy"));
            let dists: Vec<f64> = near
                .iter()
                .map(|d| target.center.planar_distance(&d.center))
                .collect();
            assert!(dists.windows(2).all(|w| w[0] <= w[1]));
        }
        let near = dir.nearby_districts("Kadıköy", 1).await.unwrap();
        assert_eq!(near[0].name, "Üsküdar");
    }

    #[tokio::test]
    async fn nearby_of_unknown_is_empty() {
        let (_, dir) = seeded().await;
        assert!(dir.nearby_districts("Atlantis", 6).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_name_is_none() {
        let (_, dir) = seeded().await;
        assert!(dir.district_by_name("kadikoy").await.unwrap().is_none());
        assert!(dir.district_page("atlantis").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn page_resolves_slug_and_lists_neighborhoods() {
        let (store, dir) = seeded().await;
        let kadikoy = store.district_by_name("Kadıköy").await.unwrap().unwrap();
        for (name, lat, lng) in [("Moda", 40.983, 29.026), ("Caferağa", 40.987, 29.025)] {
            store
                .upsert_neighborhood(&NewNeighborhood {
                    name: name.into(),
                    district_id: kadikoy.id,
                    center: GeoPoint::new(lat, lng),
                })
                .await
                .unwrap();
        }

        let page = dir.district_page("kadikoy").await.unwrap().unwrap();
        assert_eq!(page.district.name, "Kadıköy");
        assert_eq!(page.neighborhoods.len(), 2);
        assert_eq!(page.neighborhoods[0].slug, "caferaga");
        assert_eq!(page.nearby.len(), DEFAULT_NEARBY_LIMIT);

        let hood = dir
            .neighborhood_page("kadikoy", "caferaga")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hood.neighborhood.name, "Caferağa");
        assert_eq!(hood.siblings.len(), 1);
        assert!(dir.neighborhood_page("kadikoy", "yok").await.unwrap().is_none());
    }
}
