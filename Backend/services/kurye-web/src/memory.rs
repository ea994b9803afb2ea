use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::store::{Store, StoreError};
use crate::types::{
    BlogPost, BlogPostPatch, District, Neighborhood, NewBlogPost, NewDistrict, NewNeighborhood,
    PostFilter, PostStatus,
};

#[derive(Default)]
struct Tables {
    districts: Vec<District>,
    neighborhoods: Vec<Neighborhood>,
    posts: Vec<BlogPost>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process [`Store`] used by tests and when no `PG_URL` is configured.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T> {
        let guard = self.tables.read().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut guard = self
            .tables
            .write()
            .map_err(|_| anyhow!("memory store poisoned"))?;
        f(&mut guard)
    }
}

fn apply_patch(post: &mut BlogPost, patch: &BlogPostPatch) {
    if let Some(v) = &patch.title {
        post.title = v.clone();
    }
    if let Some(v) = &patch.slug {
        post.slug = v.clone();
    }
    if let Some(v) = &patch.excerpt {
        post.excerpt = Some(v.clone());
    }
    if let Some(v) = &patch.content {
        post.content = v.clone();
    }
    if let Some(v) = &patch.meta_title {
        post.meta_title = Some(v.clone());
    }
    if let Some(v) = &patch.meta_description {
        post.meta_description = Some(v.clone());
    }
    if let Some(v) = &patch.meta_keywords {
        post.meta_keywords = Some(v.clone());
    }
    if let Some(v) = patch.status {
        post.status = v;
    }
    if let Some(v) = patch.published_at {
        post.published_at = Some(v);
    }
    if let Some(v) = patch.featured {
        post.featured = v;
    }
    if let Some(v) = &patch.author_name {
        post.author_name = Some(v.clone());
    }
    post.updated_at = Utc::now();
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_districts(&self) -> Result<Vec<District>> {
        self.read(|t| {
            let mut out = t.districts.clone();
            out.sort_by(|a, b| a.name.cmp(&b.name));
            out
        })
    }

    async fn district_by_name(&self, name: &str) -> Result<Option<District>> {
        self.read(|t| t.districts.iter().find(|d| d.name == name).cloned())
    }

    async fn neighborhoods_by_district(&self, district_id: i64) -> Result<Vec<Neighborhood>> {
        self.read(|t| {
            let mut out: Vec<Neighborhood> = t
                .neighborhoods
                .iter()
                .filter(|n| n.district_id == district_id)
                .cloned()
                .collect();
            out.sort_by(|a, b| a.name.cmp(&b.name));
            out
        })
    }

    async fn upsert_district(&self, d: &NewDistrict) -> Result<District> {
        self.write(|t| {
            if let Some(existing) = t.districts.iter_mut().find(|x| x.name == d.name) {
                existing.center = d.center;
                existing.bbox = d.bbox;
                existing.geometry = d.geometry.clone();
                existing.neighborhood_count = d.neighborhood_count;
                if d.photo_url.is_some() {
                    existing.photo_url = d.photo_url.clone();
                }
                return Ok(existing.clone());
            }
            let row = District {
                id: t.next_id(),
                name: d.name.clone(),
                center: d.center,
                bbox: d.bbox,
                geometry: d.geometry.clone(),
                neighborhood_count: d.neighborhood_count,
                photo_url: d.photo_url.clone(),
            };
            t.districts.push(row.clone());
            Ok(row)
        })
    }

    async fn upsert_neighborhood(&self, n: &NewNeighborhood) -> Result<Neighborhood> {
        self.write(|t| {
            if !t.districts.iter().any(|d| d.id == n.district_id) {
                return Err(StoreError::UnknownDistrict(n.district_id).into());
            }
            if let Some(existing) = t
                .neighborhoods
                .iter_mut()
                .find(|x| x.district_id == n.district_id && x.name == n.name)
            {
                existing.center = n.center;
                return Ok(existing.clone());
            }
            let row = Neighborhood {
                id: t.next_id(),
                name: n.name.clone(),
                district_id: n.district_id,
                center: n.center,
            };
            t.neighborhoods.push(row.clone());
            Ok(row)
        })
    }

    async fn list_posts(&self, filter: PostFilter) -> Result<Vec<BlogPost>> {
        self.read(|t| {
            let mut out: Vec<BlogPost> = t
                .posts
                .iter()
                .filter(|p| filter.status.map_or(true, |s| p.status == s))
                .filter(|p| filter.featured.map_or(true, |f| p.featured == f))
                .cloned()
                .collect();
            // published_at DESC NULLS LAST, then created_at DESC
            out.sort_by(|a, b| {
                b.published_at
                    .is_some()
                    .cmp(&a.published_at.is_some())
                    .then(b.published_at.cmp(&a.published_at))
                    .then(b.created_at.cmp(&a.created_at))
            });
            if let Some(limit) = filter.limit {
                out.truncate(limit.max(0) as usize);
            }
            out
        })
    }

    async fn post_by_slug(&self, slug: &str) -> Result<Option<BlogPost>> {
        self.read(|t| t.posts.iter().find(|p| p.slug == slug).cloned())
    }

    async fn post_by_id(&self, id: i64) -> Result<Option<BlogPost>> {
        self.read(|t| t.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_post(&self, p: &NewBlogPost) -> Result<BlogPost> {
        let slug = p.slug.clone().unwrap_or_default();
        self.write(|t| {
            if t.posts.iter().any(|x| x.slug == slug) {
                return Err(StoreError::DuplicateSlug(slug).into());
            }
            let now = Utc::now();
            let row = BlogPost {
                id: t.next_id(),
                title: p.title.clone(),
                slug,
                excerpt: p.excerpt.clone(),
                content: p.content.clone(),
                meta_title: p.meta_title.clone(),
                meta_description: p.meta_description.clone(),
                meta_keywords: p.meta_keywords.clone(),
                status: p.status,
                published_at: p.published_at,
                view_count: 0,
                featured: p.featured,
                author_name: p.author_name.clone(),
                created_at: now,
                updated_at: now,
            };
            t.posts.push(row.clone());
            Ok(row)
        })
    }

    async fn update_post(&self, id: i64, patch: &BlogPostPatch) -> Result<Option<BlogPost>> {
        self.write(|t| {
            if let Some(slug) = &patch.slug {
                if t.posts.iter().any(|x| &x.slug == slug && x.id != id) {
                    return Err(StoreError::DuplicateSlug(slug.clone()).into());
                }
            }
            Ok(t.posts.iter_mut().find(|p| p.id == id).map(|post| {
                apply_patch(post, patch);
                post.clone()
            }))
        })
    }

    async fn delete_post(&self, id: i64) -> Result<bool> {
        self.write(|t| {
            let before = t.posts.len();
            t.posts.retain(|p| p.id != id);
            Ok(t.posts.len() != before)
        })
    }

    async fn increment_views(&self, id: i64) -> Result<Option<i64>> {
        self.write(|t| {
            Ok(t.posts.iter_mut().find(|p| p.id == id).map(|post| {
                post.view_count += 1;
                post.view_count
            }))
        })
    }

    async fn set_author_for_all(&self, author: &str) -> Result<u64> {
        self.write(|t| {
            let now = Utc::now();
            for p in t.posts.iter_mut() {
                p.author_name = Some(author.to_string());
                p.updated_at = now;
            }
            Ok(t.posts.len() as u64)
        })
    }

    async fn count_posts(&self, status: Option<PostStatus>) -> Result<i64> {
        self.read(|t| {
            t.posts
                .iter()
                .filter(|p| status.map_or(true, |s| p.status == s))
                .count() as i64
        })
    }

    async fn count_districts(&self) -> Result<i64> {
        self.read(|t| t.districts.len() as i64)
    }

    async fn count_neighborhoods(&self) -> Result<i64> {
        self.read(|t| t.neighborhoods.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;

    fn post(title: &str, slug: &str, status: PostStatus) -> NewBlogPost {
        NewBlogPost {
            title: title.into(),
            slug: Some(slug.into()),
            content: "<p>x</p>".into(),
            status,
            ..NewBlogPost::default()
        }
    }

    #[tokio::test]
    async fn duplicate_slug_is_rejected() {
        let store = MemoryStore::new();
        store.insert_post(&post("A", "a", PostStatus::Draft)).await.unwrap();
        let err = store
            .insert_post(&post("B", "a", PostStatus::Draft))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::DuplicateSlug(s)) if s == "a"
        ));
    }

    #[tokio::test]
    async fn neighborhood_requires_district() {
        let store = MemoryStore::new();
        let err = store
            .upsert_neighborhood(&NewNeighborhood {
                name: "Moda".into(),
                district_id: 42,
                center: GeoPoint::new(40.98, 29.02),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::UnknownDistrict(42))
        ));
    }

    #[tokio::test]
    async fn counts_and_filters() {
        let store = MemoryStore::new();
        store.insert_post(&post("A", "a", PostStatus::Draft)).await.unwrap();
        store
            .insert_post(&post("B", "b", PostStatus::Published))
            .await
            .unwrap();
        assert_eq!(store.count_posts(None).await.unwrap(), 2);
        assert_eq!(
            store.count_posts(Some(PostStatus::Published)).await.unwrap(),
            1
        );
        let published = store.list_posts(PostFilter::published()).await.unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].slug, "b");
    }

    #[tokio::test]
    async fn increment_on_deleted_post_is_none() {
        let store = MemoryStore::new();
        let a = store
            .insert_post(&post("A", "a", PostStatus::Published))
            .await
            .unwrap();
        assert_eq!(store.increment_views(a.id).await.unwrap(), Some(1));
        assert!(store.delete_post(a.id).await.unwrap());
        assert_eq!(store.increment_views(a.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_author_touches_every_post() {
        let store = MemoryStore::new();
        store.insert_post(&post("A", "a", PostStatus::Draft)).await.unwrap();
        store.insert_post(&post("B", "b", PostStatus::Draft)).await.unwrap();
        assert_eq!(store.set_author_for_all("Kurye Ekibi").await.unwrap(), 2);
        let a = store.post_by_slug("a").await.unwrap().unwrap();
        assert_eq!(a.author_name.as_deref(), Some("Kurye Ekibi"));
    }
}
