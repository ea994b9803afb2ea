use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use crate::slug::slugify;
use crate::store::Store;
use crate::types::{BlogPost, BlogPostPatch, NewBlogPost, PostFilter, PostStatus};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct AdminStats {
    pub posts: i64,
    pub published: i64,
    pub drafts: i64,
    pub districts: i64,
    pub neighborhoods: i64,
}

/// Public blog reads plus the admin CMS writes.
#[derive(Clone)]
pub struct BlogService {
    store: Arc<dyn Store>,
}

impl BlogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Published posts, newest first. Store failures degrade to an empty list.
    pub async fn published(&self, featured: Option<bool>, limit: Option<i64>) -> Vec<BlogPost> {
        let filter = PostFilter {
            featured,
            limit,
            ..PostFilter::published()
        };
        match self.store.list_posts(filter).await {
            Ok(v) => v,
            Err(e) => {
                error!(error=?e, "failed to list published posts");
                Vec::new()
            }
        }
    }

    /// Fetch a published post for its detail page and count the view.
    ///
    /// Every call counts, there is no per-visitor dedup.
    pub async fn read_published(&self, slug: &str) -> Result<Option<BlogPost>> {
        let Some(mut post) = self.store.post_by_slug(slug).await? else {
            return Ok(None);
        };
        if post.status != PostStatus::Published {
            return Ok(None);
        }
        // deleted between the lookup and the increment
        let Some(views) = self.store.increment_views(post.id).await? else {
            return Ok(None);
        };
        post.view_count = views;
        Ok(Some(post))
    }

    pub async fn list(&self, filter: PostFilter) -> Result<Vec<BlogPost>> {
        self.store.list_posts(filter).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<BlogPost>> {
        self.store.post_by_id(id).await
    }

    pub async fn create(&self, mut p: NewBlogPost) -> Result<BlogPost> {
        p.title = p.title.trim().to_string();
        if p.title.is_empty() {
            bail!(ValidationError("title is required"));
        }
        let slug = p
            .slug
            .as_deref()
            .map(slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&p.title));
        if slug.is_empty() {
            bail!(ValidationError("title has no usable slug characters"));
        }
        p.slug = Some(slug);
        if p.status == PostStatus::Published && p.published_at.is_none() {
            p.published_at = Some(Utc::now());
        }
        let post = self.store.insert_post(&p).await?;
        info!(id = post.id, slug=%post.slug, status = post.status.as_str(), "post created");
        Ok(post)
    }

    pub async fn update(&self, id: i64, mut patch: BlogPostPatch) -> Result<Option<BlogPost>> {
        let Some(existing) = self.store.post_by_id(id).await? else {
            return Ok(None);
        };
        if let Some(title) = patch.title.take() {
            let title = title.trim().to_string();
            if title.is_empty() {
                bail!(ValidationError("title cannot be blank"));
            }
            patch.title = Some(title);
        }
        if let Some(slug) = patch.slug.take() {
            let slug = slugify(&slug);
            if slug.is_empty() {
                bail!(ValidationError("slug has no usable characters"));
            }
            patch.slug = Some(slug);
        }
        if patch.status == Some(PostStatus::Published)
            && patch.published_at.is_none()
            && existing.published_at.is_none()
        {
            patch.published_at = Some(Utc::now());
        }
        let updated = self.store.update_post(id, &patch).await?;
        if updated.is_some() {
            info!(id, "post updated");
        }
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let deleted = self.store.delete_post(id).await?;
        if deleted {
            info!(id, "post deleted");
        }
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<AdminStats> {
        let posts = self.store.count_posts(None).await?;
        let published = self.store.count_posts(Some(PostStatus::Published)).await?;
        Ok(AdminStats {
            posts,
            published,
            drafts: posts - published,
            districts: self.store.count_districts().await?,
            neighborhoods: self.store.count_neighborhoods().await?,
        })
    }

    pub async fn set_author_for_all(&self, author: &str) -> Result<u64> {
        let author = author.trim();
        if author.is_empty() {
            bail!(ValidationError("author name is required"));
        }
        self.store.set_author_for_all(author).await
    }
}

/// Rejected admin input; maps to 400.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub &'static str);
