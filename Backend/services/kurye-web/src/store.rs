use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Config as PgConfig, Pool, Runtime};
use tokio_postgres::{NoTls, Row};

use crate::types::{
    BlogPost, BlogPostPatch, BoundingBox, District, GeoPoint, Neighborhood, NewBlogPost,
    NewDistrict, NewNeighborhood, PostFilter, PostStatus,
};

pub type PgPool = Pool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("slug already in use: {0}")]
    DuplicateSlug(String),
    #[error("district {0} does not exist")]
    UnknownDistrict(i64),
}

/// Hosted data store the site reads from and the admin CMS writes to.
///
/// Handed to every consumer as `Arc<dyn Store>` so tests can swap in
/// [`crate::memory::MemoryStore`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_districts(&self) -> Result<Vec<District>>;
    async fn district_by_name(&self, name: &str) -> Result<Option<District>>;
    async fn neighborhoods_by_district(&self, district_id: i64) -> Result<Vec<Neighborhood>>;
    /// Insert or refresh a district keyed by name.
    async fn upsert_district(&self, d: &NewDistrict) -> Result<District>;
    /// Insert or refresh a neighborhood keyed by (district, name).
    async fn upsert_neighborhood(&self, n: &NewNeighborhood) -> Result<Neighborhood>;

    async fn list_posts(&self, filter: PostFilter) -> Result<Vec<BlogPost>>;
    async fn post_by_slug(&self, slug: &str) -> Result<Option<BlogPost>>;
    async fn post_by_id(&self, id: i64) -> Result<Option<BlogPost>>;
    /// `p.slug` must already be resolved.
    async fn insert_post(&self, p: &NewBlogPost) -> Result<BlogPost>;
    async fn update_post(&self, id: i64, patch: &BlogPostPatch) -> Result<Option<BlogPost>>;
    async fn delete_post(&self, id: i64) -> Result<bool>;
    /// Returns the counter after the increment, `None` if the post is gone.
    async fn increment_views(&self, id: i64) -> Result<Option<i64>>;
    async fn set_author_for_all(&self, author: &str) -> Result<u64>;

    async fn count_posts(&self, status: Option<PostStatus>) -> Result<i64>;
    async fn count_districts(&self) -> Result<i64>;
    async fn count_neighborhoods(&self) -> Result<i64>;
}

pub async fn init_pool(pg_url: &str) -> Result<PgPool> {
    let mut cfg = PgConfig::new();
    cfg.url = Some(pg_url.to_string());

    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

async fn ensure_schema(pool: &PgPool) -> Result<()> {
    // Safe to run on every boot
    const SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS public.districts (
      id                 bigserial PRIMARY KEY,
      name               text NOT NULL,
      center_lat         double precision NOT NULL,
      center_lng         double precision NOT NULL,
      min_lat            double precision,
      min_lng            double precision,
      max_lat            double precision,
      max_lng            double precision,
      geometry           jsonb,
      neighborhood_count int NOT NULL DEFAULT 0,
      photo_url          text
    );
    CREATE UNIQUE INDEX IF NOT EXISTS uq_districts_name ON public.districts (name);

    CREATE TABLE IF NOT EXISTS public.neighborhoods (
      id          bigserial PRIMARY KEY,
      name        text NOT NULL,
      district_id bigint NOT NULL REFERENCES public.districts (id) ON DELETE CASCADE,
      center_lat  double precision NOT NULL,
      center_lng  double precision NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS uq_neighborhoods_district_name
      ON public.neighborhoods (district_id, name);

    CREATE TABLE IF NOT EXISTS public.blog_posts (
      id               bigserial PRIMARY KEY,
      title            text NOT NULL,
      slug             text NOT NULL,
      excerpt          text,
      content          text NOT NULL,
      meta_title       text,
      meta_description text,
      meta_keywords    text,
      status           text NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'published')),
      published_at     timestamptz,
      view_count       bigint NOT NULL DEFAULT 0,
      featured         boolean NOT NULL DEFAULT false,
      author_name      text,
      created_at       timestamptz NOT NULL DEFAULT now(),
      updated_at       timestamptz NOT NULL DEFAULT now()
    );
    CREATE UNIQUE INDEX IF NOT EXISTS uq_blog_posts_slug ON public.blog_posts (slug);
    CREATE INDEX IF NOT EXISTS idx_blog_posts_published_at ON public.blog_posts (published_at DESC);
    "#;

    let conn = pool.get().await?;
    conn.batch_execute(SQL).await?;
    Ok(())
}

const DISTRICT_COLUMNS: &str = "id, name, center_lat, center_lng, min_lat, min_lng, max_lat, \
    max_lng, geometry, neighborhood_count, photo_url";
const NEIGHBORHOOD_COLUMNS: &str = "id, name, district_id, center_lat, center_lng";
const POST_COLUMNS: &str = "id, title, slug, excerpt, content, meta_title, meta_description, \
    meta_keywords, status, published_at, view_count, featured, author_name, created_at, updated_at";

fn district_from_row(row: &Row) -> Result<District> {
    let min_lat: Option<f64> = row.try_get("min_lat")?;
    let min_lng: Option<f64> = row.try_get("min_lng")?;
    let max_lat: Option<f64> = row.try_get("max_lat")?;
    let max_lng: Option<f64> = row.try_get("max_lng")?;
    let bbox = match (min_lat, min_lng, max_lat, max_lng) {
        (Some(min_lat), Some(min_lng), Some(max_lat), Some(max_lng)) => Some(BoundingBox {
            min_lat,
            min_lng,
            max_lat,
            max_lng,
        }),
        _ => None,
    };
    Ok(District {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        center: GeoPoint::new(row.try_get("center_lat")?, row.try_get("center_lng")?),
        bbox,
        geometry: row.try_get("geometry")?,
        neighborhood_count: row.try_get("neighborhood_count")?,
        photo_url: row.try_get("photo_url")?,
    })
}

fn neighborhood_from_row(row: &Row) -> Result<Neighborhood> {
    Ok(Neighborhood {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        district_id: row.try_get("district_id")?,
        center: GeoPoint::new(row.try_get("center_lat")?, row.try_get("center_lng")?),
    })
}

fn post_from_row(row: &Row) -> Result<BlogPost> {
    let status: String = row.try_get("status")?;
    Ok(BlogPost {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        excerpt: row.try_get("excerpt")?,
        content: row.try_get("content")?,
        meta_title: row.try_get("meta_title")?,
        meta_description: row.try_get("meta_description")?,
        meta_keywords: row.try_get("meta_keywords")?,
        status: PostStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown post status {status:?}"))?,
        published_at: row.try_get("published_at")?,
        view_count: row.try_get("view_count")?,
        featured: row.try_get("featured")?,
        author_name: row.try_get("author_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// [`Store`] over a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(pg_url: &str) -> Result<Self> {
        Ok(Self::new(init_pool(pg_url).await?))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_districts(&self) -> Result<Vec<District>> {
        let sql = format!("SELECT {DISTRICT_COLUMNS} FROM public.districts ORDER BY name");
        let conn = self.pool.get().await?;
        let rows = conn.query(sql.as_str(), &[]).await?;
        rows.iter().map(district_from_row).collect()
    }

    async fn district_by_name(&self, name: &str) -> Result<Option<District>> {
        let sql = format!("SELECT {DISTRICT_COLUMNS} FROM public.districts WHERE name = $1");
        let conn = self.pool.get().await?;
        let row = conn.query_opt(sql.as_str(), &[&name]).await?;
        row.as_ref().map(district_from_row).transpose()
    }

    async fn neighborhoods_by_district(&self, district_id: i64) -> Result<Vec<Neighborhood>> {
        let sql = format!(
            "SELECT {NEIGHBORHOOD_COLUMNS} FROM public.neighborhoods \
             WHERE district_id = $1 ORDER BY name"
        );
        let conn = self.pool.get().await?;
        let rows = conn.query(sql.as_str(), &[&district_id]).await?;
        rows.iter().map(neighborhood_from_row).collect()
    }

    async fn upsert_district(&self, d: &NewDistrict) -> Result<District> {
        let sql = format!(
            r#"
            INSERT INTO public.districts
              (name, center_lat, center_lng, min_lat, min_lng, max_lat, max_lng,
               geometry, neighborhood_count, photo_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (name) DO UPDATE
              SET center_lat         = EXCLUDED.center_lat,
                  center_lng         = EXCLUDED.center_lng,
                  min_lat            = EXCLUDED.min_lat,
                  min_lng            = EXCLUDED.min_lng,
                  max_lat            = EXCLUDED.max_lat,
                  max_lng            = EXCLUDED.max_lng,
                  geometry           = EXCLUDED.geometry,
                  neighborhood_count = EXCLUDED.neighborhood_count,
                  photo_url          = COALESCE(EXCLUDED.photo_url, public.districts.photo_url)
            RETURNING {DISTRICT_COLUMNS}
            "#
        );
        let bbox = d.bbox;
        let conn = self.pool.get().await?;
        let row = conn
            .query_one(
                sql.as_str(),
                &[
                    &d.name,
                    &d.center.lat,
                    &d.center.lng,
                    &bbox.map(|b| b.min_lat),
                    &bbox.map(|b| b.min_lng),
                    &bbox.map(|b| b.max_lat),
                    &bbox.map(|b| b.max_lng),
                    &d.geometry,
                    &d.neighborhood_count,
                    &d.photo_url,
                ],
            )
            .await?;
        district_from_row(&row)
    }

    async fn upsert_neighborhood(&self, n: &NewNeighborhood) -> Result<Neighborhood> {
        let sql = format!(
            r#"
            INSERT INTO public.neighborhoods (name, district_id, center_lat, center_lng)
            SELECT $1::text, d.id, $3::double precision, $4::double precision FROM public.districts d WHERE d.id = $2
            ON CONFLICT (district_id, name) DO UPDATE
              SET center_lat = EXCLUDED.center_lat,
                  center_lng = EXCLUDED.center_lng
            RETURNING {NEIGHBORHOOD_COLUMNS}
            "#
        );
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                sql.as_str(),
                &[&n.name, &n.district_id, &n.center.lat, &n.center.lng],
            )
            .await?;
        match row {
            Some(row) => neighborhood_from_row(&row),
            None => Err(StoreError::UnknownDistrict(n.district_id).into()),
        }
    }

    async fn list_posts(&self, filter: PostFilter) -> Result<Vec<BlogPost>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM public.blog_posts \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::boolean IS NULL OR featured = $2) \
             ORDER BY published_at DESC NULLS LAST, created_at DESC \
             LIMIT $3"
        );
        let status = filter.status.map(|s| s.as_str());
        let conn = self.pool.get().await?;
        let rows = conn
            .query(sql.as_str(), &[&status, &filter.featured, &filter.limit])
            .await?;
        rows.iter().map(post_from_row).collect()
    }

    async fn post_by_slug(&self, slug: &str) -> Result<Option<BlogPost>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM public.blog_posts WHERE slug = $1");
        let conn = self.pool.get().await?;
        let row = conn.query_opt(sql.as_str(), &[&slug]).await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn post_by_id(&self, id: i64) -> Result<Option<BlogPost>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM public.blog_posts WHERE id = $1");
        let conn = self.pool.get().await?;
        let row = conn.query_opt(sql.as_str(), &[&id]).await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn insert_post(&self, p: &NewBlogPost) -> Result<BlogPost> {
        let slug = p.slug.clone().unwrap_or_default();
        let sql = format!(
            r#"
            INSERT INTO public.blog_posts
              (title, slug, excerpt, content, meta_title, meta_description, meta_keywords,
               status, published_at, featured, author_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (slug) DO NOTHING
            RETURNING {POST_COLUMNS}
            "#
        );
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                sql.as_str(),
                &[
                    &p.title,
                    &slug,
                    &p.excerpt,
                    &p.content,
                    &p.meta_title,
                    &p.meta_description,
                    &p.meta_keywords,
                    &p.status.as_str(),
                    &p.published_at,
                    &p.featured,
                    &p.author_name,
                ],
            )
            .await?;
        match row {
            Some(row) => post_from_row(&row),
            None => Err(StoreError::DuplicateSlug(slug).into()),
        }
    }

    async fn update_post(&self, id: i64, patch: &BlogPostPatch) -> Result<Option<BlogPost>> {
        if let Some(slug) = &patch.slug {
            if let Some(other) = self.post_by_slug(slug).await? {
                if other.id != id {
                    return Err(StoreError::DuplicateSlug(slug.clone()).into());
                }
            }
        }
        let sql = format!(
            r#"
            UPDATE public.blog_posts
               SET title            = COALESCE($2, title),
                   slug             = COALESCE($3, slug),
                   excerpt          = COALESCE($4, excerpt),
                   content          = COALESCE($5, content),
                   meta_title       = COALESCE($6, meta_title),
                   meta_description = COALESCE($7, meta_description),
                   meta_keywords    = COALESCE($8, meta_keywords),
                   status           = COALESCE($9, status),
                   published_at     = COALESCE($10, published_at),
                   featured         = COALESCE($11, featured),
                   author_name      = COALESCE($12, author_name),
                   updated_at       = $13
             WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        );
        let status = patch.status.map(|s| s.as_str());
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                sql.as_str(),
                &[
                    &id,
                    &patch.title,
                    &patch.slug,
                    &patch.excerpt,
                    &patch.content,
                    &patch.meta_title,
                    &patch.meta_description,
                    &patch.meta_keywords,
                    &status,
                    &patch.published_at,
                    &patch.featured,
                    &patch.author_name,
                    &Utc::now(),
                ],
            )
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn delete_post(&self, id: i64) -> Result<bool> {
        let conn = self.pool.get().await?;
        let n = conn
            .execute("DELETE FROM public.blog_posts WHERE id = $1", &[&id])
            .await?;
        Ok(n > 0)
    }

    async fn increment_views(&self, id: i64) -> Result<Option<i64>> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "UPDATE public.blog_posts SET view_count = view_count + 1 \
                 WHERE id = $1 RETURNING view_count",
                &[&id],
            )
            .await?;
        match row {
            Some(r) => Ok(Some(r.try_get(0)?)),
            None => Ok(None),
        }
    }

    async fn set_author_for_all(&self, author: &str) -> Result<u64> {
        let conn = self.pool.get().await?;
        let n = conn
            .execute(
                "UPDATE public.blog_posts SET author_name = $1, updated_at = now()",
                &[&author],
            )
            .await?;
        Ok(n)
    }

    async fn count_posts(&self, status: Option<PostStatus>) -> Result<i64> {
        let status = status.map(|s| s.as_str());
        let conn = self.pool.get().await?;
        let row = conn
            .query_one(
                "SELECT count(*) FROM public.blog_posts WHERE ($1::text IS NULL OR status = $1)",
                &[&status],
            )
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn count_districts(&self) -> Result<i64> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_one("SELECT count(*) FROM public.districts", &[])
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn count_neighborhoods(&self) -> Result<i64> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_one("SELECT count(*) FROM public.neighborhoods", &[])
            .await?;
        Ok(row.try_get(0)?)
    }
}
