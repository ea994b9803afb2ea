use std::sync::Arc;

use actix_web::web::Query;
use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use crate::blog::{BlogService, ValidationError};
use crate::config::Config;
use crate::directory::{DistrictSummary, LocationDirectory, DEFAULT_NEARBY_LIMIT};
use crate::generator::{BlogDraftGenerator, DraftProvider, GenerateError, GenerateRequest};
use crate::map::MapRenderer;
use crate::order::{build_link, OrderDraft, OrderError};
use crate::seo;
use crate::store::{Store, StoreError};
use crate::types::{BlogPostPatch, Health, NewBlogPost, PostFilter, PostStatus};

/// Everything the handlers need, built once and shared across workers.
pub struct AppState {
    pub directory: LocationDirectory,
    pub blog: BlogService,
    pub generator: BlogDraftGenerator,
    pub map: Arc<dyn MapRenderer>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn DraftProvider>,
        map: Arc<dyn MapRenderer>,
        config: Config,
    ) -> Self {
        Self {
            directory: LocationDirectory::new(store.clone()),
            blog: BlogService::new(store),
            generator: BlogDraftGenerator::new(provider),
            map,
            config,
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_districts)
        .service(district_nearby)
        .service(district_map)
        .service(district_page)
        .service(neighborhood_page)
        .service(list_posts)
        .service(read_post)
        .service(order_link)
        .service(admin_list_posts)
        .service(admin_create_post)
        .service(admin_get_post)
        .service(admin_update_post)
        .service(admin_delete_post)
        .service(admin_stats)
        .service(generate_blog)
        .service(sitemap)
        .service(robots);
}

fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "ok": true, "data": data }))
}

fn not_found(what: &str) -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "ok": false, "error": format!("{what}_not_found") }))
}

fn store_failed(e: &anyhow::Error) -> HttpResponse {
    if let Some(v) = e.downcast_ref::<ValidationError>() {
        return HttpResponse::BadRequest().json(json!({ "ok": false, "error": v.to_string() }));
    }
    if let Some(StoreError::DuplicateSlug(slug)) = e.downcast_ref::<StoreError>() {
        return HttpResponse::Conflict().json(json!({
            "ok": false, "error": "duplicate_slug", "slug": slug
        }));
    }
    error!(error=?e, "store operation failed");
    HttpResponse::InternalServerError().json(json!({ "ok": false, "error": "store_failed" }))
}

/// `None` when the request may proceed.
fn require_admin(req: &HttpRequest, state: &AppState) -> Option<HttpResponse> {
    let expected = state.config.admin_token.as_deref()?;
    let presented = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected) {
        None
    } else {
        warn!(path = req.path(), "rejected admin request");
        Some(HttpResponse::Unauthorized().json(json!({ "ok": false, "error": "unauthorized" })))
    }
}

#[get("/health")]
async fn health() -> impl Responder {
    web::Json(Health {
        status: "ok".into(),
    })
}

/* ------------------------ locations ------------------------ */

#[get("/api/districts")]
async fn list_districts(state: web::Data<AppState>) -> impl Responder {
    let districts = state.directory.all_districts().await;
    ok(districts.iter().map(DistrictSummary::from).collect::<Vec<_>>())
}

#[derive(Debug, Deserialize)]
struct NearbyQ {
    limit: Option<usize>,
}

#[get("/api/districts/{slug}/_/nearby")]
async fn district_nearby(
    path: web::Path<String>,
    q: Query<NearbyQ>,
    state: web::Data<AppState>,
) -> impl Responder {
    let slug = path.into_inner();
    let limit = q.limit.unwrap_or(DEFAULT_NEARBY_LIMIT).min(50);
    let district = match state.directory.district_by_slug(&slug).await {
        Ok(Some(d)) => d,
        Ok(None) => return not_found("district"),
        Err(e) => return store_failed(&e),
    };
    match state.directory.nearby_districts(&district.name, limit).await {
        Ok(v) => ok(v.iter().map(DistrictSummary::from).collect::<Vec<_>>()),
        Err(e) => store_failed(&e),
    }
}

#[get("/api/districts/{slug}/_/map")]
async fn district_map(path: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    let slug = path.into_inner();
    let district = match state.directory.district_by_slug(&slug).await {
        Ok(Some(d)) => d,
        Ok(None) => return not_found("district"),
        Err(e) => return store_failed(&e),
    };
    let neighborhoods = state.directory.neighborhoods_of(&district).await;
    match state.map.render(&district, &neighborhoods) {
        Some(geojson) => HttpResponse::Ok()
            .content_type("application/geo+json")
            .json(geojson),
        None => HttpResponse::NoContent().finish(),
    }
}

#[get("/api/districts/{slug}")]
async fn district_page(path: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    let slug = path.into_inner();
    match state.directory.district_page(&slug).await {
        Ok(Some(page)) => ok(page),
        Ok(None) => not_found("district"),
        Err(e) => store_failed(&e),
    }
}

#[get("/api/districts/{slug}/{neighborhood}")]
async fn neighborhood_page(
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> impl Responder {
    let (district, neighborhood) = path.into_inner();
    match state.directory.neighborhood_page(&district, &neighborhood).await {
        Ok(Some(page)) => ok(page),
        Ok(None) => not_found("neighborhood"),
        Err(e) => store_failed(&e),
    }
}

/* ------------------------ public blog ------------------------ */

#[derive(Debug, Deserialize)]
struct BlogQ {
    featured: Option<bool>,
    limit: Option<i64>,
}

#[get("/api/blog")]
async fn list_posts(q: Query<BlogQ>, state: web::Data<AppState>) -> impl Responder {
    let limit = q.limit.map(|l| l.clamp(1, 100));
    ok(state.blog.published(q.featured, limit).await)
}

#[get("/api/blog/{slug}")]
async fn read_post(path: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    let slug = path.into_inner();
    match state.blog.read_published(&slug).await {
        Ok(Some(post)) => ok(post),
        Ok(None) => not_found("post"),
        Err(e) => store_failed(&e),
    }
}

/* ------------------------ order ------------------------ */

#[post("/api/order/link")]
async fn order_link(payload: web::Json<OrderDraft>, state: web::Data<AppState>) -> impl Responder {
    let intent = match payload.into_inner().into_intent() {
        Ok(i) => i,
        Err(e) => {
            return HttpResponse::BadRequest().json(json!({ "ok": false, "error": e.to_string() }))
        }
    };
    let phone = state.config.whatsapp_phone.as_deref().unwrap_or_default();
    match build_link(phone, &intent) {
        Ok(link) => ok(link),
        Err(e @ OrderError::NoPhone) => {
            error!("order link requested but WHATSAPP_PHONE is not set");
            HttpResponse::InternalServerError().json(json!({ "ok": false, "error": e.to_string() }))
        }
        Err(e) => {
            HttpResponse::BadRequest().json(json!({ "ok": false, "error": e.to_string() }))
        }
    }
}

/* ------------------------ admin ------------------------ */

#[derive(Debug, Deserialize)]
struct AdminPostsQ {
    status: Option<PostStatus>,
    featured: Option<bool>,
    limit: Option<i64>,
}

#[get("/api/admin/posts")]
async fn admin_list_posts(
    req: HttpRequest,
    q: Query<AdminPostsQ>,
    state: web::Data<AppState>,
) -> impl Responder {
    if let Some(denied) = require_admin(&req, &state) {
        return denied;
    }
    let filter = PostFilter {
        status: q.status,
        featured: q.featured,
        limit: q.limit,
    };
    match state.blog.list(filter).await {
        Ok(v) => ok(v),
        Err(e) => store_failed(&e),
    }
}

#[post("/api/admin/posts")]
async fn admin_create_post(
    req: HttpRequest,
    payload: web::Json<NewBlogPost>,
    state: web::Data<AppState>,
) -> impl Responder {
    if let Some(denied) = require_admin(&req, &state) {
        return denied;
    }
    match state.blog.create(payload.into_inner()).await {
        Ok(post) => HttpResponse::Created().json(json!({ "ok": true, "data": post })),
        Err(e) => store_failed(&e),
    }
}

#[get("/api/admin/posts/{id}")]
async fn admin_get_post(
    req: HttpRequest,
    path: web::Path<i64>,
    state: web::Data<AppState>,
) -> impl Responder {
    if let Some(denied) = require_admin(&req, &state) {
        return denied;
    }
    match state.blog.get(path.into_inner()).await {
        Ok(Some(post)) => ok(post),
        Ok(None) => not_found("post"),
        Err(e) => store_failed(&e),
    }
}

#[put("/api/admin/posts/{id}")]
async fn admin_update_post(
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<BlogPostPatch>,
    state: web::Data<AppState>,
) -> impl Responder {
    if let Some(denied) = require_admin(&req, &state) {
        return denied;
    }
    match state.blog.update(path.into_inner(), payload.into_inner()).await {
        Ok(Some(post)) => ok(post),
        Ok(None) => not_found("post"),
        Err(e) => store_failed(&e),
    }
}

#[delete("/api/admin/posts/{id}")]
async fn admin_delete_post(
    req: HttpRequest,
    path: web::Path<i64>,
    state: web::Data<AppState>,
) -> impl Responder {
    if let Some(denied) = require_admin(&req, &state) {
        return denied;
    }
    match state.blog.delete(path.into_inner()).await {
        Ok(true) => HttpResponse::Ok().json(json!({ "ok": true })),
        Ok(false) => not_found("post"),
        Err(e) => store_failed(&e),
    }
}

#[get("/api/admin/stats")]
async fn admin_stats(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    if let Some(denied) = require_admin(&req, &state) {
        return denied;
    }
    match state.blog.stats().await {
        Ok(stats) => ok(stats),
        Err(e) => store_failed(&e),
    }
}

fn generate_failed(e: &GenerateError) -> HttpResponse {
    let body = json!({ "ok": false, "error": e.to_string(), "raw": e.raw() });
    match e {
        GenerateError::NoKeywords => HttpResponse::BadRequest().json(body),
        GenerateError::Upstream { .. } | GenerateError::Transport(_) => {
            error!(error=%e, "draft provider call failed");
            HttpResponse::BadGateway().json(body)
        }
        GenerateError::MissingApiKey => {
            error!("draft generation requested but GEMINI_API_KEY is not set");
            HttpResponse::InternalServerError().json(body)
        }
        GenerateError::MalformedProviderResponse { .. } | GenerateError::InvalidJson { .. } => {
            warn!(error=%e, "provider text could not be used as a draft");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

#[post("/api/admin/generate-blog")]
async fn generate_blog(
    req: HttpRequest,
    payload: web::Json<GenerateRequest>,
    state: web::Data<AppState>,
) -> impl Responder {
    if let Some(denied) = require_admin(&req, &state) {
        return denied;
    }
    let r = payload.into_inner();
    let draft = match state
        .generator
        .generate(&r.keywords, r.context.as_deref())
        .await
    {
        Ok(d) => d,
        Err(e) => return generate_failed(&e),
    };
    let Some(status) = r.status else {
        return ok(draft);
    };
    let post = draft.into_post(status, state.config.default_author.clone());
    match state.blog.create(post).await {
        Ok(post) => HttpResponse::Created().json(json!({ "ok": true, "data": post })),
        Err(e) => store_failed(&e),
    }
}

/* ------------------------ seo ------------------------ */

#[get("/sitemap.xml")]
async fn sitemap(state: web::Data<AppState>) -> impl Responder {
    let locations = match state.directory.all_paths().await {
        Ok(v) => v,
        Err(e) => {
            error!(error=?e, "sitemap: failed to list locations");
            Vec::new()
        }
    };
    let posts = state.blog.published(None, None).await;
    HttpResponse::Ok()
        .content_type("application/xml; charset=utf-8")
        .body(seo::sitemap_xml(&state.config.site_url, &locations, &posts))
}

#[get("/robots.txt")]
async fn robots(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(seo::robots_txt(&state.config.site_url))
}
