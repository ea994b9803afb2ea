use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use kurye_web::blog::BlogService;
use kurye_web::cli::{print_one, Cli, Commands};
use kurye_web::config::Config;
use kurye_web::generator::GeminiClient;
use kurye_web::map::GeoJsonMapRenderer;
use kurye_web::memory::MemoryStore;
use kurye_web::routes::{configure, AppState};
use kurye_web::store::{PgStore, Store};
use kurye_web::{import, seo};

async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    match config.pg_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url).await.context("pg pool init failed")?;
            info!("connected to Postgres");
            Ok(Arc::new(store))
        }
        None => {
            warn!("PG_URL not set, using in-memory store; nothing will persist");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let store = open_store(&config).await?;
    let provider = GeminiClient::new(
        config.gemini_api_key.clone(),
        &config.gemini_model,
        &config.gemini_base_url,
        config.gemini_timeout(),
    )?;
    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set, blog draft generation will fail");
    }
    if config.whatsapp_phone.is_none() {
        warn!("WHATSAPP_PHONE not set, order links will fail");
    }

    let addr = config.bind.clone();
    let workers = config.workers.max(1);
    let state = web::Data::new(AppState::new(
        store,
        Arc::new(provider),
        Arc::new(GeoJsonMapRenderer),
        config,
    ));

    info!("listening on {}", addr);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(&addr)?
    .workers(workers)
    .run()
    .await?;
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Logging goes to stderr so --json output stays parseable
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish()
        .try_init();

    let cli = Cli::parse();
    let json = cli.json;
    let config = cli.config;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::ImportLocations {
            districts,
            neighborhoods,
        } => {
            let store = open_store(&config).await?;
            let summary = import::import_files(store.as_ref(), &districts, &neighborhoods).await?;
            print_one(json, summary, |s| {
                format!(
                    "imported {} districts, {} neighborhoods ({} skipped)",
                    s.districts,
                    s.neighborhoods,
                    s.skipped.len()
                )
            })
        }
        Commands::PingSitemap => {
            let http = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(20))
                .build()?;
            let results = seo::ping_search_engines(&http, &config.site_url).await;
            print_one(json, results, |rs| {
                rs.iter()
                    .map(|r| match (r.status, &r.error) {
                        (Some(code), _) => format!("{} -> {}", r.endpoint, code),
                        (None, Some(e)) => format!("{} -> error: {}", r.endpoint, e),
                        (None, None) => format!("{} -> no response", r.endpoint),
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::SetAuthor { name } => {
            let store = open_store(&config).await?;
            let updated = BlogService::new(store).set_author_for_all(&name).await?;
            print_one(json, serde_json::json!({ "author": name, "updated": updated }), |v| {
                format!(
                    "set author {} on {} posts",
                    v["author"].as_str().unwrap_or_default(),
                    v["updated"]
                )
            })
        }
    }
}
