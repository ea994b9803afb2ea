use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "kurye-web", version, about = "Istanbul moto courier site backend")]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[command(flatten)]
    pub config: Config,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Load district GeoJSON and neighborhood fixtures into the store
    ImportLocations {
        districts: PathBuf,
        neighborhoods: PathBuf,
    },
    /// Notify search engines that the sitemap changed
    PingSitemap,
    /// Set the author name on every blog post
    SetAuthor { name: String },
}

#[derive(Serialize)]
pub struct JsonOut<T: Serialize> {
    pub ok: bool,
    pub data: T,
}

pub fn print_one<T: Serialize>(
    json: bool,
    data: T,
    row: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonOut { ok: true, data })?
        );
    } else {
        println!("{}", row(&data));
    }
    Ok(())
}
