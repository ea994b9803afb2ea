pub mod blog;
pub mod cli;
pub mod config;
pub mod directory;
pub mod generator;
pub mod import;
pub mod map;
pub mod memory;
pub mod order;
pub mod routes;
pub mod seo;
pub mod slug;
pub mod store;
pub mod types;
