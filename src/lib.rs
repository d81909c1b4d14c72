//! media-relay: resolves media metadata and relays renditions from yt-dlp
//! to HTTP clients without storing them.

pub mod config;
pub mod downloader;
pub mod server;

pub use config::{load_config, load_config_or_default, Config};
pub use server::{build_router, serve, AppContext};
