//! Launcher settings.

mod loader;
mod schema;

pub use loader::{default_config_path, load_config, load_launcher_config, parse_config, CONFIG_ENV};
pub use schema::LauncherConfig;
