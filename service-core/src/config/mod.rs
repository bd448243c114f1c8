use crate::error::AppError;
use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Locate the `config` directory of a service crate.
///
/// Works both when the process runs from the crate directory and from the
/// workspace root.
pub fn configuration_directory(base_path: &Path, crate_dir: &str) -> PathBuf {
    if base_path.ends_with(crate_dir) {
        base_path.join("config")
    } else {
        base_path.join(crate_dir).join("config")
    }
}

/// Load service settings from `config/base.yaml` overlaid by `APP_`-prefixed
/// environment variables (`APP_SERVER__PORT=9000`).
pub fn load_settings<T: DeserializeOwned>(crate_dir: &str) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let base_path = std::env::current_dir()?;
    let directory = configuration_directory(&base_path, crate_dir);
    load_settings_from(&directory.join("base.yaml"))
}

pub fn load_settings_from<T: DeserializeOwned>(file: &Path) -> Result<T, AppError> {
    let settings = Config::builder()
        .add_source(File::from(file).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}
