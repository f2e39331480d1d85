use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::PathBuf;

const APP_NAME: &str = "fnx";
const CONFIG_FILE: &str = "config.toml";
const CATALOG_FILE: &str = "catalog.json";

/// Get the application data directory, creating it if needed
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.ok_or_else(|| {
        Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            "could not determine app data directory",
        ))
    })?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Location of the optional `config.toml`
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_app_data_dir()?.join(CONFIG_FILE))
}

/// Default location of the persisted catalog image
pub fn get_catalog_path() -> Result<PathBuf> {
    Ok(get_app_data_dir()?.join(CATALOG_FILE))
}
