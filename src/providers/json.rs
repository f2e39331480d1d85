use super::Persistence;
use crate::error::Result;
use crate::store::CatalogImage;
use crate::utils::get_catalog_path;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Saves catalog images as JSON files
#[derive(Debug, Clone)]
pub struct JsonPersistence {
    path: PathBuf,
}

impl JsonPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `catalog.json` in the app data directory
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(get_catalog_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonPersistence {
    fn save(&self, image: &CatalogImage) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to a sibling then rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(fs::File::create(&tmp)?);
            serde_json::to_writer(&mut writer, image)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!("Saved {} entries to {}", image.entries.len(), self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Option<CatalogImage>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(fs::File::open(&self.path)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }
}
