use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::geocode::Coordinates;

/// Address to coordinates mapping persisted as one JSON object.
///
/// Loaded once per run and written back whole by [`AddressCache::flush`].
/// Entries are never removed.
#[derive(Debug)]
pub struct AddressCache {
    path: PathBuf,
    entries: BTreeMap<String, Coordinates>,
}

impl AddressCache {
    /// Load the cache at `path`. A missing or unreadable file yields an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(entries) => {
                debug!(path = %path.display(), entries = entries.len(), "loaded geocode cache");
                entries
            }
            Err(AppError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no geocode cache yet; starting empty");
                BTreeMap::new()
            }
            Err(err) => {
                warn!(?err, path = %path.display(), "failed to load geocode cache; starting empty");
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    pub fn get(&self, address: &str) -> AppResult<Coordinates> {
        self.entries
            .get(address)
            .copied()
            .ok_or_else(|| AppError::KeyNotFound(address.to_string()))
    }

    pub fn set(&mut self, address: impl Into<String>, coords: Coordinates) {
        self.entries.insert(address.into(), coords);
    }

    /// Replace the file with the current mapping. Writes a sibling temp file and
    /// renames it over the target so readers never see a partial file.
    pub fn flush(&self) -> AppResult<()> {
        let tmp_path = self.tmp_path();
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            serde_json::to_writer(&mut writer, &self.entries)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "flushed geocode cache");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "geocode.cache".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn read_entries(path: &Path) -> AppResult<BTreeMap<String, Coordinates>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
