//! Driver that persists each entity to its own JSON file
//!
//! Files live under `<root>/<keyspace digest>/<key digest>.json`. Writes go to
//! a temporary file in the same directory which is then renamed into place, so
//! readers only ever see complete files. Both directory and file names are full
//! SHA-256 digests.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{Driver, Lookup};
use crate::entity::Entity;
use crate::error::DriverError;
use crate::key::{CacheKey, Keyspace};

/// On-disk wrapper; the key is stored so digest collisions read as a miss
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    key: CacheKey,
    entity: Entity,
}

/// Stores entities as JSON files under a root directory
///
/// The default root is the XDG cache directory (`~/.cache/repocache/` on
/// Linux). Missing and unparsable files both read as [`Lookup::Miss`].
#[derive(Debug, Clone)]
pub struct FileDriver {
    root: PathBuf,
}

impl FileDriver {
    /// Creates a FileDriver rooted in the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "repocache")?;
        Some(Self::with_dir(project_dirs.cache_dir()))
    }

    /// Creates a FileDriver with a custom root directory
    pub fn with_dir(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn keyspace_dir(&self, keyspace: &Keyspace) -> PathBuf {
        self.root.join(digest(keyspace.as_str()))
    }

    /// Returns the path of the file holding `key`
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.keyspace_dir(key.keyspace())
            .join(format!("{}.json", digest(&key.to_string())))
    }
}

fn digest(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Writes `contents` next to `path` and renames it into place
///
/// A concurrent `clear` can remove `dir` mid-write; the write is retried once
/// with the directory recreated.
fn write_atomically(dir: &Path, path: &Path, contents: &[u8]) -> Result<(), DriverError> {
    match write_once(dir, path, contents) {
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Keyspace directory removed during write; retrying");
            write_once(dir, path, contents)?;
        }
        result => result?,
    }
    Ok(())
}

fn write_once(dir: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".entry-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[async_trait]
impl Driver for FileDriver {
    fn name(&self) -> &str {
        "file"
    }

    async fn set(&self, key: &CacheKey, entity: Entity) -> Result<(), DriverError> {
        let file = CacheFile {
            key: key.clone(),
            entity,
        };
        let json = serde_json::to_string_pretty(&file)?;
        let dir = self.keyspace_dir(key.keyspace());
        let path = self.entry_path(key);

        tokio::task::spawn_blocking(move || write_atomically(&dir, &path, json.as_bytes()))
            .await??;
        Ok(())
    }

    async fn get(&self, key: &CacheKey) -> Result<Lookup, DriverError> {
        let path = self.entry_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Lookup::Miss),
            Err(err) => return Err(err.into()),
        };

        let file: CacheFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Unparsable cache file; treating as a miss"
                );
                return Ok(Lookup::Miss);
            }
        };

        if &file.key != key {
            debug!(
                path = %path.display(),
                stored = %file.key,
                requested = %key,
                "Cache file belongs to a different key"
            );
            return Ok(Lookup::Miss);
        }

        Ok(Lookup::Hit(file.entity))
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), DriverError> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn clear(&self, keyspace: &Keyspace) -> Result<(), DriverError> {
        match tokio::fs::remove_dir_all(self.keyspace_dir(keyspace)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
