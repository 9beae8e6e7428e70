use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{StoreError, StoreResult, UnlinkedDataStore, UnlinkedMetadata, UnlinkedSnapshot};
use crate::constants::{UNLINKED_DATA_DIR, UNLINKED_METADATA_FILE};
use crate::types::Batch;

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("static pattern"));

/// Filesystem store rooted at a data directory:
///
/// ```text
/// <root>/unlinked-data.json        slot -> metadata, rewritten on flush
/// <root>/unlinked/<slug>.<hash>.json  one batch per slot
/// ```
pub struct FsUnlinkedStore {
    root: PathBuf,
    metadata: Mutex<BTreeMap<String, UnlinkedMetadata>>,
}

impl FsUnlinkedStore {
    /// Open (or create) a store, reading any metadata already flushed there.
    pub fn open<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(UNLINKED_DATA_DIR))?;

        let metadata_path = root.join(UNLINKED_METADATA_FILE);
        let metadata = if metadata_path.exists() {
            serde_json::from_str(&fs::read_to_string(&metadata_path)?)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            root,
            metadata: Mutex::new(metadata),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, UnlinkedMetadata>> {
        self.metadata.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of the batch file for `slot`
    pub fn data_path(&self, slot: &str) -> PathBuf {
        self.root
            .join(UNLINKED_DATA_DIR)
            .join(format!("{}.json", safe_filename(slot)))
    }
}

/// Slot names are free text; file names are a slug plus a short hash so two
/// names with the same slug still land in different files.
pub fn safe_filename(slot: &str) -> String {
    let slug = UNSAFE_CHARS.replace_all(slot.trim(), "_");
    let digest = hex::encode(Sha256::digest(slot.as_bytes()));
    format!("{}.{}", slug.trim_matches('_'), &digest[..8])
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

impl UnlinkedDataStore for FsUnlinkedStore {
    fn contains(&self, slot: &str) -> bool {
        self.lock().contains_key(slot)
    }

    fn register(&self, slot: &str) -> StoreResult<()> {
        {
            let mut metadata = self.lock();
            if metadata.contains_key(slot) {
                return Err(StoreError::AlreadyRegistered(slot.to_string()));
            }
            metadata.insert(slot.to_string(), UnlinkedMetadata::now(Vec::new()));
        }
        debug!("Registered unlinked slot: {}", slot);
        self.flush()
    }

    fn set_metadata(&self, slot: &str, value: UnlinkedMetadata) -> StoreResult<()> {
        let mut metadata = self.lock();
        match metadata.get_mut(slot) {
            Some(entry) => {
                *entry = value;
                Ok(())
            }
            None => Err(StoreError::NotRegistered(slot.to_string())),
        }
    }

    fn metadata(&self, slot: &str) -> Option<UnlinkedMetadata> {
        self.lock().get(slot).cloned()
    }

    fn flush(&self) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(&*self.lock())?;
        write_atomic(&self.root.join(UNLINKED_METADATA_FILE), &bytes)?;
        Ok(())
    }

    fn write(&self, slot: &str, data: &Batch) -> StoreResult<()> {
        if !self.contains(slot) {
            return Err(StoreError::NotRegistered(slot.to_string()));
        }
        let path = self.data_path(slot);
        write_atomic(&path, &serde_json::to_vec(data)?)?;
        debug!("Wrote {} datasets to {}", data.len(), path.display());
        Ok(())
    }

    fn load(&self, slot: &str) -> StoreResult<Option<UnlinkedSnapshot>> {
        let Some(metadata) = self.metadata(slot) else {
            return Ok(None);
        };
        let path = self.data_path(slot);
        if !path.exists() {
            return Ok(None);
        }
        let data: Batch = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(Some(UnlinkedSnapshot { metadata, data }))
    }

    fn list(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}
