//! JSON persistence for datasets and policy checkpoints
//!
//! Every save goes through [`atomic_write`]: readers never observe a partially
//! written file.

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::CadenceError;
use crate::pipeline::FeatureDataset;
use crate::policy::PolicyCheckpoint;

/// Write `data` to `path` atomically.
///
/// The bytes go to a uniquely named temp file in the same directory, which is
/// synced and then renamed over the target, so concurrent writers to one path
/// never share a temp file. Missing parent directories are created.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), CadenceError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    if path.file_name().is_none() {
        return Err(CadenceError::data(format!("not a file path: {}", path.display())));
    }

    let mut temp = NamedTempFile::new_in(&parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    // A failed persist drops the temp file, which removes it
    temp.persist(path).map_err(|e| e.error)?;

    debug!("wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CadenceError> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, CadenceError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn save_dataset(path: &Path, dataset: &FeatureDataset) -> Result<(), CadenceError> {
    save_json(path, dataset)
}

pub fn load_dataset(path: &Path) -> Result<FeatureDataset, CadenceError> {
    load_json(path)
}

pub fn save_checkpoint(path: &Path, checkpoint: &PolicyCheckpoint) -> Result<(), CadenceError> {
    save_json(path, checkpoint)
}

pub fn load_checkpoint(path: &Path) -> Result<PolicyCheckpoint, CadenceError> {
    load_json(path)
}
