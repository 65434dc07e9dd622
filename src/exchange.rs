use crate::model::GrooveRecord;
use crate::storage::{KeyValueStore, RecordStore, StoreError};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const EXPORT_FILE_NAME: &str = "grooves.json";

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("could not read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("the file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid file format: upload a JSON array of grooves")]
    Format,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Pretty-printed JSON for the whole collection, regardless of filters.
/// Entries go out exactly as they would be stored.
pub fn export_all(records: &[GrooveRecord]) -> Result<String, serde_json::Error> {
    let elements = records
        .iter()
        .map(GrooveRecord::to_stored)
        .collect::<Result<Vec<_>, _>>()?;
    serde_json::to_string_pretty(&elements)
}

/// Writes `grooves.json` into `dir` and returns the written path.
pub fn export_to_dir(records: &[GrooveRecord], dir: &Path) -> anyhow::Result<PathBuf> {
    let document = export_all(records).context("serializing grooves")?;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(EXPORT_FILE_NAME);
    fs::write(&path, document).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), count = records.len(), "exported grooves");
    Ok(path)
}

/// Replaces the entire collection with `document`, which must be a JSON
/// array. Elements are stored as given. Nothing is written on failure.
pub fn import_all<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    document: &str,
) -> Result<usize, ImportError> {
    let value: serde_json::Value = serde_json::from_str(document).map_err(|err| {
        warn!(error = %err, "import is not valid JSON");
        ImportError::Parse(err)
    })?;
    let count = match value.as_array() {
        Some(elements) => elements.len(),
        None => {
            warn!("import is not a JSON array");
            return Err(ImportError::Format);
        }
    };
    store.replace_raw_records(&value)?;
    info!(count, "imported grooves");
    Ok(count)
}

/// Reads `path`, then imports it. The read is the only step that can wait.
pub fn import_file<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    path: &Path,
) -> Result<usize, ImportError> {
    let document = fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    import_all(store, &document)
}
