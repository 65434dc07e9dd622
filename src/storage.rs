use crate::model::GrooveRecord;
use std::collections::BTreeMap;
#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const GROOVES_KEY: &str = "grooves";
pub const GOAL_NOTE_KEY: &str = "note";
pub const SHOW_ONLY_INCOMPLETE_KEY: &str = "showOnlyIncomplete";
pub const SELECTED_TAG_KEY: &str = "selectedTag";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("store file {path:?} is not a valid key/value map: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("stored value under {key:?} is not valid JSON: {source}")]
    Json {
        key: &'static str,
        source: serde_json::Error,
    },
    #[error("stored value under {0:?} is not a JSON array")]
    Corrupt(&'static str),
}

/// String-keyed, string-valued persistence, scoped to one user.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// The whole map lives in one YAML file, rewritten on every `set`.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = if path.exists() {
            let data = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            if data.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_yaml::from_str(&data).map_err(|source| StoreError::Yaml {
                    path: path.clone(),
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };
        info!(path = %path.display(), keys = entries.len(), "opened store");
        Ok(FileStore { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized = serde_yaml::to_string(&self.entries).map_err(|source| StoreError::Yaml {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, serialized).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()?;
        debug!(key, bytes = value.len(), "wrote store key");
        Ok(())
    }
}

#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Typed access to the groove collection and the scalar preferences.
#[derive(Debug)]
pub struct RecordStore<S> {
    inner: S,
}

impl<S: KeyValueStore> RecordStore<S> {
    pub fn new(inner: S) -> Self {
        RecordStore { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn load_records(&self) -> Result<Vec<GrooveRecord>, StoreError> {
        let raw = match self.inner.get(GROOVES_KEY)? {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(Vec::new()),
        };
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| StoreError::Json {
                key: GROOVES_KEY,
                source,
            })?;
        let elements = match value {
            serde_json::Value::Array(elements) => elements,
            _ => return Err(StoreError::Corrupt(GROOVES_KEY)),
        };
        let records: Vec<GrooveRecord> = elements
            .into_iter()
            .enumerate()
            .map(|(idx, element)| {
                let record = GrooveRecord::from_stored(element);
                if !record.is_readable() {
                    warn!(index = idx, "stored entry is not a readable groove, keeping it as-is");
                }
                record
            })
            .collect();
        debug!(count = records.len(), "loaded grooves");
        Ok(records)
    }

    /// Unreadable entries and unknown fields of loaded records are written
    /// back as they were found.
    pub fn save_records(&mut self, records: &[GrooveRecord]) -> Result<(), StoreError> {
        let elements = records
            .iter()
            .map(GrooveRecord::to_stored)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| StoreError::Json {
                key: GROOVES_KEY,
                source,
            })?;
        let serialized = serde_json::to_string(&elements).map_err(|source| StoreError::Json {
            key: GROOVES_KEY,
            source,
        })?;
        self.inner.set(GROOVES_KEY, &serialized)?;
        info!(count = records.len(), "saved grooves");
        Ok(())
    }

    /// Writes an already-validated JSON array verbatim.
    pub fn replace_raw_records(&mut self, array: &serde_json::Value) -> Result<(), StoreError> {
        if !array.is_array() {
            return Err(StoreError::Corrupt(GROOVES_KEY));
        }
        let serialized = serde_json::to_string(array).map_err(|source| StoreError::Json {
            key: GROOVES_KEY,
            source,
        })?;
        self.inner.set(GROOVES_KEY, &serialized)
    }

    pub fn goal_note(&self) -> Result<String, StoreError> {
        Ok(self.inner.get(GOAL_NOTE_KEY)?.unwrap_or_default())
    }

    pub fn set_goal_note(&mut self, note: &str) -> Result<(), StoreError> {
        self.inner.set(GOAL_NOTE_KEY, note)
    }

    pub fn show_only_incomplete(&self) -> Result<bool, StoreError> {
        Ok(self.inner.get(SHOW_ONLY_INCOMPLETE_KEY)?.as_deref() == Some("true"))
    }

    pub fn set_show_only_incomplete(&mut self, value: bool) -> Result<(), StoreError> {
        self.inner
            .set(SHOW_ONLY_INCOMPLETE_KEY, if value { "true" } else { "false" })
    }

    pub fn selected_tag(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .inner
            .get(SELECTED_TAG_KEY)?
            .filter(|tag| !tag.is_empty()))
    }

    pub fn set_selected_tag(&mut self, tag: Option<&str>) -> Result<(), StoreError> {
        self.inner.set(SELECTED_TAG_KEY, tag.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::empty_slots;
    use pretty_assertions::assert_eq;

    fn record(id: &str) -> GrooveRecord {
        GrooveRecord::new(
            id.into(),
            format!("title {id}"),
            String::new(),
            String::new(),
            vec!["jazz".into()],
            empty_slots(),
        )
    }

    #[test]
    fn missing_keys_load_as_defaults() {
        let store = RecordStore::new(MemoryStore::default());
        assert!(store.load_records().expect("load").is_empty());
        assert_eq!(store.goal_note().expect("note"), "");
        assert!(!store.show_only_incomplete().expect("flag"));
        assert_eq!(store.selected_tag().expect("tag"), None);
    }

    #[test]
    fn preferences_use_string_layout() {
        let mut store = RecordStore::new(MemoryStore::default());
        store.set_show_only_incomplete(true).expect("flag");
        store.set_selected_tag(Some("jazz")).expect("tag");
        store.set_goal_note("play along at 120bpm").expect("note");
        assert_eq!(
            store.inner().get(SHOW_ONLY_INCOMPLETE_KEY).expect("get").as_deref(),
            Some("true")
        );
        assert_eq!(store.selected_tag().expect("tag").as_deref(), Some("jazz"));

        store.set_selected_tag(None).expect("clear tag");
        assert_eq!(
            store.inner().get(SELECTED_TAG_KEY).expect("get").as_deref(),
            Some("")
        );
        assert_eq!(store.selected_tag().expect("tag"), None);
    }

    #[test]
    fn unreadable_elements_survive_a_save() {
        let mut inner = MemoryStore::default();
        inner
            .set(GROOVES_KEY, r#"[{"id":"a","title":"Swing"},42,{"title":"no id"}]"#)
            .expect("set");
        let mut store = RecordStore::new(inner);
        let records = store.load_records().expect("load");
        assert_eq!(records.len(), 3);
        let readable: Vec<_> = records.iter().filter(|r| r.is_readable()).collect();
        assert_eq!(readable.len(), 1);
        assert_eq!(readable[0].id, "a");

        store.save_records(&records).expect("save");
        let raw = store.inner().get(GROOVES_KEY).expect("get").expect("present");
        let stored: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(
            stored,
            serde_json::json!([{"id": "a", "title": "Swing"}, 42, {"title": "no id"}])
        );
    }

    #[test]
    fn non_array_collection_is_corrupt() {
        let mut inner = MemoryStore::default();
        inner.set(GROOVES_KEY, r#"{"id":"a"}"#).expect("set");
        let store = RecordStore::new(inner);
        assert!(matches!(
            store.load_records(),
            Err(StoreError::Corrupt(GROOVES_KEY))
        ));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("store.yml");
        let mut store = RecordStore::new(FileStore::open(&path).expect("open"));
        store
            .save_records(&[record("a"), record("b")])
            .expect("save");
        store.set_goal_note("metronome").expect("note");

        let reopened = RecordStore::new(FileStore::open(&path).expect("reopen"));
        let ids: Vec<_> = reopened
            .load_records()
            .expect("load")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(reopened.goal_note().expect("note"), "metronome");
    }
}
