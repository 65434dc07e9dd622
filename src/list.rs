use crate::model::{check_progress, GrooveError, GrooveRecord};
use crate::storage::{KeyValueStore, RecordStore, StoreError};
use crate::tags::compute_tags;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Accepted,
    Declined,
}

#[derive(thiserror::Error, Debug)]
pub enum ListError {
    #[error(transparent)]
    Groove(#[from] GrooveError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The filtered view over the whole collection, plus the preferences that
/// drive it. Every change recomputes the tag index and the displayed rows
/// from scratch.
#[derive(Debug, Clone, Default)]
pub struct ListView {
    records: Vec<GrooveRecord>,
    all_tags: Vec<String>,
    displayed: Vec<usize>,
    filter_text: String,
    selected_tag: Option<String>,
    show_only_incomplete: bool,
    goal_note: String,
}

impl ListView {
    pub fn load<S: KeyValueStore>(store: &RecordStore<S>) -> Result<Self, StoreError> {
        let mut view = ListView {
            selected_tag: store.selected_tag()?,
            show_only_incomplete: store.show_only_incomplete()?,
            goal_note: store.goal_note()?,
            ..ListView::default()
        };
        view.reload(store)?;
        Ok(view)
    }

    /// Re-reads the collection, e.g. after an import replaced it.
    pub fn reload<S: KeyValueStore>(&mut self, store: &RecordStore<S>) -> Result<(), StoreError> {
        self.records = store.load_records()?;
        self.refresh();
        Ok(())
    }

    pub fn records(&self) -> &[GrooveRecord] {
        &self.records
    }

    pub fn all_tags(&self) -> &[String] {
        &self.all_tags
    }

    pub fn displayed(&self) -> impl Iterator<Item = &GrooveRecord> + '_ {
        self.displayed.iter().map(|&idx| &self.records[idx])
    }

    pub fn displayed_len(&self) -> usize {
        self.displayed.len()
    }

    pub fn displayed_at(&self, row: usize) -> Option<&GrooveRecord> {
        self.displayed.get(row).map(|&idx| &self.records[idx])
    }

    pub fn find(&self, id: &str) -> Option<&GrooveRecord> {
        self.records.iter().find(|r| r.is_readable() && r.id == id)
    }

    /// Stored entries kept as-is because they are not readable grooves.
    pub fn unreadable_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_readable()).count()
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn selected_tag(&self) -> Option<&str> {
        self.selected_tag.as_deref()
    }

    pub fn show_only_incomplete(&self) -> bool {
        self.show_only_incomplete
    }

    pub fn goal_note(&self) -> &str {
        &self.goal_note
    }

    // The search text has no stored preference; it only lives for the session.
    pub fn set_filter_text(&mut self, text: impl Into<String>) {
        self.filter_text = text.into();
        self.apply_filter();
    }

    pub fn set_selected_tag<S: KeyValueStore>(
        &mut self,
        store: &mut RecordStore<S>,
        tag: Option<&str>,
    ) -> Result<(), StoreError> {
        let tag = tag.filter(|t| !t.is_empty());
        store.set_selected_tag(tag)?;
        self.selected_tag = tag.map(str::to_string);
        self.apply_filter();
        Ok(())
    }

    pub fn set_show_only_incomplete<S: KeyValueStore>(
        &mut self,
        store: &mut RecordStore<S>,
        value: bool,
    ) -> Result<(), StoreError> {
        store.set_show_only_incomplete(value)?;
        self.show_only_incomplete = value;
        self.apply_filter();
        Ok(())
    }

    /// Moves incomplete grooves ahead of complete ones in the stored
    /// collection, keeping relative order inside each group.
    pub fn sort_by_complete<S: KeyValueStore>(
        &mut self,
        store: &mut RecordStore<S>,
    ) -> Result<(), StoreError> {
        let mut sorted = self.records.clone();
        sorted.sort_by_key(GrooveRecord::is_complete);
        store.save_records(&sorted)?;
        info!(count = sorted.len(), "sorted grooves by completion");
        self.records = sorted;
        self.refresh();
        Ok(())
    }

    /// Every groove carrying `id` gets the new level; returns `false` when
    /// none does. `date` is left alone.
    pub fn set_progress<S: KeyValueStore>(
        &mut self,
        store: &mut RecordStore<S>,
        id: &str,
        level: u8,
    ) -> Result<bool, ListError> {
        let level = check_progress(level)?;
        if self.find(id).is_none() {
            debug!(id, "progress change for unknown groove");
            return Ok(false);
        }
        let mut updated = self.records.clone();
        for record in updated
            .iter_mut()
            .filter(|r| r.is_readable() && r.id == id)
        {
            record.progress = level;
        }
        store.save_records(&updated)?;
        info!(id, level, "set progress");
        self.records = updated;
        self.refresh();
        Ok(true)
    }

    /// Removes every groove carrying `id`; returns whether any was removed.
    pub fn delete_record<S: KeyValueStore>(
        &mut self,
        store: &mut RecordStore<S>,
        id: &str,
        confirmation: Confirmation,
    ) -> Result<bool, StoreError> {
        if confirmation == Confirmation::Declined {
            debug!(id, "delete declined");
            return Ok(false);
        }
        let remaining: Vec<GrooveRecord> = self
            .records
            .iter()
            .filter(|r| !r.is_readable() || r.id != id)
            .cloned()
            .collect();
        if remaining.len() == self.records.len() {
            return Ok(false);
        }
        store.save_records(&remaining)?;
        info!(id, "deleted groove");
        self.records = remaining;
        self.refresh();
        Ok(true)
    }

    pub fn set_goal_note_text(&mut self, text: impl Into<String>) {
        self.goal_note = text.into();
    }

    /// Persists the goal note; an empty note is not saved.
    pub fn save_goal_note<S: KeyValueStore>(
        &mut self,
        store: &mut RecordStore<S>,
    ) -> Result<bool, StoreError> {
        if self.goal_note.is_empty() {
            return Ok(false);
        }
        store.set_goal_note(&self.goal_note)?;
        info!("saved goal note");
        Ok(true)
    }

    pub fn clear_goal_note<S: KeyValueStore>(
        &mut self,
        store: &mut RecordStore<S>,
        confirmation: Confirmation,
    ) -> Result<bool, StoreError> {
        if self.goal_note.is_empty() || confirmation == Confirmation::Declined {
            return Ok(false);
        }
        store.set_goal_note("")?;
        self.goal_note.clear();
        info!("cleared goal note");
        Ok(true)
    }

    fn refresh(&mut self) {
        self.all_tags = compute_tags(&self.records);
        self.apply_filter();
    }

    fn apply_filter(&mut self) {
        let needle = self.filter_text.to_lowercase();
        self.displayed = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                matches_filter(
                    record,
                    &needle,
                    self.selected_tag.as_deref(),
                    self.show_only_incomplete,
                )
            })
            .map(|(idx, _)| idx)
            .collect();
        debug!(
            shown = self.displayed.len(),
            total = self.records.len(),
            "recomputed displayed grooves"
        );
    }
}

/// `needle` must already be lowercased.
fn matches_filter(
    record: &GrooveRecord,
    needle: &str,
    tag: Option<&str>,
    only_incomplete: bool,
) -> bool {
    let text_hit = record.title.to_lowercase().contains(needle)
        || record.artist.to_lowercase().contains(needle);
    let tag_hit = tag.map_or(true, |tag| record.tags.iter().any(|t| t == tag));
    let progress_hit = !only_incomplete || !record.is_complete();
    record.is_readable() && text_hit && tag_hit && progress_hit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::empty_slots;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn groove(id: &str, title: &str, artist: &str, tags: &[&str], progress: u8) -> GrooveRecord {
        let mut record = GrooveRecord::new(
            id.into(),
            title.into(),
            artist.into(),
            String::new(),
            tags.iter().map(|t| t.to_string()).collect(),
            empty_slots(),
        );
        record.progress = progress;
        record
    }

    fn seeded(records: &[GrooveRecord]) -> (RecordStore<MemoryStore>, ListView) {
        let mut store = RecordStore::new(MemoryStore::default());
        store.save_records(records).expect("seed");
        let view = ListView::load(&store).expect("load");
        (store, view)
    }

    fn shown(view: &ListView) -> Vec<String> {
        view.displayed().map(|r| r.id.clone()).collect()
    }

    fn stored_ids(store: &RecordStore<MemoryStore>) -> Vec<String> {
        store
            .load_records()
            .expect("load")
            .into_iter()
            .map(|r| r.id)
            .collect()
    }

    #[test]
    fn filters_compose() {
        let (mut store, mut view) = seeded(&[
            groove("A", "Swing", "", &["jazz"], 3),
            groove("B", "Funk", "", &["jazz"], 5),
        ]);
        assert_eq!(shown(&view), vec!["A", "B"]);

        view.set_filter_text("Sw");
        assert_eq!(shown(&view), vec!["A"]);
        view.set_show_only_incomplete(&mut store, true).expect("toggle");
        assert_eq!(shown(&view), vec!["A"]);

        view.set_filter_text("");
        view.set_show_only_incomplete(&mut store, false).expect("toggle");
        view.set_selected_tag(&mut store, Some("jazz")).expect("tag");
        assert_eq!(shown(&view), vec!["A", "B"]);

        view.set_show_only_incomplete(&mut store, true).expect("toggle");
        assert_eq!(shown(&view), vec!["A"]);
    }

    #[test]
    fn text_filter_matches_artist_case_insensitively() {
        let (_, mut view) = seeded(&[
            groove("a", "Chameleon", "Herbie Hancock", &[], 1),
            groove("b", "Spain", "Chick Corea", &[], 1),
        ]);
        view.set_filter_text("HERBIE");
        assert_eq!(shown(&view), vec!["a"]);
        view.set_filter_text("a");
        assert_eq!(shown(&view), vec!["a", "b"]);
    }

    #[test]
    fn preferences_persist_and_reload() {
        let (mut store, mut view) = seeded(&[groove("a", "Swing", "", &["jazz"], 1)]);
        view.set_selected_tag(&mut store, Some("jazz")).expect("tag");
        view.set_show_only_incomplete(&mut store, true).expect("toggle");
        view.set_filter_text("sw");

        let reloaded = ListView::load(&store).expect("load");
        assert_eq!(reloaded.selected_tag(), Some("jazz"));
        assert!(reloaded.show_only_incomplete());
        assert_eq!(reloaded.filter_text(), "");

        view.set_selected_tag(&mut store, None).expect("clear");
        assert_eq!(store.selected_tag().expect("tag"), None);
    }

    #[test]
    fn sort_by_complete_is_stable_and_persisted() {
        let (mut store, mut view) = seeded(&[
            groove("w", "W", "", &[], 5),
            groove("x", "X", "", &[], 3),
            groove("y", "Y", "", &[], 5),
            groove("z", "Z", "", &[], 1),
        ]);
        view.sort_by_complete(&mut store).expect("sort");
        assert_eq!(shown(&view), vec!["x", "z", "w", "y"]);
        assert_eq!(stored_ids(&store), vec!["x", "z", "w", "y"]);
    }

    #[test]
    fn set_progress_updates_one_record_without_touching_date() {
        let seed = groove("a", "Swing", "", &[], 2);
        let (mut store, mut view) = seeded(&[seed.clone(), groove("b", "Funk", "", &[], 1)]);
        view.set_show_only_incomplete(&mut store, true).expect("toggle");

        assert!(view.set_progress(&mut store, "a", 5).expect("progress"));
        assert_eq!(shown(&view), vec!["b"]);

        let stored = store.load_records().expect("load");
        assert_eq!(stored[0].progress, 5);
        assert_eq!(stored[0].date, seed.date);
        assert_eq!(stored[1].progress, 1);
    }

    #[test]
    fn set_progress_rejects_bad_levels_and_ignores_unknown_ids() {
        let (mut store, mut view) = seeded(&[groove("a", "Swing", "", &[], 2)]);
        assert!(matches!(
            view.set_progress(&mut store, "a", 6),
            Err(ListError::Groove(GrooveError::InvalidProgress(6)))
        ));
        assert!(!view.set_progress(&mut store, "missing", 3).expect("noop"));
        assert_eq!(store.load_records().expect("load")[0].progress, 2);
    }

    #[test]
    fn delete_needs_confirmation() {
        let (mut store, mut view) = seeded(&[
            groove("a", "Swing", "", &["jazz"], 1),
            groove("b", "Funk", "", &["funk"], 1),
        ]);
        assert!(!view
            .delete_record(&mut store, "a", Confirmation::Declined)
            .expect("decline"));
        assert_eq!(stored_ids(&store), vec!["a", "b"]);

        assert!(view
            .delete_record(&mut store, "a", Confirmation::Accepted)
            .expect("accept"));
        assert_eq!(stored_ids(&store), vec!["b"]);
        assert_eq!(shown(&view), vec!["b"]);
        assert_eq!(view.all_tags(), ["funk"]);
    }

    fn import(store: &mut RecordStore<MemoryStore>, document: &str) -> ListView {
        let value: serde_json::Value = serde_json::from_str(document).expect("json");
        store.replace_raw_records(&value).expect("import");
        ListView::load(store).expect("load")
    }

    fn stored_json(store: &RecordStore<MemoryStore>) -> serde_json::Value {
        let raw = store
            .inner()
            .get(crate::storage::GROOVES_KEY)
            .expect("get")
            .expect("present");
        serde_json::from_str(&raw).expect("json")
    }

    #[test]
    fn imported_entries_survive_later_mutations() {
        let mut store = RecordStore::new(MemoryStore::default());
        let mut view = import(
            &mut store,
            r#"[
                {"id": "a", "title": "Swing", "progress": 2},
                {"id": "b", "title": "Funk", "artist": null, "progress": 5},
                {"id": "c", "title": "Samba", "date": "2024-05-01", "bpm": 96},
                "stray"
            ]"#,
        );
        assert_eq!(shown(&view), vec!["a", "b", "c"]);
        assert_eq!(view.unreadable_count(), 1);

        assert!(view.set_progress(&mut store, "a", 4).expect("progress"));
        assert_eq!(
            stored_json(&store),
            serde_json::json!([
                {"id": "a", "title": "Swing", "progress": 4},
                {"id": "b", "title": "Funk", "artist": null, "progress": 5},
                {"id": "c", "title": "Samba", "date": "2024-05-01", "bpm": 96},
                "stray"
            ])
        );

        view.sort_by_complete(&mut store).expect("sort");
        assert!(view
            .delete_record(&mut store, "a", Confirmation::Accepted)
            .expect("delete"));
        assert_eq!(
            stored_json(&store),
            serde_json::json!([
                {"id": "c", "title": "Samba", "date": "2024-05-01", "bpm": 96},
                "stray",
                {"id": "b", "title": "Funk", "artist": null, "progress": 5}
            ])
        );
    }

    #[test]
    fn duplicate_ids_are_all_affected() {
        let mut store = RecordStore::new(MemoryStore::default());
        let mut view = import(
            &mut store,
            r#"[
                {"id": "d", "title": "First"},
                {"id": "e", "title": "Other"},
                {"id": "d", "title": "Second"}
            ]"#,
        );
        assert!(view.set_progress(&mut store, "d", 3).expect("progress"));
        let levels: Vec<u8> = store
            .load_records()
            .expect("load")
            .iter()
            .map(|r| r.progress)
            .collect();
        assert_eq!(levels, vec![3, 1, 3]);

        assert!(view
            .delete_record(&mut store, "d", Confirmation::Accepted)
            .expect("delete"));
        assert_eq!(stored_ids(&store), vec!["e"]);
    }

    #[test]
    fn tag_index_follows_collection() {
        let (mut store, view) = seeded(&[
            groove("a", "Swing", "", &["jazz", "swing"], 1),
            groove("b", "Funk", "", &["funk", "jazz"], 1),
        ]);
        assert_eq!(view.all_tags(), ["jazz", "swing", "funk"]);

        store
            .save_records(&[groove("c", "Samba", "", &["latin"], 1)])
            .expect("replace");
        let mut view = view;
        view.reload(&store).expect("reload");
        assert_eq!(view.all_tags(), ["latin"]);
    }

    #[test]
    fn goal_note_saves_only_when_non_empty_and_clears_on_confirmation() {
        let (mut store, mut view) = seeded(&[]);
        assert!(!view.save_goal_note(&mut store).expect("empty"));

        view.set_goal_note_text("clean sixteenths at 90");
        assert!(view.save_goal_note(&mut store).expect("save"));
        assert_eq!(store.goal_note().expect("note"), "clean sixteenths at 90");

        assert!(!view
            .clear_goal_note(&mut store, Confirmation::Declined)
            .expect("decline"));
        assert_eq!(view.goal_note(), "clean sixteenths at 90");

        assert!(view
            .clear_goal_note(&mut store, Confirmation::Accepted)
            .expect("clear"));
        assert_eq!(view.goal_note(), "");
        assert_eq!(store.goal_note().expect("note"), "");
    }
}
