use crate::links::is_valid_url;
use crate::model::{empty_slots, generate_id, GrooveError, GrooveId, GrooveRecord, Link, LINK_SLOTS};
use crate::storage::{KeyValueStore, RecordStore, StoreError};
use chrono::Utc;
use tracing::{debug, info};

pub const INVALID_URL_MESSAGE: &str = "invalid URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit { id: GrooveId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkField {
    Name,
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Title empty or a link slot invalid; nothing was written.
    Rejected,
    Created(GrooveId),
    Updated(GrooveId),
}

#[derive(thiserror::Error, Debug)]
pub enum FormError {
    #[error("no groove was selected for editing")]
    MissingReference,
    #[error(transparent)]
    Groove(#[from] GrooveError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// In-progress values for one groove, shared by the create and edit flows.
#[derive(Debug, Clone)]
pub struct GrooveForm {
    mode: FormMode,
    title: String,
    artist: String,
    note: String,
    tag_input: String,
    tags: Vec<String>,
    links: [Link; LINK_SLOTS],
    url_errors: [Option<&'static str>; LINK_SLOTS],
    can_submit: bool,
}

impl GrooveForm {
    pub fn create() -> Self {
        GrooveForm {
            mode: FormMode::Create,
            title: String::new(),
            artist: String::new(),
            note: String::new(),
            tag_input: String::new(),
            tags: Vec::new(),
            links: empty_slots(),
            url_errors: [None; LINK_SLOTS],
            can_submit: false,
        }
    }

    /// Refuses to build without a target; callers fall back to the list.
    pub fn edit(target: Option<&GrooveRecord>) -> Result<Self, FormError> {
        let target = target.ok_or(FormError::MissingReference)?;
        let mut form = GrooveForm {
            mode: FormMode::Edit {
                id: target.id.clone(),
            },
            title: target.title.clone(),
            artist: target.artist.clone(),
            note: target.note.clone(),
            tag_input: String::new(),
            tags: target.tags.clone(),
            links: target.links.clone(),
            url_errors: [None; LINK_SLOTS],
            can_submit: false,
        };
        for slot in 0..LINK_SLOTS {
            form.validate_slot(slot);
        }
        form.recompute_submit();
        Ok(form)
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    pub fn tag_input(&self) -> &str {
        &self.tag_input
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn links(&self) -> &[Link; LINK_SLOTS] {
        &self.links
    }

    pub fn url_error(&self, slot: usize) -> Option<&'static str> {
        self.url_errors.get(slot).copied().flatten()
    }

    pub fn can_submit(&self) -> bool {
        self.can_submit
    }

    pub fn set_title(&mut self, value: impl Into<String>) {
        self.title = value.into();
        self.recompute_submit();
    }

    pub fn set_artist(&mut self, value: impl Into<String>) {
        self.artist = value.into();
        self.recompute_submit();
    }

    // Note and tag edits leave the submit gate untouched.
    pub fn set_note(&mut self, value: impl Into<String>) {
        self.note = value.into();
    }

    pub fn set_tag_input(&mut self, value: impl Into<String>) {
        self.tag_input = value.into();
    }

    pub fn add_tag(&mut self, text: &str) {
        let trimmed = text.trim();
        if !trimmed.is_empty() && !self.tags.iter().any(|t| t == trimmed) {
            self.tags.push(trimmed.to_string());
        }
        self.tag_input.clear();
    }

    /// Adds whatever is pending in the tag input.
    pub fn commit_tag_input(&mut self) {
        let pending = std::mem::take(&mut self.tag_input);
        self.add_tag(&pending);
    }

    pub fn select_existing_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
    }

    pub fn set_link_field(
        &mut self,
        slot: usize,
        field: LinkField,
        value: impl Into<String>,
    ) -> Result<(), GrooveError> {
        let link = self
            .links
            .get_mut(slot)
            .ok_or(GrooveError::InvalidSlot(slot + 1))?;
        match field {
            LinkField::Name => link.name = value.into(),
            LinkField::Url => {
                link.url = value.into();
                self.validate_slot(slot);
            }
        }
        self.recompute_submit();
        Ok(())
    }

    /// Slot count is fixed, so deleting a link blanks its slot.
    pub fn clear_link(&mut self, slot: usize) -> Result<(), GrooveError> {
        let link = self
            .links
            .get_mut(slot)
            .ok_or(GrooveError::InvalidSlot(slot + 1))?;
        *link = Link::default();
        self.validate_slot(slot);
        self.recompute_submit();
        Ok(())
    }

    pub fn submit<S: KeyValueStore>(
        &mut self,
        store: &mut RecordStore<S>,
    ) -> Result<Submission, FormError> {
        if !self.can_submit {
            debug!(title = %self.title, "submission blocked");
            return Ok(Submission::Rejected);
        }
        let mut records = store.load_records()?;
        match self.mode.clone() {
            FormMode::Create => {
                let id = generate_id(records.iter().map(|r| r.id.as_str()));
                records.push(GrooveRecord::new(
                    id.clone(),
                    self.title.trim().to_string(),
                    self.artist.trim().to_string(),
                    self.note.clone(),
                    self.tags.clone(),
                    self.links.clone(),
                ));
                store.save_records(&records)?;
                info!(id = %id, "created groove");
                *self = GrooveForm::create();
                Ok(Submission::Created(id))
            }
            FormMode::Edit { id } => {
                let now = Utc::now();
                let mut matched = 0;
                for record in records
                    .iter_mut()
                    .filter(|r| r.is_readable() && r.id == id)
                {
                    record.title = self.title.trim().to_string();
                    record.artist = self.artist.trim().to_string();
                    record.note = self.note.clone();
                    record.tags = self.tags.clone();
                    record.links = self.links.clone();
                    record.date = Some(now);
                    matched += 1;
                }
                if matched == 0 {
                    return Err(GrooveError::NotFound(id).into());
                }
                store.save_records(&records)?;
                info!(id = %id, "updated groove");
                Ok(Submission::Updated(id))
            }
        }
    }

    fn validate_slot(&mut self, slot: usize) {
        self.url_errors[slot] = if is_valid_url(&self.links[slot].url) {
            None
        } else {
            Some(INVALID_URL_MESSAGE)
        };
    }

    fn recompute_submit(&mut self) {
        let links_ok = self.url_errors.iter().all(Option::is_none);
        self.can_submit = !self.title.trim().is_empty() && links_ok;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MAX_PROGRESS;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn store_with(records: &[GrooveRecord]) -> RecordStore<MemoryStore> {
        let mut store = RecordStore::new(MemoryStore::default());
        store.save_records(records).expect("seed");
        store
    }

    fn existing() -> GrooveRecord {
        let mut record = GrooveRecord::new(
            "seed".into(),
            "Chameleon".into(),
            "Herbie Hancock".into(),
            "watch the ghost notes".into(),
            vec!["funk".into()],
            empty_slots(),
        );
        record.links[1] = Link {
            name: "live".into(),
            url: "https://example.com/live".into(),
        };
        record.progress = 4;
        record
    }

    #[test]
    fn empty_title_never_submits() {
        let mut form = GrooveForm::create();
        form.set_artist("Someone");
        form.set_note("notes");
        form.add_tag("jazz");
        form.set_link_field(0, LinkField::Url, "https://example.com")
            .expect("slot");
        assert!(!form.can_submit());

        form.set_title("   ");
        assert!(!form.can_submit());

        let mut store = store_with(&[]);
        assert_eq!(form.submit(&mut store).expect("submit"), Submission::Rejected);
        assert!(store.load_records().expect("load").is_empty());
    }

    #[test]
    fn title_alone_with_empty_links_submits() {
        let mut form = GrooveForm::create();
        form.set_title("Cissy Strut");
        assert!(form.can_submit());

        let mut store = store_with(&[]);
        let outcome = form.submit(&mut store).expect("submit");
        let records = store.load_records().expect("load");
        assert_eq!(records.len(), 1);
        assert_eq!(outcome, Submission::Created(records[0].id.clone()));
        assert_eq!(records[0].title, "Cissy Strut");
        assert_eq!(records[0].progress, 1);
        assert_eq!(records[0].links, empty_slots());
    }

    #[test]
    fn create_appends_and_resets_form() {
        let mut store = store_with(&[existing()]);
        let mut form = GrooveForm::create();
        form.set_title("Pick Up the Pieces");
        form.set_artist("Average White Band");
        form.add_tag("funk");
        form.set_link_field(2, LinkField::Name, "score").expect("slot");
        form.set_link_field(2, LinkField::Url, "https://example.com/score.pdf")
            .expect("slot");

        let outcome = form.submit(&mut store).expect("submit");
        let records = store.load_records().expect("load");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "seed");
        let created = &records[1];
        assert_eq!(outcome, Submission::Created(created.id.clone()));
        assert_ne!(created.id, "seed");
        assert_eq!(created.tags, vec!["funk"]);
        assert_eq!(created.links[2].url, "https://example.com/score.pdf");

        assert_eq!(form.title(), "");
        assert_eq!(form.artist(), "");
        assert!(form.tags().is_empty());
        assert_eq!(form.links(), &empty_slots());
        assert!(!form.can_submit());
    }

    #[test]
    fn invalid_url_blocks_until_fixed_or_cleared() {
        let mut form = GrooveForm::create();
        form.set_title("Spain");
        form.set_link_field(1, LinkField::Url, "not a url").expect("slot");
        assert_eq!(form.url_error(1), Some(INVALID_URL_MESSAGE));
        assert_eq!(form.url_error(0), None);
        assert!(!form.can_submit());

        form.set_link_field(1, LinkField::Url, "https://example.com")
            .expect("slot");
        assert_eq!(form.url_error(1), None);
        assert!(form.can_submit());

        form.set_link_field(1, LinkField::Url, "still bad").expect("slot");
        form.set_link_field(1, LinkField::Name, "lesson").expect("slot");
        assert!(!form.can_submit());
        form.clear_link(1).expect("slot");
        assert!(form.links()[1].is_empty());
        assert!(form.can_submit());
    }

    #[test]
    fn out_of_range_slots_are_rejected() {
        let mut form = GrooveForm::create();
        assert_eq!(
            form.set_link_field(3, LinkField::Url, "x"),
            Err(GrooveError::InvalidSlot(4))
        );
        assert_eq!(form.clear_link(7), Err(GrooveError::InvalidSlot(8)));
    }

    #[test]
    fn add_tag_is_idempotent_and_ordered() {
        let mut form = GrooveForm::create();
        form.set_tag_input("  swing ");
        form.commit_tag_input();
        form.add_tag("latin");
        form.add_tag("swing");
        form.add_tag("   ");
        assert_eq!(form.tags(), ["swing", "latin"]);
        assert_eq!(form.tag_input(), "");

        form.select_existing_tag("latin");
        form.select_existing_tag("bossa");
        assert_eq!(form.tags(), ["swing", "latin", "bossa"]);

        form.remove_tag("latin");
        form.remove_tag("absent");
        assert_eq!(form.tags(), ["swing", "bossa"]);
    }

    #[test]
    fn edit_requires_a_target() {
        assert!(matches!(
            GrooveForm::edit(None),
            Err(FormError::MissingReference)
        ));
    }

    #[test]
    fn edit_validates_prefilled_links() {
        let mut record = existing();
        record.links[0].url = "broken link".into();
        let form = GrooveForm::edit(Some(&record)).expect("form");
        assert_eq!(form.url_error(0), Some(INVALID_URL_MESSAGE));
        assert!(!form.can_submit());
    }

    #[test]
    fn edit_overwrites_in_place_and_keeps_identity_and_progress() {
        let seed = existing();
        let mut other = existing();
        other.id = "other".into();
        let mut store = store_with(&[seed.clone(), other]);

        let mut form = GrooveForm::edit(Some(&seed)).expect("form");
        assert!(form.can_submit());
        form.set_title("Chameleon (live)");
        form.set_note("slower first");
        form.remove_tag("funk");
        form.add_tag("fusion");
        form.clear_link(1).expect("slot");

        let outcome = form.submit(&mut store).expect("submit");
        assert_eq!(outcome, Submission::Updated("seed".into()));

        let records = store.load_records().expect("load");
        assert_eq!(records.len(), 2);
        let updated = &records[0];
        assert_eq!(updated.id, "seed");
        assert_eq!(updated.title, "Chameleon (live)");
        assert_eq!(updated.note, "slower first");
        assert_eq!(updated.tags, vec!["fusion"]);
        assert!(updated.links[1].is_empty());
        assert_eq!(updated.progress, 4);
        assert!(updated.date >= seed.date);
        assert_eq!(records[1].id, "other");

        // The edit form keeps its values after submission.
        assert_eq!(form.title(), "Chameleon (live)");
    }

    #[test]
    fn edit_of_vanished_record_fails() {
        let seed = existing();
        let mut store = store_with(&[]);
        let mut form = GrooveForm::edit(Some(&seed)).expect("form");
        assert!(matches!(
            form.submit(&mut store),
            Err(FormError::Groove(GrooveError::NotFound(_)))
        ));
        assert!(store.load_records().expect("load").is_empty());
    }

    #[test]
    fn edit_updates_every_groove_sharing_the_id() {
        let seed = existing();
        let mut twin = existing();
        twin.title = "Chameleon (take 2)".into();
        let mut store = store_with(&[seed.clone(), twin]);

        let mut form = GrooveForm::edit(Some(&seed)).expect("form");
        form.set_title("Chameleon (final)");
        form.submit(&mut store).expect("submit");

        let titles: Vec<String> = store
            .load_records()
            .expect("load")
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["Chameleon (final)", "Chameleon (final)"]);
    }

    #[test]
    fn edit_keeps_fields_it_does_not_know() {
        let mut store = RecordStore::new(MemoryStore::default());
        store
            .replace_raw_records(&serde_json::json!([
                {"id": "seed", "title": "Spain", "artist": null, "bpm": 132}
            ]))
            .expect("import");
        let records = store.load_records().expect("load");
        let mut form = GrooveForm::edit(records.first()).expect("form");
        form.set_note("montuno at the bridge");
        form.submit(&mut store).expect("submit");

        let raw = store
            .inner()
            .get(crate::storage::GROOVES_KEY)
            .expect("get")
            .expect("present");
        let stored: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(stored[0]["bpm"], 132);
        assert_eq!(stored[0]["artist"], serde_json::Value::Null);
        assert_eq!(stored[0]["note"], "montuno at the bridge");
        assert!(stored[0]["date"].is_string());
    }

    #[test]
    fn edit_preserves_progress_stored_at_submit_time() {
        let seed = existing();
        let mut completed = seed.clone();
        completed.progress = MAX_PROGRESS;
        let mut store = store_with(&[completed]);
        let mut form = GrooveForm::edit(Some(&seed)).expect("form");
        form.set_artist("H. Hancock");
        form.submit(&mut store).expect("submit");
        assert_eq!(store.load_records().expect("load")[0].progress, MAX_PROGRESS);
    }
}
