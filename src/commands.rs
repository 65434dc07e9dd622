use crate::config::Config;
use crate::exchange::{export_to_dir, import_file};
use crate::form::{GrooveForm, LinkField, Submission};
use crate::links::is_valid_url;
use crate::list::{Confirmation, ListView};
use crate::model::{GrooveRecord, LINK_SLOTS, MAX_PROGRESS};
use crate::storage::{FileStore, KeyValueStore, RecordStore};
use crate::ui;
use anyhow::{anyhow, bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

pub fn list<S: KeyValueStore>(store: &RecordStore<S>, filter: Option<String>) -> Result<()> {
    let mut view = ListView::load(store)?;
    if let Some(text) = filter {
        view.set_filter_text(text);
    }
    print_filters(&view);
    if view.records().is_empty() {
        println!("No grooves yet. Add one with `groovelog add <title>`.");
        return Ok(());
    }
    if view.displayed_len() == 0 {
        println!("  (nothing matches)");
    }
    for groove in view.displayed() {
        print_groove(groove);
    }
    Ok(())
}

pub fn add<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    title: String,
    artist: Option<String>,
    note: Option<String>,
    tags: Vec<String>,
    links: Vec<String>,
) -> Result<()> {
    if links.len() > LINK_SLOTS {
        bail!("at most {} links can be attached", LINK_SLOTS);
    }
    let mut form = GrooveForm::create();
    form.set_title(title);
    form.set_artist(artist.unwrap_or_default());
    form.set_note(note.unwrap_or_default());
    for tag in &tags {
        form.add_tag(tag);
    }
    for (slot, raw) in links.iter().enumerate() {
        let (name, url) = parse_link(raw);
        form.set_link_field(slot, LinkField::Name, name)?;
        form.set_link_field(slot, LinkField::Url, url)?;
    }
    match form.submit(store)? {
        Submission::Created(id) => {
            println!("Added groove {}", id);
            Ok(())
        }
        Submission::Rejected => Err(rejection(&form)),
        Submission::Updated(id) => Err(anyhow!("unexpected update of {}", id)),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn edit<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    id: String,
    title: Option<String>,
    artist: Option<String>,
    note: Option<String>,
    tags: Vec<String>,
    clear_tags: bool,
    links: Vec<String>,
    clear_links: Vec<usize>,
) -> Result<()> {
    let records = store.load_records()?;
    let target = records.iter().find(|r| r.id == id);
    let mut form =
        GrooveForm::edit(target).with_context(|| format!("groove {} not found", id))?;
    if let Some(t) = title {
        form.set_title(t);
    }
    if let Some(a) = artist {
        form.set_artist(a);
    }
    if let Some(n) = note {
        form.set_note(n);
    }
    if clear_tags {
        for tag in form.tags().to_vec() {
            form.remove_tag(&tag);
        }
    }
    for tag in &tags {
        form.add_tag(tag);
    }
    for slot in clear_links {
        form.clear_link(slot_index(slot)?)?;
    }
    for raw in &links {
        let (slot, name, url) = parse_slot_link(raw)?;
        form.set_link_field(slot, LinkField::Name, name)?;
        form.set_link_field(slot, LinkField::Url, url)?;
    }
    match form.submit(store)? {
        Submission::Updated(id) => {
            println!("Updated groove {}", id);
            Ok(())
        }
        Submission::Rejected => Err(rejection(&form)),
        Submission::Created(id) => Err(anyhow!("unexpected creation of {}", id)),
    }
}

pub fn progress<S: KeyValueStore>(store: &mut RecordStore<S>, id: String, level: u8) -> Result<()> {
    let mut view = ListView::load(store)?;
    if !view.set_progress(store, &id, level)? {
        bail!("groove {} not found", id);
    }
    if level == MAX_PROGRESS {
        println!("Groove {} complete!", id);
    } else {
        println!("Groove {} at {}/{}", id, level, MAX_PROGRESS);
    }
    Ok(())
}

pub fn delete<S: KeyValueStore>(store: &mut RecordStore<S>, id: String, yes: bool) -> Result<()> {
    let mut view = ListView::load(store)?;
    let title = view
        .find(&id)
        .map(|g| g.title.clone())
        .ok_or_else(|| anyhow!("groove {} not found", id))?;
    let confirmation = if yes {
        Confirmation::Accepted
    } else {
        confirm(&format!("Delete \"{}\"?", title))?
    };
    if view.delete_record(store, &id, confirmation)? {
        println!("Deleted {}", id);
    } else {
        println!("Delete canceled");
    }
    Ok(())
}

pub fn sort<S: KeyValueStore>(store: &mut RecordStore<S>) -> Result<()> {
    let mut view = ListView::load(store)?;
    view.sort_by_complete(store)?;
    println!("Sorted {} grooves, incomplete first", view.records().len());
    Ok(())
}

pub fn tags<S: KeyValueStore>(store: &RecordStore<S>) -> Result<()> {
    let view = ListView::load(store)?;
    if view.all_tags().is_empty() {
        println!("(no tags)");
    }
    for tag in view.all_tags() {
        println!("#{}", tag);
    }
    Ok(())
}

pub fn tag<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    tag: Option<String>,
    clear: bool,
) -> Result<()> {
    let mut view = ListView::load(store)?;
    if clear {
        view.set_selected_tag(store, None)?;
        println!("Tag filter cleared");
    } else if let Some(tag) = tag {
        if !view.all_tags().contains(&tag) {
            println!("Note: no groove is tagged #{} yet", tag);
        }
        view.set_selected_tag(store, Some(&tag))?;
        println!("Tag filter: #{}", tag);
    } else {
        match view.selected_tag() {
            Some(tag) => println!("Tag filter: #{}", tag),
            None => println!("Tag filter: all"),
        }
    }
    Ok(())
}

pub fn incomplete<S: KeyValueStore>(store: &mut RecordStore<S>, on: bool) -> Result<()> {
    let mut view = ListView::load(store)?;
    view.set_show_only_incomplete(store, on)?;
    println!(
        "{}",
        if on {
            "Showing incomplete grooves only"
        } else {
            "Showing all grooves"
        }
    );
    Ok(())
}

pub fn goal<S: KeyValueStore>(
    store: &mut RecordStore<S>,
    text: Option<String>,
    clear: bool,
    yes: bool,
) -> Result<()> {
    let mut view = ListView::load(store)?;
    if clear {
        if view.goal_note().is_empty() {
            println!("No goal set");
            return Ok(());
        }
        let confirmation = if yes {
            Confirmation::Accepted
        } else {
            confirm("Clear the goal note?")?
        };
        if view.clear_goal_note(store, confirmation)? {
            println!("Goal cleared");
        } else {
            println!("Goal kept");
        }
    } else if let Some(text) = text {
        view.set_goal_note_text(text);
        if view.save_goal_note(store)? {
            println!("Goal saved");
        } else {
            bail!("goal note is empty");
        }
    } else if view.goal_note().is_empty() {
        println!("No goal set");
    } else {
        println!("Goal: {}", view.goal_note());
    }
    Ok(())
}

pub fn export<S: KeyValueStore>(
    store: &RecordStore<S>,
    config: &Config,
    out: Option<PathBuf>,
) -> Result<()> {
    let records = store.load_records()?;
    let dir = config.resolve_export_dir(out.as_deref())?;
    let path = export_to_dir(&records, &dir)?;
    println!("Exported {} grooves to {}", records.len(), path.display());
    Ok(())
}

pub fn import<S: KeyValueStore>(store: &mut RecordStore<S>, file: &Path) -> Result<()> {
    let count = import_file(store, file)?;
    println!("Imported {} entries (previous collection replaced)", count);
    let kept = ListView::load(store)?.unreadable_count();
    if kept > 0 {
        println!("{} entries are not readable grooves and were kept as-is", kept);
    }
    Ok(())
}

pub fn tui(store: RecordStore<FileStore>, config: Config) -> Result<()> {
    ui::run(store, config)
}

/// A bare URL with no name, or `NAME=URL`.
fn parse_link(raw: &str) -> (String, String) {
    let raw = raw.trim();
    if !raw.is_empty() && is_valid_url(raw) {
        return (String::new(), raw.into());
    }
    match raw.split_once('=') {
        Some((name, url)) => (name.trim().into(), url.trim().into()),
        None => (String::new(), raw.into()),
    }
}

/// `SLOT:NAME=URL` with a 1-based slot.
fn parse_slot_link(raw: &str) -> Result<(usize, String, String)> {
    let (slot, rest) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("expected SLOT:NAME=URL, got {}", raw))?;
    let slot: usize = slot
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid link slot: {}", slot))?;
    let (name, url) = parse_link(rest);
    Ok((slot_index(slot)?, name, url))
}

fn slot_index(slot: usize) -> Result<usize> {
    if slot == 0 || slot > LINK_SLOTS {
        bail!("link slot must be 1-{}, got {}", LINK_SLOTS, slot);
    }
    Ok(slot - 1)
}

fn rejection(form: &GrooveForm) -> anyhow::Error {
    if form.title().trim().is_empty() {
        return anyhow!("title is required");
    }
    let bad: Vec<String> = (0..LINK_SLOTS)
        .filter_map(|slot| {
            form.url_error(slot)
                .map(|msg| format!("link {}: {} ({})", slot + 1, msg, form.links()[slot].url))
        })
        .collect();
    anyhow!("{}", bad.join("; "))
}

fn confirm(prompt: &str) -> Result<Confirmation> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(match answer.trim() {
        "y" | "Y" | "yes" => Confirmation::Accepted,
        _ => Confirmation::Declined,
    })
}

fn print_filters(view: &ListView) {
    let mut parts = Vec::new();
    if !view.filter_text().is_empty() {
        parts.push(format!("search \"{}\"", view.filter_text()));
    }
    if let Some(tag) = view.selected_tag() {
        parts.push(format!("#{}", tag));
    }
    if view.show_only_incomplete() {
        parts.push("incomplete only".to_string());
    }
    println!(
        "Grooves: {} of {}{}",
        view.displayed_len(),
        view.records().len(),
        if parts.is_empty() {
            String::new()
        } else {
            format!(" ({})", parts.join(", "))
        }
    );
    if !view.goal_note().is_empty() {
        println!("Goal: {}", view.goal_note());
    }
    if view.unreadable_count() > 0 {
        println!("({} stored entries are not readable grooves)", view.unreadable_count());
    }
    println!();
}

fn print_groove(groove: &GrooveRecord) {
    let artist = if groove.artist.is_empty() {
        String::new()
    } else {
        format!(" / {}", groove.artist)
    };
    println!("  - {}: {}{}", groove.id, groove.title, artist);
    println!("    {}", progress_label(groove));
    if !groove.note.is_empty() {
        println!("    note: {}", groove.note);
    }
    if !groove.tags.is_empty() {
        println!("    tags: #{}", groove.tags.join(" #"));
    }
    for (label, url) in groove.visible_links() {
        println!("    {}: {}", label, url);
    }
    if let Some(date) = groove.date {
        println!("    updated {}", date.format("%Y-%m-%d %H:%M"));
    }
}

pub fn progress_label(groove: &GrooveRecord) -> String {
    if groove.is_complete() {
        "complete!".to_string()
    } else {
        format!("progress {}/{}", groove.progress, MAX_PROGRESS)
    }
}
