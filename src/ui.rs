use crate::commands::progress_label;
use crate::config::Config;
use crate::exchange::{export_to_dir, import_file, EXPORT_FILE_NAME};
use crate::form::{FormMode, GrooveForm, LinkField, Submission};
use crate::list::{Confirmation, ListView};
use crate::model::{GrooveRecord, LINK_SLOTS, MAX_PROGRESS};
use crate::storage::{FileStore, RecordStore};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{stdout, Stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub fn run(store: RecordStore<FileStore>, config: Config) -> Result<()> {
    let view = ListView::load(&store)?;
    let mut terminal = setup_terminal()?;
    let mut app = App::new(store, view, config);
    let result = app.event_loop(&mut terminal);
    teardown_terminal(&mut terminal)?;
    result
}

struct App {
    store: RecordStore<FileStore>,
    view: ListView,
    config: Config,
    selected: usize,
    scroll_offset: usize,
    last_save: Instant,
    status: String,
    mode: Mode,
}

enum Mode {
    Normal,
    Searching(FieldValue),
    Form(Box<FormState>),
    ConfirmDelete { id: String },
    GoalNote(FieldValue),
    ConfirmClearGoal,
    Importing(FieldValue),
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum FormField {
    Title,
    Artist,
    Note,
    Tags,
    ExistingTags,
    LinkName(usize),
    LinkUrl(usize),
}

/// Text editors layered over a `GrooveForm`; every keystroke is pushed
/// through to the form so its validation stays current.
struct FormState {
    form: GrooveForm,
    title: FieldValue,
    artist: FieldValue,
    note: FieldValue,
    tag_input: FieldValue,
    link_names: [FieldValue; LINK_SLOTS],
    link_urls: [FieldValue; LINK_SLOTS],
    field: FormField,
    tag_pick: usize,
}

#[derive(Clone, Default)]
struct FieldValue {
    value: String,
    cursor: usize,
}

impl FieldValue {
    fn new(value: &str) -> Self {
        FieldValue {
            value: value.to_string(),
            cursor: value.len(),
        }
    }

    fn move_left(&mut self) {
        self.cursor = prev_boundary(self.cursor, &self.value);
    }

    fn move_right(&mut self) {
        self.cursor = next_boundary(self.cursor, &self.value);
    }

    fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let prev = prev_boundary(self.cursor, &self.value);
        self.value.drain(prev..self.cursor);
        self.cursor = prev;
        true
    }

    fn delete(&mut self) -> bool {
        if self.cursor >= self.value.len() {
            return false;
        }
        let next = next_boundary(self.cursor, &self.value);
        self.value.drain(self.cursor..next);
        true
    }

    fn insert_char(&mut self, ch: char) {
        self.value.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    fn with_caret(&self) -> String {
        let mut text = self.value.clone();
        text.insert_str(self.cursor, "▌");
        text
    }

    /// Applies an editing key; returns whether the text changed.
    fn edit(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Left => self.move_left(),
            KeyCode::Right => self.move_right(),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.value.len(),
            KeyCode::Backspace => return self.backspace(),
            KeyCode::Delete => return self.delete(),
            KeyCode::Char(c)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                self.insert_char(c);
                return true;
            }
            _ => {}
        }
        false
    }
}

impl App {
    fn new(store: RecordStore<FileStore>, view: ListView, config: Config) -> Self {
        let status = format!(
            "Loaded {} grooves from {}",
            view.records().len(),
            store.inner().path().display()
        );
        App {
            store,
            view,
            config,
            selected: 0,
            scroll_offset: 0,
            last_save: Instant::now(),
            status,
            mode: Mode::Normal,
        }
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            terminal.draw(|f| self.draw(f))?;
            if event::poll(Duration::from_millis(200))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns `true` when the user asked to quit. Failed actions are
    /// reported in the status line and leave the app on the list.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        let mode = std::mem::replace(&mut self.mode, Mode::Normal);
        let outcome = match mode {
            Mode::Normal => match self.handle_normal_key(key) {
                Ok(quit) => return quit,
                Err(err) => Err(err),
            },
            Mode::Searching(field) => Ok(self.handle_search_key(field, key)),
            Mode::Form(state) => self.handle_form_key(state, key),
            Mode::ConfirmDelete { id } => self.handle_confirm_delete(id, key),
            Mode::GoalNote(field) => self.handle_goal_key(field, key),
            Mode::ConfirmClearGoal => self.handle_confirm_clear_goal(key),
            Mode::Importing(field) => self.handle_import_key(field, key),
        };
        match outcome {
            Ok(mode) => self.mode = mode,
            Err(err) => {
                warn!(error = %err, "action failed");
                self.status = format!("Action failed: {:#}", err);
                self.mode = Mode::Normal;
            }
        }
        false
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('c') if control => return Ok(true),
            KeyCode::Char('e') if control => self.export(),
            KeyCode::Char('o') if control => {
                self.mode = Mode::Importing(FieldValue::new(EXPORT_FILE_NAME));
                self.status = "Import file (replaces every groove; Enter to load, Esc to cancel)".into();
            }
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.view.displayed_len() {
                    self.selected += 1;
                }
            }
            KeyCode::Char(c @ '1'..='5') => {
                let level = c as u8 - b'0';
                self.set_progress(level)?;
            }
            KeyCode::Char('n') => {
                self.mode = Mode::Form(Box::new(FormState::new(GrooveForm::create())));
                self.status = "New groove (Tab/Shift-Tab move, Ctrl+S save, Esc back)".into();
            }
            KeyCode::Char('e') => {
                let id = self.current_groove().map(|g| g.id.clone());
                // Without a selection there is nothing to edit; stay on the list.
                if let Ok(form) = GrooveForm::edit(self.current_groove()) {
                    self.mode = Mode::Form(Box::new(FormState::new(form)));
                    self.status = format!("Editing {}", id.unwrap_or_default());
                }
            }
            KeyCode::Char('d') => {
                if let Some(groove) = self.current_groove() {
                    let id = groove.id.clone();
                    self.status = format!("Delete \"{}\"? (y to confirm, n/Esc to cancel)", groove.title);
                    self.mode = Mode::ConfirmDelete { id };
                } else {
                    self.status = "No groove selected to delete".into();
                }
            }
            KeyCode::Char('s') => {
                self.view.sort_by_complete(&mut self.store)?;
                self.after_save("Sorted: incomplete grooves first");
            }
            KeyCode::Char('i') => {
                let value = !self.view.show_only_incomplete();
                self.view.set_show_only_incomplete(&mut self.store, value)?;
                self.after_save(if value {
                    "Showing incomplete grooves only"
                } else {
                    "Showing all grooves"
                });
            }
            KeyCode::Char('t') => self.cycle_tag()?,
            KeyCode::Char('T') => {
                self.view.set_selected_tag(&mut self.store, None)?;
                self.after_save("Tag filter cleared");
            }
            KeyCode::Char('/') => {
                self.mode = Mode::Searching(FieldValue::new(self.view.filter_text()));
                self.status = "Search title/artist (Enter or Esc to finish)".into();
            }
            KeyCode::Esc => {
                if !self.view.filter_text().is_empty() {
                    self.view.set_filter_text("");
                    self.status = "Search cleared".into();
                    self.clamp_selection();
                }
            }
            KeyCode::Char('g') => {
                self.mode = Mode::GoalNote(FieldValue::new(self.view.goal_note()));
                self.status = "Goal note (Enter to save, Esc to cancel)".into();
            }
            KeyCode::Char('G') => {
                if self.view.goal_note().is_empty() {
                    self.status = "No goal to clear".into();
                } else {
                    self.mode = Mode::ConfirmClearGoal;
                    self.status = "Clear the goal note? (y/n)".into();
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_search_key(&mut self, mut field: FieldValue, key: KeyEvent) -> Mode {
        match key.code {
            KeyCode::Enter | KeyCode::Esc => {
                self.status = format!("{} of {} grooves shown", self.view.displayed_len(), self.view.records().len());
                return Mode::Normal;
            }
            _ => {
                if field.edit(key) {
                    self.view.set_filter_text(field.value.clone());
                    self.selected = 0;
                    self.scroll_offset = 0;
                }
            }
        }
        Mode::Searching(field)
    }

    fn handle_form_key(&mut self, mut state: Box<FormState>, key: KeyEvent) -> Result<Mode> {
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => {
                self.status = "Back to list".into();
                return Ok(Mode::Normal);
            }
            KeyCode::Tab => state.next_field(),
            KeyCode::BackTab => state.prev_field(),
            KeyCode::Char('s') if control => return self.submit_form(state),
            KeyCode::Enter if control => return self.submit_form(state),
            KeyCode::Char('x') if control => state.clear_current_link(),
            KeyCode::Enter => match state.field {
                FormField::Tags => state.commit_tag(),
                FormField::ExistingTags => {
                    if let Some(tag) = self.view.all_tags().get(state.tag_pick) {
                        state.form.select_existing_tag(tag);
                    }
                }
                _ => return self.submit_form(state),
            },
            KeyCode::Left if state.field == FormField::ExistingTags => {
                state.tag_pick = state.tag_pick.saturating_sub(1);
            }
            KeyCode::Right if state.field == FormField::ExistingTags => {
                if state.tag_pick + 1 < self.view.all_tags().len() {
                    state.tag_pick += 1;
                }
            }
            KeyCode::Backspace
                if state.field == FormField::Tags && state.tag_input.value.is_empty() =>
            {
                if let Some(last) = state.form.tags().last().cloned() {
                    state.form.remove_tag(&last);
                }
            }
            _ => state.edit_active(key),
        }
        Ok(Mode::Form(state))
    }

    fn submit_form(&mut self, mut state: Box<FormState>) -> Result<Mode> {
        match state.form.submit(&mut self.store) {
            Ok(Submission::Created(id)) => {
                self.reload()?;
                self.after_save(format!("Added {} (form cleared for the next groove)", id));
                Ok(Mode::Form(Box::new(FormState::new(state.form))))
            }
            Ok(Submission::Updated(id)) => {
                self.reload()?;
                self.after_save(format!("Updated {}", id));
                Ok(Mode::Normal)
            }
            Ok(Submission::Rejected) => {
                self.status = if state.form.title().trim().is_empty() {
                    "Title is required".into()
                } else {
                    "Fix the highlighted links before saving".into()
                };
                Ok(Mode::Form(state))
            }
            Err(err) => {
                warn!(error = %err, "could not save groove");
                self.status = format!("Could not save: {}", err);
                state.field = FormField::Title;
                Ok(Mode::Form(state))
            }
        }
    }

    fn handle_confirm_delete(&mut self, id: String, key: KeyEvent) -> Result<Mode> {
        let confirmation = match key.code {
            KeyCode::Char('y') | KeyCode::Enter => Confirmation::Accepted,
            KeyCode::Char('n') | KeyCode::Esc => Confirmation::Declined,
            _ => return Ok(Mode::ConfirmDelete { id }),
        };
        if self.view.delete_record(&mut self.store, &id, confirmation)? {
            self.clamp_selection();
            self.after_save(format!("Deleted {}", id));
        } else {
            self.status = "Delete canceled".into();
        }
        Ok(Mode::Normal)
    }

    fn handle_goal_key(&mut self, mut field: FieldValue, key: KeyEvent) -> Result<Mode> {
        match key.code {
            KeyCode::Esc => {
                self.status = "Goal unchanged".into();
                Ok(Mode::Normal)
            }
            KeyCode::Enter => {
                self.view.set_goal_note_text(field.value.clone());
                if self.view.save_goal_note(&mut self.store)? {
                    self.after_save("Goal saved");
                } else {
                    self.status = "Goal is empty; use G to clear it".into();
                }
                Ok(Mode::Normal)
            }
            _ => {
                field.edit(key);
                Ok(Mode::GoalNote(field))
            }
        }
    }

    fn handle_confirm_clear_goal(&mut self, key: KeyEvent) -> Result<Mode> {
        let confirmation = match key.code {
            KeyCode::Char('y') | KeyCode::Enter => Confirmation::Accepted,
            KeyCode::Char('n') | KeyCode::Esc => Confirmation::Declined,
            _ => return Ok(Mode::ConfirmClearGoal),
        };
        if self.view.clear_goal_note(&mut self.store, confirmation)? {
            self.after_save("Goal cleared");
        } else {
            self.status = "Goal kept".into();
        }
        Ok(Mode::Normal)
    }

    fn handle_import_key(&mut self, mut field: FieldValue, key: KeyEvent) -> Result<Mode> {
        match key.code {
            KeyCode::Esc => {
                self.status = "Import canceled".into();
                Ok(Mode::Normal)
            }
            KeyCode::Enter => {
                let path = PathBuf::from(field.value.trim());
                match import_file(&mut self.store, &path) {
                    Ok(count) => {
                        self.reload()?;
                        self.selected = 0;
                        let kept = self.view.unreadable_count();
                        let mut message = format!("Imported {} entries from {}", count, path.display());
                        if kept > 0 {
                            message.push_str(&format!(" ({} unreadable, kept as-is)", kept));
                        }
                        self.after_save(message);
                    }
                    Err(err) => {
                        warn!(error = %err, "import failed");
                        self.status = format!("Import failed: {}", err);
                    }
                }
                Ok(Mode::Normal)
            }
            _ => {
                field.edit(key);
                Ok(Mode::Importing(field))
            }
        }
    }

    fn set_progress(&mut self, level: u8) -> Result<()> {
        let Some(id) = self.current_groove().map(|g| g.id.clone()) else {
            self.status = "No groove selected".into();
            return Ok(());
        };
        if self.view.set_progress(&mut self.store, &id, level)? {
            self.clamp_selection();
            self.after_save(if level == MAX_PROGRESS {
                format!("{} complete!", id)
            } else {
                format!("{} at {}/{}", id, level, MAX_PROGRESS)
            });
        }
        Ok(())
    }

    fn cycle_tag(&mut self) -> Result<()> {
        let tags = self.view.all_tags();
        if tags.is_empty() {
            self.status = "No tags yet".into();
            return Ok(());
        }
        let next = match self.view.selected_tag() {
            None => Some(tags[0].clone()),
            Some(current) => tags
                .iter()
                .position(|t| t == current)
                .and_then(|idx| tags.get(idx + 1))
                .cloned(),
        };
        self.view.set_selected_tag(&mut self.store, next.as_deref())?;
        self.selected = 0;
        self.scroll_offset = 0;
        self.after_save(match next {
            Some(tag) => format!("Tag filter: #{}", tag),
            None => "Tag filter: all".to_string(),
        });
        Ok(())
    }

    fn export(&mut self) {
        let result = self
            .config
            .resolve_export_dir(None)
            .and_then(|dir| export_to_dir(self.view.records(), &dir));
        self.status = match result {
            Ok(path) => format!("Exported {} grooves to {}", self.view.records().len(), path.display()),
            Err(err) => {
                warn!(error = %err, "export failed");
                format!("Export failed: {:#}", err)
            }
        };
    }

    fn reload(&mut self) -> Result<()> {
        self.view.reload(&self.store)?;
        self.clamp_selection();
        Ok(())
    }

    fn after_save(&mut self, message: impl Into<String>) {
        self.last_save = Instant::now();
        self.status = message.into();
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let len = self.view.displayed_len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    fn current_groove(&self) -> Option<&GrooveRecord> {
        self.view.displayed_at(self.selected)
    }

    fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Min(8),
                Constraint::Length(4),
            ])
            .split(f.size());

        self.draw_header(f, layout[0]);
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(layout[1]);
        self.draw_list(f, body[0]);
        self.draw_detail(f, body[1]);
        self.draw_footer(f, layout[2]);

        match &self.mode {
            Mode::Form(state) => self.draw_form(f, state),
            Mode::ConfirmDelete { id } => {
                let title = self
                    .view
                    .find(id)
                    .map(|g| g.title.clone())
                    .unwrap_or_else(|| id.clone());
                draw_confirm(f, "Confirm Delete", &format!("Delete \"{}\"?", title));
            }
            Mode::ConfirmClearGoal => draw_confirm(f, "Clear Goal", "Clear the goal note?"),
            Mode::GoalNote(field) => draw_prompt(f, "Goal", field),
            Mode::Importing(field) => draw_prompt(f, "Import JSON file", field),
            Mode::Searching(_) | Mode::Normal => {}
        }
    }

    fn draw_header(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let title = Line::from(vec![
            Span::styled(
                "groovelog ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("{}", self.store.inner().path().display()),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw("  •  "),
            Span::styled(
                format!("saved {}", format_elapsed(self.last_save)),
                Style::default().fg(Color::Gray),
            ),
        ]);

        let search = match &self.mode {
            Mode::Searching(field) => field.with_caret(),
            _ if self.view.filter_text().is_empty() => "-".to_string(),
            _ => self.view.filter_text().to_string(),
        };
        let filters = Line::from(vec![
            Span::styled("search ", Style::default().fg(Color::Gray)),
            Span::styled(search, Style::default().fg(Color::LightCyan)),
            Span::raw("  •  "),
            Span::styled("tag ", Style::default().fg(Color::Gray)),
            Span::styled(
                self.view
                    .selected_tag()
                    .map(|t| format!("#{}", t))
                    .unwrap_or_else(|| "all".into()),
                Style::default().fg(Color::LightMagenta),
            ),
            Span::raw("  •  "),
            Span::styled(
                if self.view.show_only_incomplete() {
                    "incomplete only"
                } else {
                    "all progress"
                },
                Style::default().fg(Color::LightGreen),
            ),
            Span::raw("  •  "),
            Span::styled("goal ", Style::default().fg(Color::Gray)),
            Span::styled(
                if self.view.goal_note().is_empty() {
                    "-".to_string()
                } else {
                    self.view.goal_note().to_string()
                },
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
        ]);

        let block = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray));
        let paragraph = Paragraph::new(vec![title, filters])
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(paragraph, area);
    }

    fn draw_list(&mut self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let width = area.width.saturating_sub(2) as usize;
        let items: Vec<ListItem> = if self.view.records().is_empty() {
            vec![ListItem::new("No grooves yet. Press n to add one.")]
        } else if self.view.displayed_len() == 0 {
            vec![ListItem::new("Nothing matches the current filters")]
        } else {
            self.view
                .displayed()
                .map(|groove| groove_item(groove, width))
                .collect()
        };

        let mut state = ListState::default();
        let viewport = area.height.saturating_sub(2) as usize / 2;
        let len = self.view.displayed_len();
        self.scroll_offset = adjust_offset(self.selected, self.scroll_offset, viewport, 1, len);
        *state.offset_mut() = self.scroll_offset;
        if len > 0 {
            state.select(Some(self.selected));
        }

        let block = Block::default()
            .title(Span::styled(
                format!("Grooves ({} / {})", len, self.view.records().len()),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .style(Style::default().bg(Color::Rgb(16, 18, 24)));
        let list = List::new(items).block(block).highlight_style(
            Style::default()
                .bg(Color::Rgb(252, 214, 112))
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        );
        f.render_stateful_widget(list, area, &mut state);
    }

    fn draw_detail(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let lines = match self.current_groove() {
            Some(groove) => groove_detail(groove),
            None => vec![Line::from("No groove selected")],
        };
        let detail = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .title(Span::styled(
                    "Selected",
                    Style::default()
                        .fg(Color::Gray)
                        .add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        f.render_widget(detail, area);
    }

    fn draw_footer(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Length(2)])
            .split(area);

        let help_bar = Paragraph::new(footer_help_line())
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            );
        f.render_widget(help_bar, rows[0]);

        let status = Paragraph::new(self.status.clone())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            );
        f.render_widget(status, rows[1]);
    }

    fn draw_form(&self, f: &mut ratatui::Frame<'_>, state: &FormState) {
        let area = centered_rect(80, 85, f.size());
        let form = &state.form;
        let mut lines = Vec::new();
        lines.push(field_line("Title", &state.title, state.field == FormField::Title));
        lines.push(field_line("Artist", &state.artist, state.field == FormField::Artist));
        lines.push(field_line("Note", &state.note, state.field == FormField::Note));
        lines.push(Line::from(""));

        lines.push(field_line("New tag", &state.tag_input, state.field == FormField::Tags));
        let mut chips = vec![Span::styled(
            "Tags: ",
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::BOLD | Modifier::DIM),
        )];
        if form.tags().is_empty() {
            chips.push(Span::styled("(none)", Style::default().fg(Color::DarkGray)));
        }
        for tag in form.tags() {
            chips.push(Span::styled(
                format!("#{} ", tag),
                Style::default().fg(Color::LightMagenta),
            ));
        }
        lines.push(Line::from(chips));

        let picking = state.field == FormField::ExistingTags;
        let mut existing = vec![Span::styled(
            "Existing: ",
            Style::default()
                .fg(if picking { Color::Cyan } else { Color::Gray })
                .add_modifier(Modifier::BOLD | Modifier::DIM),
        )];
        if self.view.all_tags().is_empty() {
            existing.push(Span::styled("(none yet)", Style::default().fg(Color::DarkGray)));
        }
        for (idx, tag) in self.view.all_tags().iter().enumerate() {
            let mut style = Style::default().fg(Color::White);
            if picking && idx == state.tag_pick {
                style = style
                    .bg(Color::LightCyan)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD);
            }
            existing.push(Span::styled(tag.clone(), style));
            existing.push(Span::raw(" "));
        }
        lines.push(Line::from(existing));
        lines.push(Line::from(""));

        for slot in 0..LINK_SLOTS {
            let heading = if form.links()[slot].is_empty() {
                format!("Slot {} (empty)", slot + 1)
            } else {
                format!("Slot {}", slot + 1)
            };
            lines.push(Line::from(Span::styled(
                heading,
                Style::default().fg(Color::DarkGray),
            )));
            lines.push(field_line(
                &format!("Link {} name", slot + 1),
                &state.link_names[slot],
                state.field == FormField::LinkName(slot),
            ));
            lines.push(field_line(
                &format!("Link {} URL", slot + 1),
                &state.link_urls[slot],
                state.field == FormField::LinkUrl(slot),
            ));
            if let Some(message) = form.url_error(slot) {
                lines.push(Line::from(Span::styled(
                    format!("  {}", message),
                    Style::default().fg(Color::LightRed),
                )));
            }
        }
        lines.push(Line::from(""));

        let save_style = if form.can_submit() {
            Style::default()
                .fg(Color::LightGreen)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        lines.push(Line::from(vec![
            Span::styled("Ctrl+S save", save_style),
            Span::styled(
                "  •  Enter adds tag / picks existing tag  •  Backspace on empty tag removes last  •  Ctrl+X clears link  •  Esc back",
                Style::default().fg(Color::Gray),
            ),
        ]));

        let title = match form.mode() {
            FormMode::Create => "New Groove",
            FormMode::Edit { .. } => "Edit Groove",
        };
        let dialog = Paragraph::new(lines)
            .block(
                Block::default()
                    .title(Span::styled(
                        title,
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .wrap(Wrap { trim: false });

        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }
}

impl FormState {
    fn new(form: GrooveForm) -> Self {
        let links = form.links();
        FormState {
            title: FieldValue::new(form.title()),
            artist: FieldValue::new(form.artist()),
            note: FieldValue::new(form.note()),
            tag_input: FieldValue::new(form.tag_input()),
            link_names: std::array::from_fn(|slot| FieldValue::new(&links[slot].name)),
            link_urls: std::array::from_fn(|slot| FieldValue::new(&links[slot].url)),
            field: FormField::Title,
            tag_pick: 0,
            form,
        }
    }

    fn order() -> Vec<FormField> {
        let mut fields = vec![
            FormField::Title,
            FormField::Artist,
            FormField::Note,
            FormField::Tags,
            FormField::ExistingTags,
        ];
        for slot in 0..LINK_SLOTS {
            fields.push(FormField::LinkName(slot));
            fields.push(FormField::LinkUrl(slot));
        }
        fields
    }

    fn next_field(&mut self) {
        let order = Self::order();
        let idx = order.iter().position(|f| *f == self.field).unwrap_or(0);
        self.field = order[(idx + 1) % order.len()];
    }

    fn prev_field(&mut self) {
        let order = Self::order();
        let idx = order.iter().position(|f| *f == self.field).unwrap_or(0);
        self.field = order[(idx + order.len() - 1) % order.len()];
    }

    fn edit_active(&mut self, key: KeyEvent) {
        let result = match self.field {
            FormField::Title => {
                if self.title.edit(key) {
                    self.form.set_title(self.title.value.clone());
                }
                Ok(())
            }
            FormField::Artist => {
                if self.artist.edit(key) {
                    self.form.set_artist(self.artist.value.clone());
                }
                Ok(())
            }
            FormField::Note => {
                if self.note.edit(key) {
                    self.form.set_note(self.note.value.clone());
                }
                Ok(())
            }
            FormField::Tags => {
                if self.tag_input.edit(key) {
                    self.form.set_tag_input(self.tag_input.value.clone());
                }
                Ok(())
            }
            FormField::ExistingTags => Ok(()),
            FormField::LinkName(slot) => {
                if self.link_names[slot].edit(key) {
                    let value = self.link_names[slot].value.clone();
                    self.form.set_link_field(slot, LinkField::Name, value)
                } else {
                    Ok(())
                }
            }
            FormField::LinkUrl(slot) => {
                if self.link_urls[slot].edit(key) {
                    let value = self.link_urls[slot].value.clone();
                    self.form.set_link_field(slot, LinkField::Url, value)
                } else {
                    Ok(())
                }
            }
        };
        if let Err(err) = result {
            debug!(error = %err, "ignored form edit");
        }
    }

    fn commit_tag(&mut self) {
        self.form.commit_tag_input();
        self.tag_input = FieldValue::default();
    }

    fn clear_current_link(&mut self) {
        let slot = match self.field {
            FormField::LinkName(slot) | FormField::LinkUrl(slot) => slot,
            _ => return,
        };
        if self.form.clear_link(slot).is_ok() {
            self.link_names[slot] = FieldValue::default();
            self.link_urls[slot] = FieldValue::default();
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(rows[1])[1]
}

fn draw_confirm(f: &mut ratatui::Frame<'_>, title: &str, question: &str) {
    let area = centered_rect(50, 30, f.size());
    let body = vec![
        Line::from(Span::styled(
            question.to_string(),
            Style::default()
                .fg(Color::LightRed)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Press y to confirm, n or Esc to cancel"),
    ];
    let dialog = Paragraph::new(body).alignment(Alignment::Center).block(
        Block::default()
            .title(Span::styled(
                title.to_string(),
                Style::default()
                    .fg(Color::LightRed)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::LightRed)),
    );
    f.render_widget(Clear, area);
    f.render_widget(dialog, area);
}

fn draw_prompt(f: &mut ratatui::Frame<'_>, title: &str, field: &FieldValue) {
    let area = centered_rect(60, 20, f.size());
    let body = vec![
        field_line(title, field, true),
        Line::from(""),
        Line::from(Span::styled(
            "Enter to confirm • Esc to cancel",
            Style::default().fg(Color::Gray),
        )),
    ];
    let dialog = Paragraph::new(body).wrap(Wrap { trim: false }).block(
        Block::default()
            .title(Span::styled(
                title.to_string(),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(Clear, area);
    f.render_widget(dialog, area);
}

fn footer_help_line() -> Line<'static> {
    let key = |k: &'static str, color: Color| Span::styled(k, Style::default().fg(color));
    Line::from(vec![
        key("↑↓ / j k", Color::LightCyan),
        Span::raw(" move  "),
        key("1-5", Color::LightGreen),
        Span::raw(" progress  "),
        key("/", Color::LightCyan),
        Span::raw(" search  "),
        key("t/T", Color::LightMagenta),
        Span::raw(" tag/clear  "),
        key("i", Color::LightGreen),
        Span::raw(" incomplete  "),
        key("s", Color::LightGreen),
        Span::raw(" sort  "),
        key("n", Color::LightMagenta),
        Span::raw(" new  "),
        key("e", Color::LightYellow),
        Span::raw(" edit  "),
        key("d", Color::LightRed),
        Span::raw(" delete  "),
        key("g/G", Color::LightYellow),
        Span::raw(" goal  "),
        key("^E/^O", Color::LightCyan),
        Span::raw(" export/import  "),
        key("q", Color::LightRed),
        Span::raw(" quit"),
    ])
}

fn adjust_offset(
    selected: usize,
    current_offset: usize,
    viewport: usize,
    scrolloff: usize,
    len: usize,
) -> usize {
    if viewport == 0 || len == 0 {
        return 0;
    }
    let max_offset = len.saturating_sub(viewport);
    let margin = scrolloff.min(viewport.saturating_sub(1));
    let mut offset = current_offset.min(max_offset);
    if selected < offset.saturating_add(margin) {
        offset = selected.saturating_sub(margin);
    } else {
        let upper = offset
            .saturating_add(viewport.saturating_sub(1))
            .saturating_sub(margin);
        if selected > upper {
            offset = selected.saturating_add(margin + 1).saturating_sub(viewport);
        }
    }
    offset.min(max_offset)
}

fn prev_boundary(cursor: usize, text: &str) -> usize {
    text[..cursor]
        .char_indices()
        .next_back()
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn next_boundary(cursor: usize, text: &str) -> usize {
    text[cursor..]
        .chars()
        .next()
        .map(|ch| cursor + ch.len_utf8())
        .unwrap_or(text.len())
}

fn truncate_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

fn progress_pips(progress: u8) -> String {
    (1..=MAX_PROGRESS)
        .map(|level| if progress >= level { '●' } else { '○' })
        .collect()
}

fn groove_item(groove: &GrooveRecord, width: usize) -> ListItem<'static> {
    let heading = if groove.artist.is_empty() {
        groove.title.clone()
    } else {
        format!("{} / {}", groove.title, groove.artist)
    };
    let pips_style = Style::default().fg(if groove.is_complete() {
        Color::LightGreen
    } else {
        Color::Gray
    });
    let tags = if groove.tags.is_empty() {
        String::new()
    } else {
        format!("  #{}", groove.tags.join(" #"))
    };
    let lines = vec![
        Line::from(Span::styled(
            truncate_text(&heading, width),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled(progress_pips(groove.progress), pips_style),
            Span::raw(" "),
            Span::styled(progress_label(groove), pips_style),
            Span::styled(
                truncate_text(&tags, width.saturating_sub(24)),
                Style::default().fg(Color::LightMagenta),
            ),
        ]),
    ];
    ListItem::new(lines).style(Style::default().fg(Color::White))
}

fn groove_detail(groove: &GrooveRecord) -> Vec<Line<'static>> {
    let label = Style::default()
        .fg(Color::Gray)
        .add_modifier(Modifier::BOLD | Modifier::DIM);
    let mut lines = vec![Line::from(Span::styled(
        groove.title.clone(),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    ))];
    if !groove.artist.is_empty() {
        lines.push(Line::from(groove.artist.clone()));
    }
    lines.push(Line::from(vec![
        Span::styled(progress_pips(groove.progress), Style::default().fg(Color::LightGreen)),
        Span::raw(" "),
        Span::raw(progress_label(groove)),
    ]));
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("Note: ", label),
        Span::raw(groove.note.clone()),
    ]));
    if !groove.tags.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("#{}", groove.tags.join(" #")),
            Style::default().fg(Color::LightMagenta),
        )));
    }
    let links: Vec<_> = groove.visible_links().collect();
    if !links.is_empty() {
        lines.push(Line::from(Span::styled("Links:", label)));
        for (name, url) in links {
            lines.push(Line::from(vec![
                Span::styled(format!("  {} ", name), Style::default().fg(Color::LightCyan)),
                Span::styled(url.to_string(), Style::default().fg(Color::Blue)),
            ]));
        }
    }
    lines.push(Line::from(""));
    if let Some(date) = groove.date {
        lines.push(Line::from(Span::styled(
            format!("updated {}", date.format("%Y-%m-%d %H:%M")),
            Style::default().fg(Color::DarkGray),
        )));
    }
    lines.push(Line::from(Span::styled(
        format!("id {}", groove.id),
        Style::default().fg(Color::DarkGray),
    )));
    lines
}

fn field_line(label: &str, field: &FieldValue, active: bool) -> Line<'static> {
    let label_style = Style::default()
        .fg(if active { Color::Cyan } else { Color::Gray })
        .add_modifier(Modifier::BOLD | Modifier::DIM);
    let value_style = Style::default().fg(if active { Color::Cyan } else { Color::White });
    let text = if active {
        field.with_caret()
    } else {
        field.value.clone()
    };
    Line::from(vec![
        Span::styled(format!("{}: ", label), label_style),
        Span::styled(text, value_style),
    ])
}

fn format_elapsed(last: Instant) -> String {
    let secs = last.elapsed().as_secs();
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}
