use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use arboard::Clipboard;
use chrono::Local;
use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, error, info, trace};

use crate::domain::{FilterMode, Message, PbConfig, PbError};
use crate::inputter::{InputResult, Inputter};
use crate::settings::Settings;
use crate::table::{self, FilterScope, Record, Table};
use crate::ui::{DETAILS_HEIGHT, STATUS_HEIGHT, TABLE_HEADER_HEIGHT, TITLE_HEIGHT};

#[derive(Debug, PartialEq)]
pub enum Status {
    EMPTY,
    READY,
    QUITTING,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortState {
    pub column: String,
    pub descending: bool,
}

struct PendingFilter {
    query: String,
    deadline: Instant,
}

pub struct Model {
    config: PbConfig,
    pub status: Status,
    settings: Settings,
    settings_path: PathBuf,
    sheet: Option<String>,
    path: Option<PathBuf>,
    table: Table,
    /// Mapping of view row position to record index, after filter and sort.
    view_rows: Vec<usize>,
    phone_column: Option<String>,
    sort_state: Option<SortState>,
    query: String,
    scope: FilterScope,
    /// Applied query and scope at the moment the input line opened, so a
    /// canceled input can undo what the debounce applied mid-typing.
    saved_query: String,
    saved_scope: FilterScope,
    pending_filter: Option<PendingFilter>,
    curser_row: usize,
    curser_column: usize,
    viewport_rows: usize,
    clipboard: Option<Clipboard>,
    input: Inputter,
    last_input: InputResult,
    filter_mode: Option<FilterMode>,
    show_help: bool,
    status_message: String,
}

impl Model {
    pub fn init(
        config: &PbConfig,
        settings: Settings,
        settings_path: PathBuf,
        sheet: Option<String>,
    ) -> Self {
        Model {
            config: config.clone(),
            status: Status::EMPTY,
            settings,
            settings_path,
            sheet,
            path: None,
            table: Table::empty(),
            view_rows: Vec::new(),
            phone_column: None,
            sort_state: None,
            query: String::new(),
            scope: FilterScope::AllColumns,
            saved_query: String::new(),
            saved_scope: FilterScope::AllColumns,
            pending_filter: None,
            curser_row: 0,
            curser_column: 0,
            viewport_rows: 1,
            clipboard: Clipboard::new().ok(),
            input: Inputter::default(),
            last_input: InputResult::default(),
            filter_mode: None,
            show_help: false,
            status_message: "Ready. Open a contact file to start.".to_string(),
        }
    }

    // --------------------------- Accessors ----------------------------- //

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn view_rows(&self) -> &[usize] {
        &self.view_rows
    }

    pub fn curser(&self) -> (usize, usize) {
        (self.curser_row, self.curser_column)
    }

    pub fn sort_state(&self) -> Option<&SortState> {
        self.sort_state.as_ref()
    }

    pub fn phone_column(&self) -> Option<&str> {
        self.phone_column.as_deref()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn file_label(&self) -> String {
        match &self.path {
            Some(path) => file_name(path),
            None => "No file loaded".to_string(),
        }
    }

    pub fn current_column_name(&self) -> &str {
        self.table
            .columns
            .get(self.curser_column)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn input_state(&self) -> Option<(FilterMode, &InputResult)> {
        self.filter_mode.map(|mode| (mode, &self.last_input))
    }

    pub fn selected_record(&self) -> Option<&Record> {
        self.view_rows
            .get(self.curser_row)
            .map(|&idx| &self.table.records[idx])
    }

    /// While the filter input line is active, all key events are routed to
    /// the inputter instead of the key map.
    pub fn raw_keyevents(&self) -> bool {
        self.filter_mode.is_some()
    }

    // --------------------------- Data loading -------------------------- //

    pub fn load_file(&mut self, path: PathBuf) {
        match table::read_table(&path, self.sheet.as_deref()) {
            Ok(table) => {
                let path = path.canonicalize().unwrap_or(path);
                info!(
                    "Loaded {} records, {} columns from {}",
                    table.records.len(),
                    table.columns.len(),
                    path.display()
                );

                self.phone_column =
                    table::guess_phone_column(&table.columns, Some(&table.records));
                debug!("Phone column guess: {:?}", self.phone_column);

                self.table = table;
                self.sort_state = None;
                // Column selections never survive a column change.
                self.scope = FilterScope::AllColumns;
                self.pending_filter = None;
                self.curser_row = 0;
                self.curser_column = 0;
                self.status = Status::READY;
                self.rebuild_view();
                self.set_status_message(format!(
                    "Loaded {} records from {}",
                    self.table.records.len(),
                    file_name(&path)
                ));

                self.settings.last_file = Some(path.to_string_lossy().into_owned());
                self.settings.save(&self.settings_path);
                self.path = Some(path);
            }
            Err(e) => {
                error!("Loading {} failed: {e}", path.display());
                self.set_status_message(format!("Could not load {}: {e}", file_name(&path)));
            }
        }
    }

    fn reload(&mut self) {
        if let Some(path) = self.path.clone() {
            self.load_file(path);
        }
    }

    /// Recompute the view mapping from the applied query, scope and sort
    /// state. Source records are never touched.
    fn rebuild_view(&mut self) {
        let mut rows = table::filter_rows(&self.table, &self.query, &self.scope);
        if let Some(sort) = &self.sort_state
            && self.table.columns.contains(&sort.column)
        {
            rows = table::sort_rows(&self.table, &rows, &sort.column, sort.descending);
        }
        self.view_rows = rows;
        self.curser_row = self
            .curser_row
            .min(self.view_rows.len().saturating_sub(1));
    }

    // ----------------------------- Update ------------------------------ //

    pub fn update(&mut self, message: Option<Message>) -> Result<(), PbError> {
        self.apply_pending_filter();

        let Some(msg) = message else {
            return Ok(());
        };

        if self.show_help {
            match msg {
                Message::Quit => self.quit(),
                Message::Resize(width, height) => self.resize(width, height),
                Message::Exit | Message::Help => self.show_help = false,
                _ => {}
            }
            return Ok(());
        }

        if self.filter_mode.is_some() {
            match msg {
                Message::RawKey(key) => self.raw_input(key),
                Message::Resize(width, height) => self.resize(width, height),
                _ => {}
            }
            return Ok(());
        }

        match msg {
            Message::Quit => self.quit(),
            Message::MoveUp => self.move_selection_up(1),
            Message::MoveDown => self.move_selection_down(1),
            Message::MovePageUp => self.move_selection_up(self.viewport_rows.max(1)),
            Message::MovePageDown => self.move_selection_down(self.viewport_rows.max(1)),
            Message::MoveBeginning => {
                self.curser_row = 0;
            }
            Message::MoveEnd => {
                self.curser_row = self.view_rows.len().saturating_sub(1);
            }
            Message::MoveLeft => {
                self.curser_column = self.curser_column.saturating_sub(1);
            }
            Message::MoveRight => {
                if self.curser_column + 1 < self.table.columns.len() {
                    self.curser_column += 1;
                }
            }
            Message::MoveToFirstColumn => {
                self.curser_column = 0;
            }
            Message::MoveToLastColumn => {
                self.curser_column = self.table.columns.len().saturating_sub(1);
            }
            Message::FilterAllColumns => self.enter_filter_mode(FilterMode::AllColumns),
            Message::FilterCurrentColumn => self.enter_filter_mode(FilterMode::CurrentColumn),
            Message::ClearFilters => self.clear_filters(),
            Message::ToggleSort => self.toggle_sort(),
            Message::CopyPhone => self.copy_phone(),
            Message::CopyRow => self.copy_row(),
            Message::CopyCell => self.copy_cell(),
            Message::Export => self.export_filtered(),
            Message::Reload => self.reload(),
            Message::Help => self.show_help = true,
            Message::Exit => {}
            Message::Resize(width, height) => self.resize(width, height),
            Message::RawKey(_) => {}
        }
        Ok(())
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn resize(&mut self, _width: usize, height: usize) {
        let chrome = TITLE_HEIGHT + TABLE_HEADER_HEIGHT + DETAILS_HEIGHT + STATUS_HEIGHT;
        self.viewport_rows = height.saturating_sub(chrome).max(1);
        trace!("Resized, viewport {} rows", self.viewport_rows);
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    // --------------------------- Filtering ----------------------------- //

    fn enter_filter_mode(&mut self, mode: FilterMode) {
        if self.table.columns.is_empty() {
            return;
        }
        self.saved_query = self.query.clone();
        self.saved_scope = self.scope.clone();
        self.scope = match mode {
            FilterMode::AllColumns => FilterScope::AllColumns,
            FilterMode::CurrentColumn => {
                FilterScope::Column(self.current_column_name().to_string())
            }
        };
        self.filter_mode = Some(mode);
        self.input.clear();
        self.last_input = self.input.get();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        let result = self.input.read(key);
        if result.finished {
            self.filter_mode = None;
            self.pending_filter = None;
            if result.canceled {
                // Undo whatever the debounce applied while typing.
                if self.query != self.saved_query || self.scope != self.saved_scope {
                    self.query = self.saved_query.clone();
                    self.scope = self.saved_scope.clone();
                    self.rebuild_view();
                }
            } else {
                self.query = result.input.clone();
                self.rebuild_view();
                self.set_status_message(format!(
                    "{} / {} records",
                    self.view_rows.len(),
                    self.table.records.len()
                ));
            }
        } else {
            // Coalesce rapid keystrokes. The newest query replaces any
            // pending one, and only runs once typing pauses.
            self.pending_filter = Some(PendingFilter {
                query: result.input.clone(),
                deadline: Instant::now()
                    + Duration::from_millis(self.config.filter_debounce_ms),
            });
        }
        self.last_input = result;
    }

    fn apply_pending_filter(&mut self) {
        if let Some(pending) = &self.pending_filter
            && Instant::now() >= pending.deadline
        {
            trace!("Applying debounced filter \"{}\"", pending.query);
            self.query = pending.query.clone();
            self.pending_filter = None;
            self.rebuild_view();
        }
    }

    fn clear_filters(&mut self) {
        self.query.clear();
        self.scope = FilterScope::AllColumns;
        self.pending_filter = None;
        self.rebuild_view();
        self.set_status_message("Filters cleared.");
    }

    // ---------------------------- Sorting ------------------------------ //

    fn toggle_sort(&mut self) {
        let Some(column) = self.table.columns.get(self.curser_column).cloned() else {
            return;
        };
        let descending = match &self.sort_state {
            Some(state) if state.column == column => !state.descending,
            _ => false,
        };
        self.sort_state = Some(SortState {
            column: column.clone(),
            descending,
        });
        self.rebuild_view();
        self.set_status_message(format!(
            "Sorted by {} ({})",
            column,
            if descending { "descending" } else { "ascending" }
        ));
    }

    // --------------------------- Navigation ---------------------------- //

    fn move_selection_up(&mut self, size: usize) {
        self.curser_row = self.curser_row.saturating_sub(size);
    }

    fn move_selection_down(&mut self, size: usize) {
        if !self.view_rows.is_empty() {
            self.curser_row = (self.curser_row + size).min(self.view_rows.len() - 1);
        }
    }

    // --------------------------- Clipboard ----------------------------- //

    fn copy_phone(&mut self) {
        let Some(column) = self.phone_column.clone() else {
            self.set_status_message("No phone/mobile column was detected in the loaded headers.");
            return;
        };
        let Some(record) = self.selected_record() else {
            return;
        };
        let phone = record.get(&column).cloned().unwrap_or_default();
        if phone.is_empty() {
            self.set_status_message("The selected record has no phone number.");
            return;
        }
        let message = format!("Copied phone: {phone}");
        self.copy_to_clipboard(phone, message);
    }

    fn copy_row(&mut self) {
        let Some(record) = self.selected_record() else {
            return;
        };
        let text = self
            .table
            .columns
            .iter()
            .map(|c| record.get(c).map(String::as_str).unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\t");
        self.copy_to_clipboard(text, "Copied selected row (tab separated).".to_string());
    }

    fn copy_cell(&mut self) {
        let column = self.current_column_name().to_string();
        let Some(record) = self.selected_record() else {
            return;
        };
        let value = record.get(&column).cloned().unwrap_or_default();
        self.copy_to_clipboard(value, format!("Copied {column}."));
    }

    fn copy_to_clipboard(&mut self, text: String, ok_message: String) {
        match self.clipboard.as_mut() {
            Some(clipboard) => match clipboard.set_text(text) {
                Ok(_) => {
                    trace!("Copied content to clipboard");
                    self.set_status_message(ok_message);
                }
                Err(e) => {
                    error!("Error copying to clipboard: {e:?}");
                    self.set_status_message(format!("Clipboard error: {e}"));
                }
            },
            None => self.set_status_message("Clipboard is not available."),
        }
    }

    // ----------------------------- Export ------------------------------ //

    fn export_filtered(&mut self) {
        if self.view_rows.is_empty() || self.table.columns.is_empty() {
            self.set_status_message("Nothing to export.");
            return;
        }
        let name = format!("teachers_export_{}.csv", Local::now().format("%Y%m%d_%H%M"));
        match table::export_csv(Path::new(&name), &self.table, &self.view_rows) {
            Ok(count) => self.set_status_message(format!("Exported {count} records to {name}")),
            Err(e) => {
                error!("Export to {name} failed: {e}");
                self.set_status_message(format!("Export failed: {e}"));
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};
    use std::fs;
    use tempfile::TempDir;

    fn loaded_model(dir: &TempDir) -> Model {
        let data = dir.path().join("staff.csv");
        fs::write(
            &data,
            "Name,Department,Phone\n\
             Alice,Physics,01712345601\n\
             Bob,Chemistry,01712345602\n\
             Carol,Physics,01712345603\n",
        )
        .unwrap();

        let mut model = Model::init(
            &PbConfig::default(),
            Settings::default(),
            dir.path().join("settings.json"),
            None,
        );
        model.load_file(data);
        assert_eq!(model.status, Status::READY);
        model
    }

    fn press(model: &mut Model, code: KeyCode) {
        model
            .update(Some(Message::RawKey(KeyEvent::new(
                code,
                KeyModifiers::NONE,
            ))))
            .unwrap();
    }

    #[test]
    fn load_detects_phone_column_and_remembers_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let model = loaded_model(&dir);
        assert_eq!(model.phone_column(), Some("Phone"));
        assert_eq!(model.view_rows().len(), 3);

        let settings = Settings::load(dir.path().join("settings.json"));
        assert!(settings.last_file.unwrap().ends_with("staff.csv"));
    }

    #[test]
    fn failed_load_keeps_the_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = loaded_model(&dir);
        model.load_file(dir.path().join("missing.csv"));
        assert_eq!(model.status, Status::READY);
        assert_eq!(model.view_rows().len(), 3);
        assert!(model.status_message().starts_with("Could not load"));
    }

    #[test]
    fn filter_is_debounced_until_typing_pauses() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = loaded_model(&dir);

        model.update(Some(Message::FilterAllColumns)).unwrap();
        press(&mut model, KeyCode::Char('b'));
        press(&mut model, KeyCode::Char('o'));

        // Still within the idle gap, nothing applied yet.
        model.update(None).unwrap();
        assert_eq!(model.view_rows().len(), 3);

        std::thread::sleep(Duration::from_millis(200));
        model.update(None).unwrap();
        assert_eq!(model.view_rows().len(), 1);
        assert_eq!(model.selected_record().unwrap()["Name"], "Bob");
    }

    #[test]
    fn enter_applies_the_filter_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = loaded_model(&dir);

        model.update(Some(Message::FilterCurrentColumn)).unwrap();
        press(&mut model, KeyCode::Char('a'));
        press(&mut model, KeyCode::Enter);

        // Scope is the Name column, "a" matches Alice and Carol.
        assert_eq!(model.view_rows().len(), 2);
        assert!(!model.raw_keyevents());
    }

    #[test]
    fn escape_undoes_a_filter_the_debounce_already_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = loaded_model(&dir);

        model.update(Some(Message::FilterAllColumns)).unwrap();
        press(&mut model, KeyCode::Char('b'));
        press(&mut model, KeyCode::Char('o'));
        std::thread::sleep(Duration::from_millis(200));
        model.update(None).unwrap();
        assert_eq!(model.view_rows().len(), 1);

        press(&mut model, KeyCode::Esc);
        assert_eq!(model.query(), "");
        assert_eq!(model.view_rows().len(), 3);
        assert!(!model.raw_keyevents());
    }

    #[test]
    fn escape_restores_the_query_and_scope_from_before_the_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = loaded_model(&dir);

        // Apply a column filter, "a" on Name matches Alice and Carol.
        model.update(Some(Message::FilterCurrentColumn)).unwrap();
        press(&mut model, KeyCode::Char('a'));
        press(&mut model, KeyCode::Enter);
        assert_eq!(model.view_rows().len(), 2);

        // Start an all-columns filter, let the debounce fire, then bail out.
        model.update(Some(Message::FilterAllColumns)).unwrap();
        press(&mut model, KeyCode::Char('b'));
        std::thread::sleep(Duration::from_millis(200));
        model.update(None).unwrap();
        assert_eq!(model.view_rows().len(), 1);

        press(&mut model, KeyCode::Esc);
        assert_eq!(model.query(), "a");
        assert_eq!(model.scope, FilterScope::Column("Name".to_string()));
        assert_eq!(model.view_rows().len(), 2);
    }

    #[test]
    fn toggling_sort_flips_direction_and_new_column_resets() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = loaded_model(&dir);

        model.update(Some(Message::ToggleSort)).unwrap();
        assert_eq!(
            model.sort_state(),
            Some(&SortState {
                column: "Name".to_string(),
                descending: false
            })
        );

        model.update(Some(Message::ToggleSort)).unwrap();
        assert!(model.sort_state().unwrap().descending);

        model.update(Some(Message::MoveRight)).unwrap();
        model.update(Some(Message::ToggleSort)).unwrap();
        let sort = model.sort_state().unwrap();
        assert_eq!(sort.column, "Department");
        assert!(!sort.descending);
    }

    #[test]
    fn loading_a_new_file_resets_the_filter_scope() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = loaded_model(&dir);

        model.update(Some(Message::FilterCurrentColumn)).unwrap();
        press(&mut model, KeyCode::Char('a'));
        press(&mut model, KeyCode::Enter);
        assert_eq!(model.scope, FilterScope::Column("Name".to_string()));

        let other = dir.path().join("other.csv");
        fs::write(&other, "Id,Mobile\n1,01712345699\n").unwrap();
        model.load_file(other);
        assert_eq!(model.scope, FilterScope::AllColumns);
        assert_eq!(model.phone_column(), Some("Mobile"));
    }

    #[test]
    fn clear_filters_restores_the_full_view() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = loaded_model(&dir);

        model.update(Some(Message::FilterAllColumns)).unwrap();
        press(&mut model, KeyCode::Char('x'));
        press(&mut model, KeyCode::Enter);
        assert_eq!(model.view_rows().len(), 0);

        model.update(Some(Message::ClearFilters)).unwrap();
        assert_eq!(model.view_rows().len(), 3);
    }

    #[test]
    fn reload_reproduces_the_same_view() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = loaded_model(&dir);
        let before = model.view_rows().to_vec();
        let columns = model.table().columns.clone();

        model.update(Some(Message::Reload)).unwrap();
        assert_eq!(model.view_rows(), before);
        assert_eq!(model.table().columns, columns);
    }
}
