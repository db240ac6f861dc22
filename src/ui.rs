use crate::api::BoardApi;
use crate::config::{save_theme, Settings, SettingsLocation, Theme};
use crate::model::{CategoryId, MoveDirection, PersonId, TaskId};
use crate::render::{Band, CategoryGroup, Matrix, MatrixRow, TaskRow};
use crate::sync::{BoardController, SyncError, DEFAULT_BACKUP_FILE};
use crate::week::{format_date, short_day_label};
use anyhow::Result;
use chrono::{Local, NaiveDate};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use log::info;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState,
    Wrap,
};
use ratatui::Terminal;
use std::io::{stdout, Stdout};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CATEGORY_COLOR: &str = "#4a90d9";

pub fn run<A: BoardApi>(
    board: BoardController<A>,
    settings: &Settings,
    location: SettingsLocation,
) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let mut app = App::new(board, settings, location, Local::now().date_naive());
    app.reload();
    let result = app.event_loop(&mut terminal);
    teardown_terminal(&mut terminal)?;
    result
}

struct App<A: BoardApi> {
    board: BoardController<A>,
    location: SettingsLocation,
    server: String,
    theme: Theme,
    today: NaiveDate,
    row: usize,
    column: Column,
    offset: usize,
    list_idx: usize,
    status: String,
    mode: Mode,
    view: ViewMode,
}

enum Mode {
    Normal,
    Form(Form),
    PickPerson(PersonPicker),
    ConfirmDelete(DeleteTarget),
    Alert(String),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum ViewMode {
    Board,
    Categories,
    People,
}

impl ViewMode {
    fn label(&self) -> &'static str {
        match self {
            ViewMode::Board => "Board",
            ViewMode::Categories => "Categories",
            ViewMode::People => "People",
        }
    }
}

/// Cursor column on the board: the assignee, the task text, or one of the
/// day cells of the window.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Column {
    Person,
    Task,
    Day(usize),
}

impl Column {
    fn next(self, day_count: usize) -> Column {
        match self {
            Column::Person => Column::Task,
            Column::Task if day_count > 0 => Column::Day(0),
            Column::Task => Column::Task,
            Column::Day(i) if i + 1 < day_count => Column::Day(i + 1),
            Column::Day(i) => Column::Day(i),
        }
    }

    fn prev(self) -> Column {
        match self {
            Column::Person | Column::Task => Column::Person,
            Column::Day(0) => Column::Task,
            Column::Day(i) => Column::Day(i - 1),
        }
    }
}

#[derive(Clone, Debug)]
struct RowRef {
    category_id: CategoryId,
    task: Option<TaskRow>,
}

struct PersonPicker {
    task_id: TaskId,
    options: Vec<(Option<PersonId>, String)>,
    idx: usize,
}

enum DeleteTarget {
    Task(TaskId, String),
    Category(CategoryId, String),
    Person(PersonId, String),
}

impl DeleteTarget {
    fn describe(&self) -> String {
        match self {
            DeleteTarget::Task(_, text) => format!("task \"{}\"", sanitize(text)),
            DeleteTarget::Category(_, name) => {
                format!("category \"{}\" and all its tasks", sanitize(name))
            }
            DeleteTarget::Person(_, name) => format!("person \"{}\"", sanitize(name)),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum FormKind {
    AddTask(CategoryId),
    EditTask(TaskId),
    EditNote { task_id: TaskId, date: NaiveDate },
    AddCategory,
    RenameCategory(CategoryId),
    AddPerson,
    Backup,
    Restore,
    ExportPdf,
}

impl FormKind {
    fn title(&self) -> String {
        match self {
            FormKind::AddTask(_) => "New Task".into(),
            FormKind::EditTask(_) => "Edit Task".into(),
            FormKind::EditNote { date, .. } => format!("Note for {}", short_day_label(*date)),
            FormKind::AddCategory => "New Category".into(),
            FormKind::RenameCategory(_) => "Rename Category".into(),
            FormKind::AddPerson => "New Person".into(),
            FormKind::Backup => "Backup To".into(),
            FormKind::Restore => "Restore From".into(),
            FormKind::ExportPdf => "Export PDF To".into(),
        }
    }
}

struct Form {
    kind: FormKind,
    fields: Vec<(&'static str, FieldValue)>,
    active: usize,
}

impl Form {
    fn new(kind: FormKind, fields: &[(&'static str, &str)]) -> Self {
        Form {
            kind,
            fields: fields
                .iter()
                .map(|(label, value)| (*label, FieldValue::new(value)))
                .collect(),
            active: 0,
        }
    }

    fn value(&self, idx: usize) -> &str {
        self.fields
            .get(idx)
            .map(|(_, field)| field.value.as_str())
            .unwrap_or("")
    }

    fn next_field(&mut self) {
        self.active = (self.active + 1) % self.fields.len().max(1);
    }

    fn prev_field(&mut self) {
        let len = self.fields.len().max(1);
        self.active = (self.active + len - 1) % len;
    }

    fn active_field_mut(&mut self) -> Option<&mut FieldValue> {
        self.fields.get_mut(self.active).map(|(_, field)| field)
    }
}

#[derive(Clone, Debug)]
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

    fn home(&mut self) {
        self.cursor = 0;
    }

    fn end(&mut self) {
        self.cursor = self.value.len();
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let prev = prev_boundary(self.cursor, &self.value);
        self.value.drain(prev..self.cursor);
        self.cursor = prev;
    }

    fn delete(&mut self) {
        if self.cursor >= self.value.len() {
            return;
        }
        let next = next_boundary(self.cursor, &self.value);
        self.value.drain(self.cursor..next);
    }

    fn insert_char(&mut self, ch: char) {
        self.value.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    fn with_caret(&self) -> String {
        let mut text = self.value.clone();
        text.insert_str(self.cursor, "▌");
        sanitize(&text)
    }
}

#[derive(Clone, Copy)]
struct Palette {
    bg: Color,
    fg: Color,
    muted: Color,
    accent: Color,
    band_even: Color,
    band_odd: Color,
    cursor_bg: Color,
    cursor_fg: Color,
    today: Color,
    danger: Color,
}

impl Palette {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Palette {
                bg: Color::Rgb(16, 18, 24),
                fg: Color::Gray,
                muted: Color::DarkGray,
                accent: Color::Cyan,
                band_even: Color::Rgb(22, 24, 30),
                band_odd: Color::Rgb(32, 35, 44),
                cursor_bg: Color::Rgb(252, 214, 112),
                cursor_fg: Color::Black,
                today: Color::LightYellow,
                danger: Color::LightRed,
            },
            Theme::Light => Palette {
                bg: Color::Rgb(250, 250, 247),
                fg: Color::Black,
                muted: Color::Gray,
                accent: Color::Blue,
                band_even: Color::Rgb(244, 244, 240),
                band_odd: Color::Rgb(228, 231, 237),
                cursor_bg: Color::Rgb(255, 221, 128),
                cursor_fg: Color::Black,
                today: Color::Rgb(196, 110, 0),
                danger: Color::Red,
            },
        }
    }
}

impl<A: BoardApi> App<A> {
    fn new(
        board: BoardController<A>,
        settings: &Settings,
        location: SettingsLocation,
        today: NaiveDate,
    ) -> Self {
        App {
            board,
            location,
            server: settings.server_url.clone(),
            theme: settings.theme,
            today,
            row: 0,
            column: Column::Task,
            offset: 0,
            list_idx: 0,
            status: format!("Connecting to {}", settings.server_url),
            mode: Mode::Normal,
            view: ViewMode::Board,
        }
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            self.today = Local::now().date_naive();
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

    fn palette(&self) -> Palette {
        Palette::for_theme(self.theme)
    }

    fn matrix(&self) -> Matrix {
        self.board.matrix(self.today)
    }

    fn rows(&self) -> Vec<RowRef> {
        flatten_rows(&self.matrix())
    }

    fn selected(&self) -> Option<RowRef> {
        self.rows().into_iter().nth(self.row)
    }

    fn alert(&mut self, message: String) {
        self.status = message.clone();
        self.mode = Mode::Alert(message);
    }

    fn reload(&mut self) {
        match self.board.load() {
            Ok(()) => {
                self.status = format!(
                    "Loaded {} categories from {}",
                    self.board.state().categories.len(),
                    self.server
                );
                self.clamp_cursor();
            }
            Err(err) => self.alert(err.to_string()),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Form(_) => {
                self.handle_form_key(key);
                false
            }
            Mode::PickPerson(_) => {
                self.handle_picker_key(key);
                false
            }
            Mode::ConfirmDelete(_) => {
                self.handle_confirm_key(key);
                false
            }
            Mode::Alert(_) => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                    self.mode = Mode::Normal;
                }
                false
            }
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('1') => self.set_view(ViewMode::Board),
            KeyCode::Char('2') => self.set_view(ViewMode::Categories),
            KeyCode::Char('3') => self.set_view(ViewMode::People),
            KeyCode::Char('T') => self.toggle_theme(),
            KeyCode::Char('R') => self.reload(),
            KeyCode::Char('s') => self.open_form(
                FormKind::Backup,
                &[("Path", DEFAULT_BACKUP_FILE)],
                "Backup path (Enter to download, Esc to cancel)",
            ),
            KeyCode::Char('o') => self.open_form(
                FormKind::Restore,
                &[("Path", DEFAULT_BACKUP_FILE)],
                "Restore replaces the whole board (Enter to confirm, Esc to cancel)",
            ),
            KeyCode::Char('P') => {
                let week_start = self.board.state().week_start;
                let default = format!("weekboard-{}.pdf", format_date(week_start));
                self.open_form(
                    FormKind::ExportPdf,
                    &[("Path", default.as_str())],
                    "PDF path (Enter to export, Esc to cancel)",
                );
            }
            _ => match self.view {
                ViewMode::Board => self.handle_board_key(key),
                ViewMode::Categories => self.handle_categories_key(key),
                ViewMode::People => self.handle_people_key(key),
            },
        }
        false
    }

    fn handle_board_key(&mut self, key: KeyEvent) {
        let day_count = self.board.rule().days as usize;
        match key.code {
            KeyCode::Left | KeyCode::Char('h') => self.column = self.column.prev(),
            KeyCode::Right | KeyCode::Char('l') => self.column = self.column.next(day_count),
            KeyCode::Up | KeyCode::Char('k') => self.row = self.row.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.row + 1 < self.matrix().row_count() {
                    self.row += 1;
                }
            }
            KeyCode::Char('[') => self.navigate(-1),
            KeyCode::Char(']') => self.navigate(1),
            KeyCode::Char('t') => self.go_today(),
            KeyCode::Char(' ') => self.toggle_done(),
            KeyCode::Enter | KeyCode::Char('e') => self.edit_cell(),
            KeyCode::Char('a') => self.start_add_task(),
            KeyCode::Char('d') => self.confirm_delete_task(),
            KeyCode::Char('x') => self.toggle_expanded(),
            KeyCode::Char('K') => self.move_selected_category(MoveDirection::Up),
            KeyCode::Char('J') => self.move_selected_category(MoveDirection::Down),
            KeyCode::Char('r') => {
                if let Some(row) = self.selected() {
                    self.start_rename_category(row.category_id);
                }
            }
            KeyCode::Char('c') => self.start_add_category(),
            _ => {}
        }
    }

    fn handle_categories_key(&mut self, key: KeyEvent) {
        let selected = self
            .board
            .state()
            .categories
            .get(self.list_idx)
            .map(|c| (c.id, c.name.clone()));
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.list_idx = self.list_idx.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => self.list_idx += 1,
            KeyCode::Char('n') | KeyCode::Char('c') => self.start_add_category(),
            KeyCode::Char('r') | KeyCode::Enter => {
                if let Some((id, _)) = selected {
                    self.start_rename_category(id);
                }
            }
            KeyCode::Char('K') | KeyCode::Char('J') => {
                if let Some((id, _)) = selected {
                    let direction = if key.code == KeyCode::Char('K') {
                        MoveDirection::Up
                    } else {
                        MoveDirection::Down
                    };
                    self.move_category(id, direction);
                    if let Some(idx) = self
                        .board
                        .state()
                        .categories
                        .iter()
                        .position(|c| c.id == id)
                    {
                        self.list_idx = idx;
                    }
                }
            }
            KeyCode::Char('d') => match selected {
                Some((id, name)) => self.confirm(DeleteTarget::Category(id, name)),
                None => self.status = "No category selected to delete".into(),
            },
            _ => {}
        }
        self.clamp_cursor();
    }

    fn handle_people_key(&mut self, key: KeyEvent) {
        let selected = self
            .board
            .state()
            .people
            .get(self.list_idx)
            .map(|p| (p.id, p.name.clone()));
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.list_idx = self.list_idx.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => self.list_idx += 1,
            KeyCode::Char('n') => self.open_form(
                FormKind::AddPerson,
                &[("Name", "")],
                "Adding person (Enter to save, Esc to cancel)",
            ),
            KeyCode::Char('d') => match selected {
                Some((id, name)) => self.confirm(DeleteTarget::Person(id, name)),
                None => self.status = "No person selected to delete".into(),
            },
            _ => {}
        }
        self.clamp_cursor();
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let mut mode = std::mem::replace(&mut self.mode, Mode::Normal);
        let close = match &mut mode {
            Mode::Form(form) => self.process_form_key(form, key),
            _ => true,
        };
        if !close && matches!(self.mode, Mode::Normal) {
            self.mode = mode;
        }
    }

    fn process_form_key(&mut self, form: &mut Form, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.status = "Canceled".into();
                return true;
            }
            KeyCode::Enter => return self.submit_form(form),
            KeyCode::Tab => form.next_field(),
            KeyCode::BackTab => form.prev_field(),
            _ => {}
        }
        if let Some(field) = form.active_field_mut() {
            match key.code {
                KeyCode::Left => field.move_left(),
                KeyCode::Right => field.move_right(),
                KeyCode::Home => field.home(),
                KeyCode::End => field.end(),
                KeyCode::Backspace => field.backspace(),
                KeyCode::Delete => field.delete(),
                KeyCode::Char(c) => {
                    if !key
                        .modifiers
                        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                    {
                        field.insert_char(c);
                    }
                }
                _ => {}
            }
        }
        false
    }

    fn handle_picker_key(&mut self, key: KeyEvent) {
        let picker = match &mut self.mode {
            Mode::PickPerson(picker) => picker,
            _ => return,
        };
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => picker.idx = picker.idx.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if picker.idx + 1 < picker.options.len() {
                    picker.idx += 1;
                }
            }
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                self.status = "Canceled".into();
            }
            KeyCode::Enter => {
                let task_id = picker.task_id;
                let choice = picker.options.get(picker.idx).cloned();
                self.mode = Mode::Normal;
                if let Some((person_id, name)) = choice {
                    match self.board.assign_person(task_id, person_id) {
                        Ok(_) => {
                            self.status = match person_id {
                                Some(_) => format!("Assigned to {}", sanitize(&name)),
                                None => "Unassigned".into(),
                            }
                        }
                        Err(err) => self.alert(err.to_string()),
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => {
                let target = match std::mem::replace(&mut self.mode, Mode::Normal) {
                    Mode::ConfirmDelete(target) => target,
                    _ => return,
                };
                let outcome = match &target {
                    DeleteTarget::Task(id, _) => self.board.delete_task(*id),
                    DeleteTarget::Category(id, _) => self.board.delete_category(*id),
                    DeleteTarget::Person(id, _) => self.board.delete_person(*id),
                };
                match outcome {
                    Ok(()) => {
                        self.status = format!("Deleted {}", target.describe());
                        self.clamp_cursor();
                    }
                    Err(err) => self.alert(err.to_string()),
                }
            }
            KeyCode::Char('n') | KeyCode::Esc => {
                self.status = "Delete canceled".into();
                self.mode = Mode::Normal;
            }
            _ => {}
        }
    }

    fn set_view(&mut self, view: ViewMode) {
        if self.view != view {
            self.view = view;
            self.list_idx = 0;
            self.status = format!("Switched to {} view", view.label());
        }
    }

    fn open_form(&mut self, kind: FormKind, fields: &[(&'static str, &str)], hint: &str) {
        self.mode = Mode::Form(Form::new(kind, fields));
        self.status = hint.to_string();
    }

    fn confirm(&mut self, target: DeleteTarget) {
        self.status = format!(
            "Delete {}? (y to confirm, n/Esc to cancel)",
            target.describe()
        );
        self.mode = Mode::ConfirmDelete(target);
    }

    fn submit_form(&mut self, form: &Form) -> bool {
        let outcome = match form.kind {
            FormKind::AddTask(category_id) => {
                self.board
                    .add_task(category_id, form.value(0))
                    .map(|task| {
                        self.focus_task(task.id);
                        format!("Added task {}", task.id)
                    })
            }
            FormKind::EditTask(id) => self
                .board
                .edit_task_text(id, form.value(0))
                .map(|_| "Task updated".to_string()),
            FormKind::EditNote { task_id, date } => {
                let content = form.value(0);
                self.board
                    .save_note(task_id, date, content)
                    .map(|()| {
                        if content.is_empty() {
                            format!("Cleared note for {}", short_day_label(date))
                        } else {
                            format!("Saved note for {}", short_day_label(date))
                        }
                    })
            }
            FormKind::AddCategory => {
                let color = match form.value(1).trim() {
                    "" => DEFAULT_CATEGORY_COLOR,
                    color => color,
                };
                self.board
                    .add_category(form.value(0), color)
                    .map(|category| format!("Created category {}", sanitize(&category.name)))
            }
            FormKind::RenameCategory(id) => self
                .board
                .rename_category(id, form.value(0))
                .map(|category| format!("Category renamed to {}", sanitize(&category.name))),
            FormKind::AddPerson => self
                .board
                .add_person(form.value(0))
                .map(|person| format!("Added {}", sanitize(&person.name))),
            FormKind::Backup => match form.value(0).trim() {
                "" => Err(SyncError::Empty("path")),
                path => self
                    .board
                    .backup_to(Path::new(path))
                    .map(|written| format!("Backup written to {}", written.display())),
            },
            FormKind::ExportPdf => match form.value(0).trim() {
                "" => Err(SyncError::Empty("path")),
                path => self
                    .board
                    .export_pdf_to(Some(Path::new(path)))
                    .map(|written| format!("PDF written to {}", written.display())),
            },
            FormKind::Restore => {
                let path = form.value(0).trim();
                if path.is_empty() {
                    self.status = "path cannot be empty".into();
                    return false;
                }
                match self.board.restore_from(Path::new(path), self.today) {
                    Ok(()) => {
                        self.row = 0;
                        self.offset = 0;
                        self.list_idx = 0;
                        self.status = "Restore successful!".into();
                    }
                    Err(err) => self.alert(err.to_string()),
                }
                return true;
            }
        };
        self.finish(outcome)
    }

    /// Reports the outcome of a form submission; returns whether the form
    /// should close.
    fn finish(&mut self, outcome: std::result::Result<String, SyncError>) -> bool {
        match outcome {
            Ok(message) => {
                self.status = message;
                self.clamp_cursor();
                true
            }
            Err(SyncError::Empty(what)) => {
                self.status = format!("{} cannot be empty", what);
                false
            }
            Err(err) => {
                self.alert(err.to_string());
                true
            }
        }
    }

    fn navigate(&mut self, pages: i64) {
        match self.board.navigate(pages) {
            Ok(()) => {
                self.status = format!(
                    "Showing {}",
                    self.board.rule().range_label(self.board.state().week_start)
                );
            }
            Err(err) => self.alert(err.to_string()),
        }
    }

    fn go_today(&mut self) {
        match self.board.go_to(self.today) {
            Ok(()) => self.status = "Back to the current window".into(),
            Err(err) => self.alert(err.to_string()),
        }
    }

    fn toggle_done(&mut self) {
        let task = match self.selected().and_then(|row| row.task) {
            Some(task) => task,
            None => {
                self.status = "No task selected".into();
                return;
            }
        };
        match self.board.set_done(task.task_id, !task.done) {
            Ok(updated) => {
                self.focus_task(updated.id);
                self.status = if updated.done {
                    "Marked done".into()
                } else {
                    "Marked not done".into()
                };
            }
            Err(err) => self.alert(err.to_string()),
        }
    }

    fn edit_cell(&mut self) {
        let row = match self.selected() {
            Some(row) => row,
            None => {
                self.status = "Nothing selected".into();
                return;
            }
        };
        let task = match row.task {
            Some(task) => task,
            None => {
                self.start_add_task();
                return;
            }
        };
        match self.column {
            Column::Person => {
                let mut options = vec![(None, "(unassigned)".to_string())];
                options.extend(
                    self.board
                        .state()
                        .people
                        .iter()
                        .map(|p| (Some(p.id), p.name.clone())),
                );
                let idx = options
                    .iter()
                    .position(|(id, _)| *id == task.person_id)
                    .unwrap_or(0);
                self.status = "Pick a person (Enter to assign, Esc to cancel)".into();
                self.mode = Mode::PickPerson(PersonPicker {
                    task_id: task.task_id,
                    options,
                    idx,
                });
            }
            Column::Task => self.open_form(
                FormKind::EditTask(task.task_id),
                &[("Text", task.text.as_str())],
                "Editing task (Enter to save, Esc to cancel)",
            ),
            Column::Day(i) => {
                let cell = match task.cells.get(i) {
                    Some(cell) => cell.clone(),
                    None => return,
                };
                self.open_form(
                    FormKind::EditNote {
                        task_id: task.task_id,
                        date: cell.date,
                    },
                    &[("Note", cell.content.as_str())],
                    "Editing note (empty clears it; Enter to save, Esc to cancel)",
                );
            }
        }
    }

    fn start_add_task(&mut self) {
        match self.selected() {
            Some(row) => self.open_form(
                FormKind::AddTask(row.category_id),
                &[("Text", "")],
                "Adding task (Enter to save, Esc to cancel)",
            ),
            None => self.status = "Create a category first (c)".into(),
        }
    }

    fn start_add_category(&mut self) {
        self.open_form(
            FormKind::AddCategory,
            &[("Name", ""), ("Color", DEFAULT_CATEGORY_COLOR)],
            "Adding category (Tab switches field, Enter to save, Esc to cancel)",
        );
    }

    fn start_rename_category(&mut self, id: CategoryId) {
        let name = match self.board.state().find_category(id) {
            Some(category) => category.name.clone(),
            None => return,
        };
        self.open_form(
            FormKind::RenameCategory(id),
            &[("Name", name.as_str())],
            "Renaming category (Enter to save, Esc to cancel)",
        );
    }

    fn confirm_delete_task(&mut self) {
        match self.selected().and_then(|row| row.task) {
            Some(task) => self.confirm(DeleteTarget::Task(task.task_id, task.text)),
            None => self.status = "No task selected to delete".into(),
        }
    }

    fn toggle_expanded(&mut self) {
        if let Some(row) = self.selected() {
            let expanded = self.board.toggle_expanded(row.category_id);
            self.status = if expanded {
                "Showing all done tasks".into()
            } else {
                "Showing latest done tasks".into()
            };
            self.focus_category(row.category_id);
        }
    }

    fn move_selected_category(&mut self, direction: MoveDirection) {
        if let Some(row) = self.selected() {
            self.move_category(row.category_id, direction);
            self.focus_category(row.category_id);
        }
    }

    fn move_category(&mut self, id: CategoryId, direction: MoveDirection) {
        match self.board.move_category(id, direction) {
            Ok(()) => self.status = "Category moved".into(),
            Err(SyncError::Board(err)) => self.status = err.to_string(),
            Err(err) => self.alert(err.to_string()),
        }
    }

    fn toggle_theme(&mut self) {
        let theme = self.theme.toggled();
        match save_theme(&self.location, theme) {
            Ok(()) => {
                info!("event=theme_changed light={}", !theme.is_dark());
                self.theme = theme;
                self.status = format!(
                    "{} theme saved to {} settings",
                    if theme.is_dark() { "Dark" } else { "Light" },
                    self.location.scope.label()
                );
            }
            Err(err) => self.alert(format!("Error saving theme: {:#}", err)),
        }
    }

    fn focus_task(&mut self, id: TaskId) {
        if let Some(idx) = self
            .rows()
            .iter()
            .position(|row| row.task.as_ref().map(|t| t.task_id) == Some(id))
        {
            self.row = idx;
        }
    }

    fn focus_category(&mut self, id: CategoryId) {
        let rows = self.rows();
        let current = rows.get(self.row).map(|row| row.category_id);
        if current == Some(id) {
            let last = rows.iter().rposition(|row| row.category_id == id);
            if let Some(last) = last {
                self.row = self.row.min(last);
            }
            return;
        }
        if let Some(idx) = rows.iter().position(|row| row.category_id == id) {
            self.row = idx;
        }
    }

    fn clamp_cursor(&mut self) {
        let matrix = self.matrix();
        self.row = self.row.min(matrix.row_count().saturating_sub(1));
        if let Column::Day(i) = self.column {
            self.column = Column::Day(i.min(matrix.days.len().saturating_sub(1)));
        }
        let list_len = match self.view {
            ViewMode::Board => 0,
            ViewMode::Categories => self.board.state().categories.len(),
            ViewMode::People => self.board.state().people.len(),
        };
        self.list_idx = self.list_idx.min(list_len.saturating_sub(1));
    }

    fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let palette = self.palette();
        f.render_widget(
            Block::default().style(Style::default().bg(palette.bg).fg(palette.fg)),
            f.size(),
        );
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(5),
            ])
            .split(f.size());

        let matrix = self.matrix();
        self.draw_header(f, layout[0], &matrix);
        match self.view {
            ViewMode::Board => self.draw_board(f, layout[1], &matrix),
            ViewMode::Categories => self.draw_categories(f, layout[1]),
            ViewMode::People => self.draw_people(f, layout[1]),
        }
        self.draw_footer(f, layout[2], &matrix);

        match &self.mode {
            Mode::Form(form) => self.draw_form(f, form),
            Mode::PickPerson(picker) => self.draw_picker(f, picker),
            Mode::ConfirmDelete(target) => self.draw_confirm(f, target),
            Mode::Alert(message) => self.draw_alert(f, message),
            Mode::Normal => {}
        }
    }

    fn draw_header(&self, f: &mut ratatui::Frame<'_>, area: Rect, matrix: &Matrix) {
        let palette = self.palette();
        let title = Line::from(vec![
            Span::styled(
                "weekboard ",
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                matrix.title.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw("  •  "),
            Span::styled(matrix.range_label.clone(), Style::default().fg(palette.today)),
            Span::raw("  •  "),
            Span::styled(self.server.clone(), Style::default().fg(palette.muted)),
            Span::raw("  •  "),
            Span::styled(
                format!("view {}", self.view.label().to_lowercase()),
                Style::default().fg(Color::Magenta),
            ),
        ]);
        let block = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(palette.muted));
        let paragraph = Paragraph::new(title)
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(paragraph, area);
    }

    fn draw_board(&mut self, f: &mut ratatui::Frame<'_>, area: Rect, matrix: &Matrix) {
        let palette = self.palette();
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.muted));
        if matrix.groups.is_empty() {
            let msg = Paragraph::new("No categories yet. Press c to create one.")
                .alignment(Alignment::Center)
                .block(block);
            f.render_widget(msg, area);
            return;
        }

        let mut header = vec![
            Cell::from("Category"),
            Cell::from("Who"),
            Cell::from("Task"),
        ];
        for day in &matrix.days {
            let mut style = Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD);
            if day.is_today {
                style = style.fg(palette.today).add_modifier(Modifier::UNDERLINED);
            }
            header.push(Cell::from(Span::styled(day.label.clone(), style)));
        }
        let header = Row::new(header)
            .style(Style::default().add_modifier(Modifier::BOLD))
            .bottom_margin(1);

        let mut rows = Vec::with_capacity(matrix.row_count());
        let mut flat = 0;
        for (g_idx, group) in matrix.groups.iter().enumerate() {
            let band = match group.band {
                Band::Even => palette.band_even,
                Band::Odd => palette.band_odd,
            };
            let label_style = Style::default()
                .fg(category_color(&group.color, g_idx))
                .add_modifier(Modifier::BOLD);
            for (r_idx, row) in group.rows.iter().enumerate() {
                let label = if r_idx == 0 {
                    category_label(group)
                } else {
                    String::new()
                };
                let mut cells = vec![Cell::from(Span::styled(label, label_style))];
                let on_row = flat == self.row;
                match row {
                    MatrixRow::Placeholder => {
                        let blank = Style::default();
                        cells.push(self.cell(String::new(), Column::Person, on_row, blank));
                        cells.push(self.cell(
                            "(no tasks, press a to add)".into(),
                            Column::Task,
                            on_row,
                            Style::default().fg(palette.muted),
                        ));
                        for i in 0..matrix.days.len() {
                            cells.push(self.cell(String::new(), Column::Day(i), on_row, blank));
                        }
                    }
                    MatrixRow::Task(task) => {
                        let who = task
                            .person_name
                            .as_deref()
                            .map(sanitize)
                            .unwrap_or_else(|| "-".into());
                        cells.push(self.cell(who, Column::Person, on_row, Style::default()));
                        let (mark, text_style) = if task.done {
                            (
                                "[x]",
                                Style::default()
                                    .fg(palette.muted)
                                    .add_modifier(Modifier::CROSSED_OUT),
                            )
                        } else {
                            ("[ ]", Style::default())
                        };
                        cells.push(self.cell(
                            format!("{} {}", mark, sanitize(&task.text)),
                            Column::Task,
                            on_row,
                            text_style,
                        ));
                        for (i, note) in task.cells.iter().enumerate() {
                            cells.push(self.cell(
                                sanitize(&note.content),
                                Column::Day(i),
                                on_row,
                                Style::default(),
                            ));
                        }
                    }
                }
                rows.push(Row::new(cells).style(Style::default().bg(band)));
                flat += 1;
            }
        }

        let mut widths = vec![
            Constraint::Length(16),
            Constraint::Length(12),
            Constraint::Percentage(25),
        ];
        widths.extend(matrix.days.iter().map(|_| Constraint::Min(10)));

        // border, header and its margin
        let viewport = area.height.saturating_sub(4) as usize;
        self.offset = adjust_offset(self.row, self.offset, viewport, 1, flat);
        let mut state = TableState::default();
        *state.offset_mut() = self.offset;
        let table = Table::new(rows, widths)
            .header(header)
            .block(block)
            .column_spacing(1);
        f.render_stateful_widget(table, area, &mut state);
    }

    fn cell(&self, text: String, column: Column, on_row: bool, style: Style) -> Cell<'static> {
        let palette = self.palette();
        let style = if on_row && self.column == column && self.view == ViewMode::Board {
            style
                .bg(palette.cursor_bg)
                .fg(palette.cursor_fg)
                .add_modifier(Modifier::BOLD)
        } else if on_row {
            style.add_modifier(Modifier::BOLD)
        } else {
            style
        };
        Cell::from(text).style(style)
    }

    fn draw_categories(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let palette = self.palette();
        let state = self.board.state();
        let orders = state.effective_orders();
        let items: Vec<ListItem> = if state.categories.is_empty() {
            vec![ListItem::new("No categories yet")]
        } else {
            state
                .categories
                .iter()
                .zip(orders)
                .enumerate()
                .map(|(idx, (category, order))| {
                    ListItem::new(Line::from(vec![
                        Span::styled(
                            "■ ",
                            Style::default().fg(category_color(&category.color, idx)),
                        ),
                        Span::styled(format!("#{:<3} ", order), Style::default().fg(palette.muted)),
                        Span::styled(
                            sanitize(&category.name),
                            Style::default().add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(
                            format!(
                                "  {}  {} task(s)",
                                sanitize(&category.color),
                                category.tasks.len()
                            ),
                            Style::default().fg(palette.muted),
                        ),
                    ]))
                })
                .collect()
        };
        self.draw_list(f, area, "Categories", items, state.categories.len());
    }

    fn draw_people(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let palette = self.palette();
        let state = self.board.state();
        let items: Vec<ListItem> = if state.people.is_empty() {
            vec![ListItem::new("No people yet")]
        } else {
            state
                .people
                .iter()
                .map(|person| {
                    let assigned = state
                        .categories
                        .iter()
                        .flat_map(|c| c.tasks.iter())
                        .filter(|t| t.person_id == Some(person.id))
                        .count();
                    ListItem::new(Line::from(vec![
                        Span::styled(
                            sanitize(&person.name),
                            Style::default().add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(
                            format!("  {} task(s)", assigned),
                            Style::default().fg(palette.muted),
                        ),
                    ]))
                })
                .collect()
        };
        self.draw_list(f, area, "People", items, state.people.len());
    }

    fn draw_list(
        &self,
        f: &mut ratatui::Frame<'_>,
        area: Rect,
        title: &str,
        items: Vec<ListItem<'_>>,
        len: usize,
    ) {
        let palette = self.palette();
        let mut state = ListState::default();
        let viewport = area.height.saturating_sub(2) as usize;
        *state.offset_mut() = adjust_offset(self.list_idx, 0, viewport, 1, len);
        if len > 0 {
            state.select(Some(self.list_idx));
        }
        let block = Block::default()
            .title(Span::styled(
                format!("{} ({})", title, len),
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.muted));
        let list = List::new(items).block(block).highlight_style(
            Style::default()
                .bg(palette.cursor_bg)
                .fg(palette.cursor_fg)
                .add_modifier(Modifier::BOLD),
        );
        f.render_stateful_widget(list, area, &mut state);
    }

    fn draw_footer(&self, f: &mut ratatui::Frame<'_>, area: Rect, matrix: &Matrix) {
        let palette = self.palette();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Length(3)])
            .split(area);

        let help_bar = Paragraph::new(self.footer_help_line())
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(palette.muted)),
            );
        f.render_widget(help_bar, rows[0]);

        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[1]);

        let status = Paragraph::new(self.status.clone())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(palette.muted)),
            );
        f.render_widget(status, bottom[0]);

        let detail = Paragraph::new(self.detail_lines(matrix))
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(palette.muted))
                    .title("Selected"),
            );
        f.render_widget(detail, bottom[1]);
    }

    fn footer_help_line(&self) -> Line<'static> {
        let palette = self.palette();
        let key = |k: &'static str| Span::styled(k, Style::default().fg(palette.accent));
        let mut spans = vec![
            key("1"),
            Span::raw(" board  "),
            key("2"),
            Span::raw(" categories  "),
            key("3"),
            Span::raw(" people  "),
        ];
        match self.view {
            ViewMode::Board => spans.extend([
                key("hjkl"),
                Span::raw(" move  "),
                key("[ ]"),
                Span::raw(" window  "),
                key("t"),
                Span::raw(" today  "),
                key("space"),
                Span::raw(" done  "),
                key("e"),
                Span::raw(" edit  "),
                key("a"),
                Span::raw(" add  "),
                key("x"),
                Span::raw(" expand  "),
                key("K/J"),
                Span::raw(" move cat  "),
            ]),
            ViewMode::Categories => spans.extend([
                key("n"),
                Span::raw(" new  "),
                key("r"),
                Span::raw(" rename  "),
                key("K/J"),
                Span::raw(" reorder  "),
            ]),
            ViewMode::People => spans.extend([key("n"), Span::raw(" new  ")]),
        }
        spans.extend([
            Span::styled("d", Style::default().fg(palette.danger)),
            Span::raw(" delete  "),
            key("s/o"),
            Span::raw(" backup/restore  "),
            key("P"),
            Span::raw(" pdf  "),
            key("T"),
            Span::raw(" theme  "),
            Span::styled("q", Style::default().fg(palette.danger)),
            Span::raw(" quit"),
        ]);
        Line::from(spans)
    }

    fn detail_lines(&self, matrix: &Matrix) -> Vec<Line<'static>> {
        if self.view != ViewMode::Board {
            return vec![Line::from(format!(
                "{} categories, {} people",
                self.board.state().categories.len(),
                self.board.state().people.len()
            ))];
        }
        let task = match flatten_rows(matrix)
            .into_iter()
            .nth(self.row)
            .and_then(|row| row.task)
        {
            Some(task) => task,
            None => return vec![Line::from("No task selected")],
        };
        let mut lines = vec![Line::from(Span::styled(
            sanitize(&task.text),
            Style::default()
                .fg(self.palette().today)
                .add_modifier(Modifier::BOLD),
        ))];
        match self.column {
            Column::Day(i) => {
                if let Some(cell) = task.cells.get(i) {
                    let content = if cell.content.is_empty() {
                        "(empty)".to_string()
                    } else {
                        sanitize(&cell.content)
                    };
                    lines.push(Line::from(format!(
                        "{}: {}",
                        short_day_label(cell.date),
                        content
                    )));
                }
            }
            _ => lines.extend(task.previews.iter().map(|p| Line::from(sanitize(p)))),
        }
        lines
    }

    fn draw_form(&self, f: &mut ratatui::Frame<'_>, form: &Form) {
        let palette = self.palette();
        let area = centered_rect(60, 30, f.size());
        let mut lines = Vec::new();
        for (idx, (label, field)) in form.fields.iter().enumerate() {
            lines.push(field_line(label, field, idx == form.active, palette));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Enter to save • Esc to cancel • Tab/Shift-Tab to move",
            Style::default().fg(palette.muted),
        )));
        let dialog = Paragraph::new(lines)
            .block(
                Block::default()
                    .title(Span::styled(
                        form.kind.title(),
                        Style::default()
                            .fg(palette.accent)
                            .add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.accent))
                    .style(Style::default().bg(palette.bg)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }

    fn draw_picker(&self, f: &mut ratatui::Frame<'_>, picker: &PersonPicker) {
        let palette = self.palette();
        let area = centered_rect(40, 50, f.size());
        let items: Vec<ListItem> = picker
            .options
            .iter()
            .map(|(_, name)| ListItem::new(sanitize(name)))
            .collect();
        let mut state = ListState::default();
        state.select(Some(picker.idx));
        let list = List::new(items)
            .block(
                Block::default()
                    .title(Span::styled(
                        "Assign To",
                        Style::default()
                            .fg(palette.accent)
                            .add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.accent))
                    .style(Style::default().bg(palette.bg)),
            )
            .highlight_style(
                Style::default()
                    .bg(palette.cursor_bg)
                    .fg(palette.cursor_fg)
                    .add_modifier(Modifier::BOLD),
            );
        f.render_widget(Clear, area);
        f.render_stateful_widget(list, area, &mut state);
    }

    fn draw_confirm(&self, f: &mut ratatui::Frame<'_>, target: &DeleteTarget) {
        let palette = self.palette();
        let area = centered_rect(50, 30, f.size());
        let body = vec![
            Line::from(Span::styled(
                format!("Delete {}?", target.describe()),
                Style::default()
                    .fg(palette.danger)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from("Press y to confirm, n or Esc to cancel"),
        ];
        let dialog = Paragraph::new(body)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .title(Span::styled(
                        "Confirm Delete",
                        Style::default()
                            .fg(palette.danger)
                            .add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.danger))
                    .style(Style::default().bg(palette.bg)),
            );
        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }

    fn draw_alert(&self, f: &mut ratatui::Frame<'_>, message: &str) {
        let palette = self.palette();
        let area = centered_rect(50, 25, f.size());
        let body = vec![
            Line::from(Span::styled(
                sanitize(message),
                Style::default()
                    .fg(palette.danger)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from("Press Enter to dismiss"),
        ];
        let dialog = Paragraph::new(body)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .title("Error")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.danger))
                    .style(Style::default().bg(palette.bg)),
            );
        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
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
    let popup_layout = Layout::default()
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
        .split(popup_layout[1])[1]
}

fn flatten_rows(matrix: &Matrix) -> Vec<RowRef> {
    matrix
        .groups
        .iter()
        .flat_map(|group| {
            group.rows.iter().map(move |row| RowRef {
                category_id: group.category_id,
                task: match row {
                    MatrixRow::Task(task) => Some(task.clone()),
                    MatrixRow::Placeholder => None,
                },
            })
        })
        .collect()
}

fn category_label(group: &CategoryGroup) -> String {
    let name = sanitize(&group.name);
    if group.hidden_done > 0 {
        format!("{} +{}", name, group.hidden_done)
    } else {
        name
    }
}

/// Replaces control characters so user text cannot drive the terminal.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Category colors arrive as CSS strings; `#rgb` is expanded, anything
/// ratatui cannot parse falls back to the palette.
fn category_color(css: &str, idx: usize) -> Color {
    let css = css.trim();
    if let Some(hex) = css.strip_prefix('#') {
        if hex.len() == 3 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
            if let Ok(color) = format!("#{}", expanded).parse() {
                return color;
            }
        }
    }
    css.parse().unwrap_or_else(|_| color_for_index(idx))
}

fn color_for_index(idx: usize) -> Color {
    let palette = [
        Color::Cyan,
        Color::LightGreen,
        Color::LightMagenta,
        Color::LightBlue,
        Color::LightYellow,
        Color::LightRed,
    ];
    palette[idx % palette.len()]
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

fn field_line(label: &str, field: &FieldValue, active: bool, palette: Palette) -> Line<'static> {
    let text = if active {
        field.with_caret()
    } else {
        sanitize(&field.value)
    };
    Line::from(vec![
        Span::styled(
            format!("{}: ", label),
            Style::default()
                .fg(palette.muted)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            text,
            Style::default().fg(if active { palette.accent } else { palette.fg }),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingsScope;
    use crate::render::TaskOrder;
    use crate::testing::MemoryApi;
    use crate::week::{parse_date, WindowPreset};

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn press(app: &mut App<MemoryApi>, code: KeyCode) -> bool {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App<MemoryApi>, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    fn app_with_category(dir: &tempfile::TempDir) -> App<MemoryApi> {
        let today = d("2026-10-19");
        let mut board = BoardController::new(
            MemoryApi::new(),
            WindowPreset::FourDay.rule(),
            TaskOrder::DoneLast,
            today,
        );
        board.load().unwrap();
        board.add_category("Ops", "#f00").unwrap();
        let location = SettingsLocation {
            path: dir.path().join("config.yml"),
            scope: SettingsScope::Global,
        };
        let mut app = App::new(board, &Settings::default(), location, today);
        app.reload();
        app
    }

    #[test]
    fn adding_a_task_through_the_form() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_category(&dir);
        press(&mut app, KeyCode::Char('a'));
        assert!(matches!(app.mode, Mode::Form(_)));
        type_text(&mut app, "Ship report");
        press(&mut app, KeyCode::Enter);

        assert!(matches!(app.mode, Mode::Normal));
        let tasks = &app.board.state().categories[0].tasks;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "Ship report");
        assert_eq!(app.selected().and_then(|r| r.task).map(|t| t.task_id), Some(tasks[0].id));
    }

    #[test]
    fn empty_task_keeps_form_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_category(&dir);
        press(&mut app, KeyCode::Char('a'));
        press(&mut app, KeyCode::Enter);
        assert!(matches!(app.mode, Mode::Form(_)));
        assert_eq!(app.status, "task text cannot be empty");
        press(&mut app, KeyCode::Esc);
        assert!(matches!(app.mode, Mode::Normal));
    }

    #[test]
    fn failed_call_raises_blocking_alert() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_category(&dir);
        app.board.api().set_offline(true);
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "Ship report");
        press(&mut app, KeyCode::Enter);

        match &app.mode {
            Mode::Alert(message) => assert!(message.starts_with("Error adding task")),
            _ => panic!("expected an alert"),
        }
        assert!(!press(&mut app, KeyCode::Char('q')));
        press(&mut app, KeyCode::Enter);
        assert!(matches!(app.mode, Mode::Normal));
        assert!(app.board.state().categories[0].tasks.is_empty());
    }

    #[test]
    fn space_toggles_done_and_note_is_saved_from_day_cell() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_category(&dir);
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "Ship report");
        press(&mut app, KeyCode::Enter);
        let id = app.board.state().categories[0].tasks[0].id;

        press(&mut app, KeyCode::Char(' '));
        assert!(app.board.state().find_task(id).unwrap().done);

        press(&mut app, KeyCode::Char('l'));
        assert_eq!(app.column, Column::Day(0));
        press(&mut app, KeyCode::Enter);
        type_text(&mut app, "call vendor");
        press(&mut app, KeyCode::Enter);
        let note = app.board.state().note_for(id, d("2026-10-16")).unwrap();
        assert_eq!(note.content, "call vendor");
    }

    #[test]
    fn deleting_a_task_needs_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_category(&dir);
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "Temporary");
        press(&mut app, KeyCode::Enter);

        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.board.state().categories[0].tasks.len(), 1);

        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Char('y'));
        assert!(app.board.state().categories[0].tasks.is_empty());
        assert_eq!(app.row, 0);
    }

    #[test]
    fn theme_toggle_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_category(&dir);
        press(&mut app, KeyCode::Char('T'));
        assert_eq!(app.theme, Theme::Light);
        let saved = std::fs::read_to_string(dir.path().join("config.yml")).unwrap();
        assert!(saved.contains("theme: light"));
    }

    #[test]
    fn window_navigation_moves_by_a_week() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_category(&dir);
        press(&mut app, KeyCode::Char(']'));
        assert_eq!(app.board.state().week_start, d("2026-10-23"));
        press(&mut app, KeyCode::Char('t'));
        assert_eq!(app.board.state().week_start, d("2026-10-16"));
    }

    #[test]
    fn columns_stop_at_the_edges() {
        assert_eq!(Column::Person.prev(), Column::Person);
        assert_eq!(Column::Task.next(4), Column::Day(0));
        assert_eq!(Column::Day(3).next(4), Column::Day(3));
        assert_eq!(Column::Day(0).prev(), Column::Task);
    }

    #[test]
    fn control_characters_are_blanked() {
        assert_eq!(sanitize("a\u{1b}[2Jb\nc"), "a [2Jb c");
        assert_eq!(sanitize("<b>bold</b>"), "<b>bold</b>");
    }

    #[test]
    fn category_colors_accept_short_hex() {
        assert_eq!(category_color("#f00", 0), Color::Rgb(255, 0, 0));
        assert_eq!(category_color("#4a90d9", 0), Color::Rgb(0x4a, 0x90, 0xd9));
        assert_eq!(category_color("not-a-color", 1), color_for_index(1));
    }

    #[test]
    fn field_editing_respects_char_boundaries() {
        let mut field = FieldValue::new("né");
        field.backspace();
        assert_eq!(field.value, "n");
        field.insert_char('ö');
        field.move_left();
        field.insert_char('x');
        assert_eq!(field.value, "nxö");
        field.home();
        field.delete();
        assert_eq!(field.value, "xö");
        assert_eq!(field.with_caret(), "▌xö");
    }

    #[test]
    fn offset_follows_selection() {
        assert_eq!(adjust_offset(0, 0, 5, 1, 20), 0);
        assert_eq!(adjust_offset(10, 0, 5, 1, 20), 7);
        assert_eq!(adjust_offset(19, 7, 5, 1, 20), 15);
    }
}
