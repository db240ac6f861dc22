//! Board controller: owns the client-side [`BoardState`] and keeps it in
//! step with the backend.
//!
//! Every mutation is sent to the backend first; the entity the backend
//! answers with is then patched into the cache. A failed call leaves the
//! cache untouched and comes back as a [`SyncError`] naming the action.

use crate::api::{
    ApiError, BoardApi, CategoryPatch, NewCategory, NewPerson, NewTask, TaskPatch,
};
use crate::model::{
    BoardError, BoardState, Category, CategoryId, MoveDirection, Note, OrderChange, Person,
    PersonId, Task, TaskId,
};
use crate::render::{render_matrix, Matrix, TaskOrder};
use crate::week::{format_date, DateRange, WindowRule};
use chrono::{NaiveDate, Utc};
use log::{debug, error, info, warn};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_BACKUP_FILE: &str = "weekboard_backup.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Load,
    LoadNotes,
    AddTask,
    EditCategory,
    MoveCategory,
    ToggleTask,
    EditTask,
    AssignTask,
    DeleteTask,
    SaveNote,
    AddCategory,
    DeleteCategory,
    AddPerson,
    DeletePerson,
    Backup,
    ExportPdf,
}

impl Action {
    /// Stable identifier used in log events.
    pub fn key(self) -> &'static str {
        match self {
            Action::Load => "load",
            Action::LoadNotes => "load_notes",
            Action::AddTask => "add_task",
            Action::EditCategory => "edit_category",
            Action::MoveCategory => "move_category",
            Action::ToggleTask => "toggle_task",
            Action::EditTask => "edit_task",
            Action::AssignTask => "assign_task",
            Action::DeleteTask => "delete_task",
            Action::SaveNote => "save_note",
            Action::AddCategory => "add_category",
            Action::DeleteCategory => "delete_category",
            Action::AddPerson => "add_person",
            Action::DeletePerson => "delete_person",
            Action::Backup => "backup",
            Action::ExportPdf => "export_pdf",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Action::Load => "Error loading board",
            Action::LoadNotes => "Error loading notes",
            Action::AddTask => "Error adding task",
            Action::EditCategory => "Error updating category",
            Action::MoveCategory => "Error moving category",
            Action::ToggleTask => "Error updating task status",
            Action::EditTask => "Error updating task",
            Action::AssignTask => "Error assigning task",
            Action::DeleteTask => "Error deleting task",
            Action::SaveNote => "Error saving note",
            Action::AddCategory => "Error creating category",
            Action::DeleteCategory => "Error deleting category",
            Action::AddPerson => "Error adding person",
            Action::DeletePerson => "Error deleting person",
            Action::Backup => "Error backing up data",
            Action::ExportPdf => "Error exporting PDF",
        };
        f.write_str(message)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("{action}: {source}")]
    Api {
        action: Action,
        #[source]
        source: ApiError,
    },
    #[error("{action}: {source}")]
    Io {
        action: Action,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("{0} cannot be empty")]
    Empty(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum RestoreError {
    #[error("Invalid backup file: {0}")]
    InvalidFile(String),
    #[error("Restore failed: {0}")]
    RequestFailed(#[source] ApiError),
    #[error("Restore succeeded but reloading failed: {0}")]
    Reload(#[source] SyncError),
}

impl SyncError {
    pub fn action(&self) -> Option<Action> {
        match self {
            SyncError::Api { action, .. } | SyncError::Io { action, .. } => Some(*action),
            SyncError::Board(_) | SyncError::Empty(_) => None,
        }
    }
}

pub struct BoardController<A: BoardApi> {
    api: A,
    rule: WindowRule,
    order: TaskOrder,
    state: BoardState,
}

impl<A: BoardApi> BoardController<A> {
    pub fn new(api: A, rule: WindowRule, order: TaskOrder, today: NaiveDate) -> Self {
        BoardController {
            api,
            rule,
            order,
            state: BoardState::new(rule.anchor_for(today)),
        }
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn rule(&self) -> &WindowRule {
        &self.rule
    }

    #[cfg(test)]
    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn window(&self) -> DateRange {
        self.rule.range(self.state.week_start)
    }

    pub fn matrix(&self, today: NaiveDate) -> Matrix {
        render_matrix(&self.state, &self.rule, today, self.order)
    }

    /// Full reload: categories, tasks and people, then the notes of the
    /// visible window.
    pub fn load(&mut self) -> Result<(), SyncError> {
        let payload = self.call(Action::Load, |api| api.init())?;
        debug!(
            "event=board_loaded categories={} people={}",
            payload.categories.len(),
            payload.people.len()
        );
        self.state.replace_board(payload.categories, payload.people);
        self.refresh_notes()
    }

    pub fn refresh_notes(&mut self) -> Result<(), SyncError> {
        let window = self.window();
        let notes = self.call(Action::LoadNotes, |api| api.notes(Some(window)))?;
        self.state.replace_notes(notes);
        Ok(())
    }

    /// Moves the window by `pages` navigation steps and fetches its notes.
    pub fn navigate(&mut self, pages: i64) -> Result<(), SyncError> {
        self.state.week_start = self.rule.shift(self.state.week_start, pages);
        self.refresh_notes()
    }

    /// Re-anchors the window on `date` using the window rule.
    pub fn go_to(&mut self, date: NaiveDate) -> Result<(), SyncError> {
        self.state.week_start = self.rule.anchor_for(date);
        self.refresh_notes()
    }

    pub fn toggle_expanded(&mut self, category_id: CategoryId) -> bool {
        self.state.toggle_expanded(category_id)
    }

    pub fn add_task(&mut self, category_id: CategoryId, text: &str) -> Result<Task, SyncError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::Empty("task text"));
        }
        let request = NewTask {
            category_id,
            text: text.to_string(),
        };
        let task = self.call(Action::AddTask, |api| api.create_task(&request))?;
        info!("event=task_added task_id={} category_id={}", task.id, category_id);
        self.absorb_task(task.clone())?;
        Ok(task)
    }

    pub fn set_done(&mut self, id: TaskId, done: bool) -> Result<Task, SyncError> {
        let task = self.call(Action::ToggleTask, |api| {
            api.update_task(id, &TaskPatch::done(done))
        })?;
        self.state
            .record_done(id, task.done, Utc::now().timestamp_millis());
        self.absorb_task(task.clone())?;
        Ok(task)
    }

    pub fn edit_task_text(&mut self, id: TaskId, text: &str) -> Result<Task, SyncError> {
        let task = self.call(Action::EditTask, |api| {
            api.update_task(id, &TaskPatch::text(text))
        })?;
        self.absorb_task(task.clone())?;
        Ok(task)
    }

    pub fn assign_person(
        &mut self,
        id: TaskId,
        person_id: Option<PersonId>,
    ) -> Result<Task, SyncError> {
        let task = self.call(Action::AssignTask, |api| {
            api.update_task(id, &TaskPatch::person(person_id))
        })?;
        self.absorb_task(task.clone())?;
        Ok(task)
    }

    pub fn delete_task(&mut self, id: TaskId) -> Result<(), SyncError> {
        self.call(Action::DeleteTask, |api| api.delete_task(id))?;
        info!("event=task_deleted task_id={}", id);
        if let Err(err) = self.state.remove_task(id) {
            debug!("event=cache_miss action=delete_task error={}", err);
        }
        Ok(())
    }

    /// Upserts the note at `(task_id, date)`. Empty content clears it.
    pub fn save_note(
        &mut self,
        task_id: TaskId,
        date: NaiveDate,
        content: &str,
    ) -> Result<(), SyncError> {
        let note = Note {
            task_id,
            date,
            content: content.to_string(),
        };
        let saved = self.call(Action::SaveNote, |api| api.upsert_note(&note))?;
        debug!(
            "event=note_saved task_id={} date={} empty={}",
            task_id,
            format_date(date),
            saved.content.is_empty()
        );
        self.state.apply_note(saved);
        Ok(())
    }

    pub fn add_category(&mut self, name: &str, color: &str) -> Result<Category, SyncError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::Empty("category name"));
        }
        let request = NewCategory {
            name: name.to_string(),
            color: color.trim().to_string(),
        };
        let category = self.call(Action::AddCategory, |api| api.create_category(&request))?;
        info!("event=category_added category_id={}", category.id);
        self.state.upsert_category(category.clone());
        Ok(category)
    }

    pub fn rename_category(&mut self, id: CategoryId, name: &str) -> Result<Category, SyncError> {
        let current = self
            .state
            .find_category(id)
            .ok_or(BoardError::CategoryNotFound(id))?;
        if current.name == name {
            return Ok(current.clone());
        }
        if name.trim().is_empty() {
            return Err(SyncError::Empty("category name"));
        }
        let category = self.call(Action::EditCategory, |api| {
            api.update_category(id, &CategoryPatch::name(name))
        })?;
        self.state.upsert_category(category.clone());
        Ok(category)
    }

    /// Swaps the order of a category with its neighbour. The updates are
    /// sent concurrently; if only some of them land they are reverted so
    /// the backend never keeps a half-applied move.
    pub fn move_category(
        &mut self,
        id: CategoryId,
        direction: MoveDirection,
    ) -> Result<(), SyncError> {
        let plan = self.state.swap_plan(id, direction)?;
        let api = &self.api;
        let results: Vec<Result<Category, ApiError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = plan
                .iter()
                .map(|&change| {
                    scope.spawn(move || {
                        api.update_category(change.category_id, &CategoryPatch::order(change.to))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        });

        let mut applied = Vec::new();
        let mut failure = None;
        for (change, result) in plan.iter().zip(results) {
            match result {
                Ok(category) => applied.push((*change, category)),
                Err(source) => {
                    if failure.is_none() {
                        failure = Some(source);
                    }
                }
            }
        }

        let source = match failure {
            None => {
                for (_, category) in applied {
                    self.state.upsert_category(category);
                }
                info!(
                    "event=category_moved category_id={} updates={}",
                    id,
                    plan.len()
                );
                return Ok(());
            }
            Some(source) => source,
        };

        let mut reload = plan.iter().any(OrderChange::renumbers);
        for (change, _) in &applied {
            reload |= !self.rollback_order(*change);
        }
        if reload {
            if let Err(err) = self.load() {
                error!("event=reload_failed error={}", err);
            }
        }
        Err(self.fail(Action::MoveCategory, source))
    }

    pub fn delete_category(&mut self, id: CategoryId) -> Result<(), SyncError> {
        self.call(Action::DeleteCategory, |api| api.delete_category(id))?;
        info!("event=category_deleted category_id={}", id);
        if let Err(err) = self.state.remove_category(id) {
            debug!("event=cache_miss action=delete_category error={}", err);
        }
        Ok(())
    }

    pub fn add_person(&mut self, name: &str) -> Result<Person, SyncError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::Empty("person name"));
        }
        let request = NewPerson {
            name: name.to_string(),
        };
        let person = self.call(Action::AddPerson, |api| api.create_person(&request))?;
        info!("event=person_added person_id={}", person.id);
        self.state.upsert_person(person.clone());
        Ok(person)
    }

    pub fn delete_person(&mut self, id: PersonId) -> Result<(), SyncError> {
        self.call(Action::DeletePerson, |api| api.delete_person(id))?;
        info!("event=person_deleted person_id={}", id);
        if let Err(err) = self.state.remove_person(id) {
            debug!("event=cache_miss action=delete_person error={}", err);
        }
        Ok(())
    }

    /// Downloads the backend snapshot and writes it, pretty-printed, to
    /// `path`.
    pub fn backup_to(&self, path: &Path) -> Result<PathBuf, SyncError> {
        let action = Action::Backup;
        let snapshot = self.call(action, |api| api.backup())?;
        let write = || -> io::Result<()> {
            let mut file = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut file, &snapshot)?;
            file.flush()
        };
        write().map_err(|source| self.fail_io(action, source))?;
        info!("event=backup_written path={}", path.display());
        Ok(path.to_path_buf())
    }

    /// Sends a backup file to the backend verbatim. On success every piece
    /// of client state is dropped and rebuilt from a fresh load anchored on
    /// `today`.
    pub fn restore_from(&mut self, path: &Path, today: NaiveDate) -> Result<(), RestoreError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            warn!("event=restore_failed reason=unreadable error={}", err);
            RestoreError::InvalidFile(format!("{}: {}", path.display(), err))
        })?;
        let snapshot: serde_json::Value = serde_json::from_str(&raw).map_err(|err| {
            warn!("event=restore_failed reason=invalid_json error={}", err);
            RestoreError::InvalidFile(err.to_string())
        })?;
        self.api.restore(&snapshot).map_err(|err| {
            error!("event=restore_failed reason=request error={}", err);
            RestoreError::RequestFailed(err)
        })?;
        info!("event=restore_applied path={}", path.display());
        self.state = BoardState::new(self.rule.anchor_for(today));
        self.load().map_err(RestoreError::Reload)
    }

    /// Fetches the rendered document for the visible window and writes it
    /// to `path`, or to `weekboard-<week_start>.pdf` when none is given.
    pub fn export_pdf_to(&self, path: Option<&Path>) -> Result<PathBuf, SyncError> {
        let action = Action::ExportPdf;
        let week_start = self.state.week_start;
        let bytes = self.call(action, |api| api.export_pdf(week_start))?;
        let target = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(format!("weekboard-{}.pdf", format_date(week_start))));
        fs::write(&target, bytes).map_err(|source| self.fail_io(action, source))?;
        info!("event=pdf_exported path={}", target.display());
        Ok(target)
    }

    fn absorb_task(&mut self, task: Task) -> Result<(), SyncError> {
        if let Err(err) = self.state.upsert_task(task) {
            warn!("event=cache_miss error={} fallback=reload", err);
            self.load()?;
        }
        Ok(())
    }

    /// Re-sends the order a category had before a failed move. Returns
    /// false when the backend refused that too.
    fn rollback_order(&self, change: OrderChange) -> bool {
        let revert = CategoryPatch::order(change.from);
        match self.api.update_category(change.category_id, &revert) {
            Ok(_) => {
                warn!(
                    "event=order_rollback status=ok category_id={} order={}",
                    change.category_id, change.from
                );
                true
            }
            Err(err) => {
                error!(
                    "event=order_rollback status=failed category_id={} error={}",
                    change.category_id, err
                );
                false
            }
        }
    }

    fn call<T>(
        &self,
        action: Action,
        request: impl FnOnce(&A) -> Result<T, ApiError>,
    ) -> Result<T, SyncError> {
        request(&self.api).map_err(|source| self.fail(action, source))
    }

    fn fail(&self, action: Action, source: ApiError) -> SyncError {
        error!("event=sync_failed action={} error={}", action.key(), source);
        SyncError::Api { action, source }
    }

    fn fail_io(&self, action: Action, source: io::Error) -> SyncError {
        error!("event=sync_failed action={} error={}", action.key(), source);
        SyncError::Io { action, source }
    }
}
