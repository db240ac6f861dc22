//! In-memory board backend used by the controller tests. It follows the
//! HTTP contract: auto-incremented ids and orders, cascading deletes and
//! note upserts keyed by `(task_id, date)`.

use crate::api::{
    ApiError, BoardApi, CategoryPatch, InitPayload, NewCategory, NewPerson, NewTask, TaskPatch,
};
use crate::model::{Category, CategoryId, Note, Person, PersonId, Task, TaskId};
use crate::week::DateRange;
use chrono::NaiveDate;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    next_id: i64,
    categories: Vec<Category>,
    tasks: Vec<Task>,
    people: Vec<Person>,
    notes: Vec<Note>,
    calls: Vec<String>,
    offline: bool,
    failing_categories: HashSet<CategoryId>,
    pdf: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct MemoryApi {
    inner: Mutex<Inner>,
}

fn not_found(what: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        body: format!("{} not found", what),
    }
}

fn unavailable() -> ApiError {
    ApiError::Status {
        status: 503,
        body: "backend offline".into(),
    }
}

impl Inner {
    fn enter(&mut self, call: String) -> Result<(), ApiError> {
        self.calls.push(call);
        if self.offline {
            return Err(unavailable());
        }
        Ok(())
    }

    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryApi {
    pub fn new() -> Self {
        MemoryApi::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn fail_category_updates(&self, id: CategoryId) {
        self.lock().failing_categories.insert(id);
    }

    pub fn serve_pdf(&self, bytes: &[u8]) {
        self.lock().pdf = Some(bytes.to_vec());
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn category_order(&self, id: CategoryId) -> Option<i64> {
        self.lock()
            .categories
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.order)
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.lock().tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn note_count(&self) -> usize {
        self.lock().notes.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BoardApi for MemoryApi {
    fn init(&self) -> Result<InitPayload, ApiError> {
        let mut inner = self.lock();
        inner.enter("GET /api/init".into())?;
        let mut categories = inner.categories.clone();
        categories.sort_by_key(|c| c.order);
        for category in categories.iter_mut() {
            let mut tasks: Vec<Task> = inner
                .tasks
                .iter()
                .filter(|t| t.category_id == category.id)
                .cloned()
                .collect();
            tasks.sort_by_key(|t| t.order);
            category.tasks = tasks;
        }
        Ok(InitPayload {
            categories,
            people: inner.people.clone(),
        })
    }

    fn notes(&self, range: Option<DateRange>) -> Result<Vec<Note>, ApiError> {
        let mut inner = self.lock();
        inner.enter("GET /api/notes".into())?;
        Ok(inner
            .notes
            .iter()
            .filter(|n| match range {
                Some(r) => n.date >= r.start && n.date <= r.end,
                None => true,
            })
            .cloned()
            .collect())
    }

    fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
        let mut inner = self.lock();
        inner.enter("POST /api/tasks".into())?;
        if !inner.categories.iter().any(|c| c.id == task.category_id) {
            return Err(not_found("category"));
        }
        let order = inner
            .tasks
            .iter()
            .filter(|t| t.category_id == task.category_id)
            .filter_map(|t| t.order)
            .max()
            .unwrap_or(0)
            + 1;
        let created = Task {
            id: inner.allocate(),
            category_id: task.category_id,
            text: task.text.clone(),
            done: false,
            person_id: None,
            order: Some(order),
        };
        inner.tasks.push(created.clone());
        Ok(created)
    }

    fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
        let mut inner = self.lock();
        inner.enter(format!("PUT /api/tasks/{}", id))?;
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found("task"))?;
        if let Some(done) = patch.done {
            task.done = done;
        }
        if let Some(text) = &patch.text {
            task.text = text.clone();
        }
        if let Some(person_id) = patch.person_id {
            task.person_id = person_id;
        }
        Ok(task.clone())
    }

    fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.enter(format!("DELETE /api/tasks/{}", id))?;
        if !inner.tasks.iter().any(|t| t.id == id) {
            return Err(not_found("task"));
        }
        inner.tasks.retain(|t| t.id != id);
        inner.notes.retain(|n| n.task_id != id);
        Ok(())
    }

    fn create_category(&self, category: &NewCategory) -> Result<Category, ApiError> {
        let mut inner = self.lock();
        inner.enter("POST /api/categories".into())?;
        let order = inner
            .categories
            .iter()
            .filter_map(|c| c.order)
            .max()
            .unwrap_or(0)
            + 1;
        let created = Category {
            id: inner.allocate(),
            name: category.name.clone(),
            color: category.color.clone(),
            order: Some(order),
            tasks: Vec::new(),
        };
        inner.categories.push(created.clone());
        Ok(created)
    }

    fn update_category(
        &self,
        id: CategoryId,
        patch: &CategoryPatch,
    ) -> Result<Category, ApiError> {
        let mut inner = self.lock();
        inner.enter(format!("PUT /api/categories/{}", id))?;
        if inner.failing_categories.contains(&id) {
            return Err(unavailable());
        }
        let category = inner
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| not_found("category"))?;
        if let Some(name) = &patch.name {
            category.name = name.clone();
        }
        if let Some(color) = &patch.color {
            category.color = color.clone();
        }
        if let Some(order) = patch.order {
            category.order = Some(order);
        }
        Ok(category.clone())
    }

    fn delete_category(&self, id: CategoryId) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.enter(format!("DELETE /api/categories/{}", id))?;
        if !inner.categories.iter().any(|c| c.id == id) {
            return Err(not_found("category"));
        }
        inner.categories.retain(|c| c.id != id);
        let removed: HashSet<TaskId> = inner
            .tasks
            .iter()
            .filter(|t| t.category_id == id)
            .map(|t| t.id)
            .collect();
        inner.tasks.retain(|t| t.category_id != id);
        inner.notes.retain(|n| !removed.contains(&n.task_id));
        Ok(())
    }

    fn create_person(&self, person: &NewPerson) -> Result<Person, ApiError> {
        let mut inner = self.lock();
        inner.enter("POST /api/people".into())?;
        let created = Person {
            id: inner.allocate(),
            name: person.name.clone(),
        };
        inner.people.push(created.clone());
        Ok(created)
    }

    fn delete_person(&self, id: PersonId) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.enter(format!("DELETE /api/people/{}", id))?;
        if !inner.people.iter().any(|p| p.id == id) {
            return Err(not_found("person"));
        }
        inner.people.retain(|p| p.id != id);
        for task in inner.tasks.iter_mut() {
            if task.person_id == Some(id) {
                task.person_id = None;
            }
        }
        Ok(())
    }

    fn upsert_note(&self, note: &Note) -> Result<Note, ApiError> {
        let mut inner = self.lock();
        inner.enter("POST /api/notes".into())?;
        let existing = inner
            .notes
            .iter()
            .position(|n| n.task_id == note.task_id && n.date == note.date);
        match existing {
            Some(idx) => inner.notes[idx].content = note.content.clone(),
            None => inner.notes.push(note.clone()),
        }
        Ok(note.clone())
    }

    fn backup(&self) -> Result<serde_json::Value, ApiError> {
        let mut inner = self.lock();
        inner.enter("GET /api/backup".into())?;
        Ok(json!({
            "categories": inner.categories.iter().map(|c| json!({
                "id": c.id, "name": c.name, "color": c.color, "order": c.order,
            })).collect::<Vec<_>>(),
            "people": inner.people,
            "tasks": inner.tasks,
            "notes": inner.notes,
        }))
    }

    fn restore(&self, snapshot: &serde_json::Value) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.enter("POST /api/restore".into())?;
        let bad_request = |body: String| ApiError::Status { status: 400, body };
        if !snapshot.is_object() {
            return Err(bad_request("No data provided".into()));
        }
        let field = |name: &str| snapshot.get(name).cloned().unwrap_or(json!([]));
        let categories: Vec<Category> =
            serde_json::from_value(field("categories")).map_err(|e| bad_request(e.to_string()))?;
        let people: Vec<Person> =
            serde_json::from_value(field("people")).map_err(|e| bad_request(e.to_string()))?;
        let tasks: Vec<Task> =
            serde_json::from_value(field("tasks")).map_err(|e| bad_request(e.to_string()))?;
        let notes: Vec<Note> =
            serde_json::from_value(field("notes")).map_err(|e| bad_request(e.to_string()))?;
        let max_id = categories
            .iter()
            .map(|c| c.id)
            .chain(people.iter().map(|p| p.id))
            .chain(tasks.iter().map(|t| t.id))
            .max()
            .unwrap_or(0);
        inner.next_id = inner.next_id.max(max_id);
        inner.categories = categories;
        inner.people = people;
        inner.tasks = tasks;
        inner.notes = notes;
        Ok(())
    }

    fn export_pdf(&self, week_start: NaiveDate) -> Result<Vec<u8>, ApiError> {
        let mut inner = self.lock();
        inner.enter(format!("GET /api/export-pdf?week_start={}", week_start))?;
        inner.pdf.clone().ok_or_else(|| not_found("export"))
    }
}
