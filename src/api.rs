use crate::model::{Category, CategoryId, Note, Person, PersonId, Task, TaskId};
use crate::week::{format_date, DateRange};
use chrono::NaiveDate;
use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct InitPayload {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub people: Vec<Person>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct NewTask {
    pub category_id: CategoryId,
    pub text: String,
}

/// Partial task update; only the fields that are `Some` are sent.
/// `person_id: Some(None)` serializes as `null` and unassigns the task.
#[derive(Debug, Serialize, Clone, PartialEq, Default)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<Option<PersonId>>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Default)]
pub struct CategoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct NewPerson {
    pub name: String,
}

impl TaskPatch {
    pub fn done(done: bool) -> Self {
        TaskPatch {
            done: Some(done),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        TaskPatch {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn person(person_id: Option<PersonId>) -> Self {
        TaskPatch {
            person_id: Some(person_id),
            ..Default::default()
        }
    }
}

impl CategoryPatch {
    pub fn name(name: impl Into<String>) -> Self {
        CategoryPatch {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn order(order: i64) -> Self {
        CategoryPatch {
            order: Some(order),
            ..Default::default()
        }
    }
}

/// The REST contract of the board backend.
pub trait BoardApi: Send + Sync {
    fn init(&self) -> Result<InitPayload, ApiError>;
    fn notes(&self, range: Option<DateRange>) -> Result<Vec<Note>, ApiError>;
    fn create_task(&self, task: &NewTask) -> Result<Task, ApiError>;
    fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError>;
    fn delete_task(&self, id: TaskId) -> Result<(), ApiError>;
    fn create_category(&self, category: &NewCategory) -> Result<Category, ApiError>;
    fn update_category(&self, id: CategoryId, patch: &CategoryPatch)
        -> Result<Category, ApiError>;
    fn delete_category(&self, id: CategoryId) -> Result<(), ApiError>;
    fn create_person(&self, person: &NewPerson) -> Result<Person, ApiError>;
    fn delete_person(&self, id: PersonId) -> Result<(), ApiError>;
    fn upsert_note(&self, note: &Note) -> Result<Note, ApiError>;
    fn backup(&self) -> Result<serde_json::Value, ApiError>;
    fn restore(&self, snapshot: &serde_json::Value) -> Result<(), ApiError>;
    fn export_pdf(&self, week_start: NaiveDate) -> Result<Vec<u8>, ApiError>;
}

pub struct HttpApi {
    base_url: String,
    client: Client,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(HttpApi {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(
        &self,
        method: &str,
        path: &str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        debug!("event=http_request method={} path={}", method, path);
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn json<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let text = self.send(method, path, request)?.text()?;
        Ok(serde_json::from_str(&text)?)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.json("GET", path, self.client.get(self.url(path)))
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.json("POST", path, self.client.post(self.url(path)).json(body))
    }

    fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.json("PUT", path, self.client.put(self.url(path)).json(body))
    }

    fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send("DELETE", path, self.client.delete(self.url(path)))?;
        Ok(())
    }
}

impl BoardApi for HttpApi {
    fn init(&self) -> Result<InitPayload, ApiError> {
        self.get("/api/init")
    }

    fn notes(&self, range: Option<DateRange>) -> Result<Vec<Note>, ApiError> {
        let path = "/api/notes";
        let mut request = self.client.get(self.url(path));
        if let Some(range) = range {
            request = request.query(&[
                ("start_date", format_date(range.start)),
                ("end_date", format_date(range.end)),
            ]);
        }
        self.json("GET", path, request)
    }

    fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
        self.post("/api/tasks", task)
    }

    fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
        self.put(&format!("/api/tasks/{}", id), patch)
    }

    fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        self.delete(&format!("/api/tasks/{}", id))
    }

    fn create_category(&self, category: &NewCategory) -> Result<Category, ApiError> {
        self.post("/api/categories", category)
    }

    fn update_category(
        &self,
        id: CategoryId,
        patch: &CategoryPatch,
    ) -> Result<Category, ApiError> {
        self.put(&format!("/api/categories/{}", id), patch)
    }

    fn delete_category(&self, id: CategoryId) -> Result<(), ApiError> {
        self.delete(&format!("/api/categories/{}", id))
    }

    fn create_person(&self, person: &NewPerson) -> Result<Person, ApiError> {
        self.post("/api/people", person)
    }

    fn delete_person(&self, id: PersonId) -> Result<(), ApiError> {
        self.delete(&format!("/api/people/{}", id))
    }

    fn upsert_note(&self, note: &Note) -> Result<Note, ApiError> {
        self.post("/api/notes", note)
    }

    fn backup(&self) -> Result<serde_json::Value, ApiError> {
        self.get("/api/backup")
    }

    fn restore(&self, snapshot: &serde_json::Value) -> Result<(), ApiError> {
        let path = "/api/restore";
        self.send("POST", path, self.client.post(self.url(path)).json(snapshot))?;
        Ok(())
    }

    fn export_pdf(&self, week_start: NaiveDate) -> Result<Vec<u8>, ApiError> {
        let path = "/api/export-pdf";
        let request = self
            .client
            .get(self.url(path))
            .query(&[("week_start", format_date(week_start))]);
        Ok(self.send("GET", path, request)?.bytes()?.to_vec())
    }
}
