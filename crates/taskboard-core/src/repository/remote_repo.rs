//! Remote Task Repository
//!
//! Talks to the row-store's REST interface (`/rest/v1/<table>`). Every
//! operation is its own round trip and every backend error reaches the
//! caller with a description of what was being attempted.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::error::{RepositoryError, RepositoryResult};
use super::traits::Repository;
use crate::domain::{Entity, Task, TaskId};

/// Table holding the task rows
pub const DEFAULT_TABLE: &str = "tasks";

/// Row-level code for "no row matched a single-object request"
const NO_ROWS_CODE: &str = "PGRST116";

/// Ask for one JSON object instead of an array
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Row-level error body
#[derive(Debug, Deserialize)]
struct RowError {
    code: String,
    message: String,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// Network-backed implementation of the task repository
#[derive(Debug, Clone)]
pub struct RemoteTaskRepository {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl RemoteTaskRepository {
    /// `url` is the project base URL, `api_key` is sent on every request
    pub fn new(url: &str, api_key: impl Into<String>, table: &str) -> Self {
        Self::with_client(Client::new(), url, api_key, table)
    }

    pub fn with_client(client: Client, url: &str, api_key: impl Into<String>, table: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/rest/v1/{}", url.trim_end_matches('/'), table),
            api_key: api_key.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.client
            .request(method, &self.endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder, context: String) -> RepositoryResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|source| RepositoryError::Http {
                context: context.clone(),
                source,
            })?;
        check_status(response, context).await
    }
}

/// Pass successful responses through, turn the rest into errors
async fn check_status(response: Response, context: String) -> RepositoryResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("<unreadable body: {e}>"),
    };
    match serde_json::from_str::<RowError>(&body) {
        Ok(row) => Err(RepositoryError::Backend {
            context,
            code: row.code,
            message: row.message,
            details: row.details,
            hint: row.hint,
        }),
        Err(_) => Err(RepositoryError::Status {
            context,
            status: status.as_u16(),
            body,
        }),
    }
}

/// Read the whole body and parse it as `T`
async fn decode<T: DeserializeOwned>(response: Response, context: String) -> RepositoryResult<T> {
    let bytes = response.bytes().await.map_err(|source| RepositoryError::Http {
        context: context.clone(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| RepositoryError::Decode { context, source })
}

#[async_trait]
impl Repository<Task> for RemoteTaskRepository {
    async fn save(&self, entity: &Task) -> RepositoryResult<()> {
        let request = self
            .request(Method::POST)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(entity);
        self.send(request, format!("Failed to save task {}", entity.id()))
            .await?;
        debug!(task_id = %entity.id(), "Task upserted");
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> RepositoryResult<Option<Task>> {
        let filter = format!("eq.{id}");
        let request = self
            .request(Method::GET)
            .query(&[("select", "*"), ("id", filter.as_str())])
            .header(ACCEPT, SINGLE_OBJECT);
        let context = format!("Failed to fetch task {id}");

        match self.send(request, context.clone()).await {
            Ok(response) => Ok(Some(decode(response, context).await?)),
            Err(e) if e.code() == Some(NO_ROWS_CODE) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_all(&self) -> RepositoryResult<Vec<Task>> {
        let request = self
            .request(Method::GET)
            .query(&[("select", "*"), ("order", "created_at.asc")]);
        let context = "Failed to fetch tasks".to_string();
        let response = self.send(request, context.clone()).await?;
        decode(response, context).await
    }

    async fn delete(&self, id: &TaskId) -> RepositoryResult<()> {
        let filter = format!("eq.{id}");
        let request = self
            .request(Method::DELETE)
            .query(&[("id", filter.as_str())])
            .header("Prefer", "return=minimal");
        self.send(request, format!("Failed to delete task {id}"))
            .await?;
        debug!(task_id = %id, "Task deleted");
        Ok(())
    }

    /// Fetches every row and deletes them one by one.
    ///
    /// One round trip per row: slow for large tables, but it only needs the
    /// same row-level permissions as a single delete. Stops at the first
    /// failure, leaving the remaining rows in place.
    async fn clear_all(&self) -> RepositoryResult<()> {
        let tasks = self.get_all().await?;
        let total = tasks.len();
        for (done, task) in tasks.iter().enumerate() {
            if let Err(e) = self.delete(task.id()).await {
                warn!(deleted = done, total, error = %e, "Clearing tasks stopped");
                return Err(e);
            }
        }
        debug!(count = total, "All tasks deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PATH: &str = "/rest/v1/tasks";

    fn repo(server: &MockServer) -> RemoteTaskRepository {
        RemoteTaskRepository::new(&server.uri(), "anon-key", DEFAULT_TABLE)
    }

    fn row(id: &str, title: &str, completed: bool, created_at: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "description": null,
            "is_completed": completed,
            "created_at": created_at,
        })
    }

    #[test]
    fn test_endpoint() {
        let repo = RemoteTaskRepository::new("https://demo.example.co/", "k", "tasks");
        assert_eq!(repo.endpoint(), "https://demo.example.co/rest/v1/tasks");
    }

    #[tokio::test]
    async fn test_save_upserts_by_id() {
        let server = MockServer::start().await;
        let task = Task::new("Buy milk", None);

        Mock::given(method("POST"))
            .and(path(PATH))
            .and(query_param("on_conflict", "id"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .and(body_json(serde_json::to_value(&task).unwrap()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        repo(&server).save(&task).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_all_orders_by_creation() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PATH))
            .and(query_param("select", "*"))
            .and(query_param("order", "created_at.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                row("a", "first", false, "2024-03-01T10:00:00+00:00"),
                row("b", "second", true, "2024-03-01T11:00:00.5+00:00"),
            ])))
            .mount(&server)
            .await;

        let tasks = repo(&server).get_all().await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "first");
        assert!(tasks[1].is_completed());
    }

    #[tokio::test]
    async fn test_get_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PATH))
            .and(query_param("id", "eq.a"))
            .and(header("accept", SINGLE_OBJECT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(row("a", "first", false, "2024-03-01T10:00:00+00:00")),
            )
            .mount(&server)
            .await;

        let task = repo(&server).get(&TaskId::from("a")).await.unwrap().unwrap();
        assert_eq!(task.title, "first");
    }

    #[tokio::test]
    async fn test_get_no_rows_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(406).set_body_json(json!({
                "code": "PGRST116",
                "message": "JSON object requested, multiple (or no) rows returned",
                "details": "The result contains 0 rows",
                "hint": null,
            })))
            .mount(&server)
            .await;

        let found = repo(&server).get(&TaskId::from("missing")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_row_error_is_wrapped() {
        let server = MockServer::start().await;
        let task = Task::new("Dup", None);

        Mock::given(method("POST"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint",
                "details": null,
                "hint": null,
            })))
            .mount(&server)
            .await;

        let err = repo(&server).save(&task).await.unwrap_err();
        assert_eq!(err.code(), Some("23505"));
        let message = err.to_string();
        assert!(message.contains("Failed to save task"));
        assert!(message.contains("duplicate key"));
    }

    #[tokio::test]
    async fn test_plain_status_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = repo(&server).get_all().await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Status { status: 503, ref body, .. } if body == "upstream down"
        ));
    }

    #[tokio::test]
    async fn test_malformed_rows_are_a_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "a"}])))
            .mount(&server)
            .await;

        let err = repo(&server).get_all().await.unwrap_err();
        assert!(matches!(err, RepositoryError::Decode { .. }));
        assert!(err.to_string().starts_with("Failed to fetch tasks"));

        let err = repo(&server).get(&TaskId::from("a")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_delete_matches_id() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(PATH))
            .and(query_param("id", "eq.a"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        repo(&server).delete(&TaskId::from("a")).await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_all_deletes_each_row() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                row("a", "one", false, "2024-03-01T10:00:00+00:00"),
                row("b", "two", false, "2024-03-01T10:00:01+00:00"),
                row("c", "three", true, "2024-03-01T10:00:02+00:00"),
            ])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(204))
            .expect(3)
            .mount(&server)
            .await;

        repo(&server).clear_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_all_surfaces_delete_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                row("a", "one", false, "2024-03-01T10:00:00+00:00"),
            ])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "code": "42501",
                "message": "permission denied for table tasks",
            })))
            .mount(&server)
            .await;

        let err = repo(&server).clear_all().await.unwrap_err();
        assert_eq!(err.code(), Some("42501"));
    }
}
