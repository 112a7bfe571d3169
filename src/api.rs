use crate::auth::{ROLE_HEADER, USER_HEADER};
use crate::mock_data;
use crate::models::{Actor, NewTask, SubmissionReceipt, Task, TaskPatch};
use crate::routes::FILES_FIELD;
use crate::views::TaskQuery;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{message} ({code})")]
    Status { code: u16, message: String },

    #[error("Select at least one file to submit")]
    NoFiles,

    #[error("Could not read {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// A task list as the client received it.
#[derive(Clone, Debug, Default)]
pub struct TaskSnapshot {
    pub tasks: Vec<Task>,
    /// The API was unreachable and `tasks` is the built-in demo set.
    pub offline: bool,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    actor: Actor,
}

impl ApiClient {
    pub fn new(base_url: &str, actor: Actor) -> Self {
        ApiClient {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            actor,
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(USER_HEADER, &self.actor.id)
            .header(ROLE_HEADER, self.actor.role.as_str())
    }

    pub async fn fetch_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        let text = query.text.trim();
        if !text.is_empty() {
            params.push(("q", text));
        }
        if let Some(status) = query.status.as_query() {
            params.push(("status", status));
        }
        let res = self.request(Method::GET, "/tasks").query(&params).send().await?;
        Ok(check(res).await?.json::<Vec<Task>>().await?)
    }

    /// Lists tasks, falling back to the demo set when the API is unavailable.
    pub async fn load_tasks(&self, query: &TaskQuery) -> TaskSnapshot {
        match self.fetch_tasks(query).await {
            Ok(tasks) => TaskSnapshot {
                tasks,
                offline: false,
            },
            Err(err) => {
                warn!(error = %err, "task list unavailable, showing demo data");
                let tasks = mock_data::demo_tasks().unwrap_or_else(|err| {
                    warn!(error = %err, "demo data is corrupt");
                    Vec::new()
                });
                TaskSnapshot {
                    tasks: crate::views::filter_tasks(&tasks, query),
                    offline: true,
                }
            }
        }
    }

    pub async fn fetch_task(&self, id: &str) -> Result<Task, ApiError> {
        let res = self.request(Method::GET, &format!("/tasks/{id}")).send().await?;
        Ok(check(res).await?.json::<Task>().await?)
    }

    pub async fn create_task(&self, new: &NewTask) -> Result<Task, ApiError> {
        let res = self.request(Method::POST, "/tasks").json(new).send().await?;
        Ok(check(res).await?.json::<Task>().await?)
    }

    pub async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, ApiError> {
        let res = self
            .request(Method::PATCH, &format!("/tasks/{id}"))
            .json(patch)
            .send()
            .await?;
        Ok(check(res).await?.json::<Task>().await?)
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), ApiError> {
        let res = self.request(Method::DELETE, &format!("/tasks/{id}")).send().await?;
        check(res).await?;
        Ok(())
    }

    /// Uploads local files as a submission. Nothing is sent for an empty selection.
    pub async fn submit_files(
        &self,
        id: &str,
        paths: &[PathBuf],
    ) -> Result<SubmissionReceipt, ApiError> {
        if paths.is_empty() {
            return Err(ApiError::NoFiles);
        }
        let mut form = Form::new();
        for path in paths {
            let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::File {
                path: path.clone(),
                source,
            })?;
            form = form.part(FILES_FIELD, Part::bytes(bytes).file_name(file_name(path)));
        }
        debug!(%id, files = paths.len(), "submitting files");
        let res = self
            .request(Method::POST, &format!("/tasks/{id}/submissions"))
            .multipart(form)
            .send()
            .await?;
        Ok(check(res).await?.json::<SubmissionReceipt>().await?)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("upload"))
}

async fn check(res: Response) -> Result<Response, ApiError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let text = res.text().await?;
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ApiError::Status {
        code: status.as_u16(),
        message,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Role, StatusFilter, TaskStatus};
    use crate::routes::{AppState, UploadLimits};
    use crate::store::TaskStore;
    use crate::uploads::UploadStore;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tempfile::TempDir;

    pub(crate) async fn spawn_server() -> (String, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState {
            store: Arc::new(TaskStore::in_memory()),
            uploads: Arc::new(UploadStore::prepare(dir.path().join("uploads")).await.unwrap()),
            limits: UploadLimits {
                max_files: 4,
                max_file_bytes: 1024,
            },
        };
        let app = crate::server::router(state, None);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), dir)
    }

    pub(crate) fn mentor(url: &str) -> ApiClient {
        ApiClient::new(url, Actor { id: "jane".into(), role: Role::Mentor })
    }

    fn student(url: &str, id: &str) -> ApiClient {
        ApiClient::new(url, Actor { id: id.into(), role: Role::Student })
    }

    pub(crate) fn new_task(title: &str, assigned_to: &str) -> NewTask {
        NewTask {
            title: title.into(),
            description: "Collect the numbers. Draw the chart. Explain it.".into(),
            image: None,
            status: None,
            priority: None,
            progress: Some(10),
            assigned_to: assigned_to.into(),
            due_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_list_and_update() {
        let (url, _dir) = spawn_server().await;
        let created = mentor(&url).create_task(&new_task("Quarterly report", "student1")).await.unwrap();
        mentor(&url).create_task(&new_task("Unrelated", "student2")).await.unwrap();

        let query = TaskQuery::new("quarterly", StatusFilter::All);
        let found = student(&url, "student1").fetch_tasks(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, created.id);

        let updated = student(&url, "student1")
            .update_task(&created.id, &TaskPatch::status(TaskStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::InProgress);

        let err = student(&url, "student2")
            .update_task(&created.id, &TaskPatch::status(TaskStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Status { code: 403, .. }));
    }

    #[tokio::test]
    async fn test_submit_files_completes_task() {
        let (url, dir) = spawn_server().await;
        let task = mentor(&url).create_task(&new_task("Essay", "student1")).await.unwrap();

        let path = dir.path().join("essay draft.md");
        std::fs::write(&path, "# Essay").unwrap();
        let receipt = student(&url, "student1")
            .submit_files(&task.id, &[path])
            .await
            .unwrap();
        assert!(receipt.ok);
        assert_eq!(receipt.task.status, TaskStatus::Completed);
        assert_eq!(receipt.task.progress, 100);
        assert!(receipt.files[0].filename.ends_with("essay_draft.md"));
    }

    #[tokio::test]
    async fn test_submit_nothing_never_reaches_server() {
        let client = student("http://127.0.0.1:1", "student1");
        assert!(matches!(client.submit_files("x", &[]).await, Err(ApiError::NoFiles)));
    }

    #[tokio::test]
    async fn test_error_body_becomes_message() {
        let (url, _dir) = spawn_server().await;
        let err = student(&url, "student1").fetch_task("missing").await.unwrap_err();
        match err {
            ApiError::Status { code, message } => {
                assert_eq!(code, 404);
                assert_eq!(message, "Task not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_api_falls_back_to_demo_data() {
        let client = student("http://127.0.0.1:1", "student1");
        let snapshot = client.load_tasks(&TaskQuery::default()).await;
        assert!(snapshot.offline);
        assert_eq!(snapshot.tasks.len(), 5);

        let filtered = client
            .load_tasks(&TaskQuery::new("", StatusFilter::Only(TaskStatus::Pending)))
            .await;
        assert_eq!(filtered.tasks.len(), 2);
    }
}
