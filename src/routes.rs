use crate::auth::require_mentor;
use crate::error::AppError;
use crate::models::{Actor, NewTask, StatusFilter, SubmissionReceipt, SubmittedFile, Task, TaskPatch};
use crate::store::TaskStore;
use crate::uploads::UploadStore;
use crate::views::TaskQuery;
use axum::{
    extract::{
        multipart::{Field, MultipartError},
        rejection::JsonRejection,
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Multipart field carrying submission files.
pub const FILES_FIELD: &str = "files";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TaskStore>,
    pub uploads: Arc<UploadStore>,
    pub limits: UploadLimits,
}

#[derive(Clone, Copy, Debug)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_bytes: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    q: Option<String>,
    status: Option<String>,
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn list_tasks_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Task>>, AppError> {
    let status: StatusFilter = params.status.as_deref().unwrap_or_default().parse()?;
    let query = TaskQuery::new(params.q.unwrap_or_default(), status);
    Ok(Json(state.store.list(&query).await))
}

pub async fn get_task_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(state.store.get(&id).await?))
}

pub async fn create_task_handler(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    require_mentor(&actor)?;
    let Json(new) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let task = state.store.create(new).await?;
    info!(id = %task.id, by = %actor.id, assigned_to = %task.assigned_to, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task_handler(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<Task>, AppError> {
    let Json(patch) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let task = state
        .store
        .modify(&id, |task| {
            if !actor.can_edit(task) {
                return Err(AppError::Forbidden("Can only update your own tasks".into()));
            }
            task.apply(patch, Utc::now())?;
            Ok(())
        })
        .await?;
    info!(id = %task.id, by = %actor.id, status = %task.status, "task updated");
    Ok(Json(task))
}

pub async fn delete_task_handler(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_mentor(&actor)?;
    state.store.delete(&id).await?;
    info!(%id, by = %actor.id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit_handler(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<SubmissionReceipt>, AppError> {
    let task = state.store.get(&id).await?;
    if task.assigned_to != actor.id {
        return Err(AppError::Forbidden("Can only submit your own tasks".into()));
    }

    let mut saved: Vec<SubmittedFile> = Vec::new();
    let outcome = receive_files(&state, &mut multipart, &mut saved).await;
    let outcome = match outcome {
        Ok(()) if saved.is_empty() => Err(AppError::Validation("At least one file is required".into())),
        other => other,
    };
    if let Err(err) = outcome {
        state.uploads.discard(&saved).await;
        return Err(err);
    }

    // the assignment may have changed while files were streaming in
    let completed = state
        .store
        .modify(&id, |task| {
            if task.assigned_to != actor.id {
                return Err(AppError::Forbidden("Can only submit your own tasks".into()));
            }
            task.complete(Utc::now());
            Ok(())
        })
        .await;
    let task = match completed {
        Ok(task) => task,
        Err(err) => {
            state.uploads.discard(&saved).await;
            return Err(err);
        }
    };

    info!(id = %task.id, by = %actor.id, files = saved.len(), "submission accepted");
    Ok(Json(SubmissionReceipt {
        ok: true,
        files: saved,
        task,
    }))
}

async fn receive_files(
    state: &AppState,
    multipart: &mut Multipart,
    saved: &mut Vec<SubmittedFile>,
) -> Result<(), AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        if saved.len() == state.limits.max_files {
            return Err(AppError::Validation(format!(
                "At most {} files per submission",
                state.limits.max_files
            )));
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let bytes = read_limited(field, state.limits.max_file_bytes, &name).await?;
        let file = state
            .uploads
            .save(&name, &bytes)
            .await
            .map_err(AppError::internal)?;
        saved.push(file);
    }
    Ok(())
}

async fn read_limited(mut field: Field<'_>, limit: usize, name: &str) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > limit {
            return Err(AppError::Validation(format!(
                "{name} is larger than {} bytes",
                limit
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::Validation(err.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ROLE_HEADER, USER_HEADER};
    use crate::models::{Priority, TaskStatus};
    use crate::server::router;
    use axum::{body::Body, http::Request, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "taskboard-test-boundary";

    struct Harness {
        app: Router,
        store: Arc<TaskStore>,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::in_memory());
        let uploads = Arc::new(UploadStore::prepare(dir.path().join("uploads")).await.unwrap());
        let state = AppState {
            store: store.clone(),
            uploads,
            limits: UploadLimits {
                max_files: 2,
                max_file_bytes: 16,
            },
        };
        Harness {
            app: router(state, None),
            store,
            _dir: dir,
        }
    }

    async fn seed(store: &TaskStore, title: &str, assigned_to: &str, progress: i64) -> Task {
        store
            .create(NewTask {
                title: title.into(),
                description: format!("{title} details"),
                image: None,
                status: Some(TaskStatus::InProgress),
                priority: Some(Priority::High),
                progress: Some(progress),
                assigned_to: assigned_to.into(),
                due_date: chrono::NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            })
            .await
            .unwrap()
    }

    fn as_user(builder: axum::http::request::Builder, id: &str, role: &str) -> axum::http::request::Builder {
        builder.header(USER_HEADER, id).header(ROLE_HEADER, role)
    }

    fn multipart_body(files: &[(&str, &str)]) -> Body {
        let mut body = Vec::new();
        for (name, content) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn submission(id: &str, user: &str, files: &[(&str, &str)]) -> Request<Body> {
        as_user(Request::post(format!("/tasks/{id}/submissions")), user, "student")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(multipart_body(files))
            .unwrap()
    }

    async fn json_body(res: axum::response::Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness().await;
        let res = h.app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_list_filters_by_query_and_status() {
        let h = harness().await;
        seed(&h.store, "API Documentation", "student1", 65).await;
        seed(&h.store, "Security Audit", "student2", 0).await;

        let res = h
            .app
            .clone()
            .oneshot(Request::get("/tasks?q=audit&status=in-progress").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["title"], "Security Audit");
        assert_eq!(body[0]["status"], "in-progress");

        let res = h
            .app
            .oneshot(Request::get("/tasks?status=done").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(res).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_get_missing_task_is_404() {
        let h = harness().await;
        let res = h.app.oneshot(Request::get("/tasks/nope").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(res).await, json!({ "error": "Task not found" }));
    }

    #[tokio::test]
    async fn test_only_mentors_create() {
        let h = harness().await;
        let payload = json!({
            "title": "Database Schema Design",
            "description": "Design the schema",
            "assignedTo": "student2",
            "dueDate": "2025-02-10",
            "priority": "high"
        })
        .to_string();

        let res = h
            .app
            .clone()
            .oneshot(
                as_user(Request::post("/tasks"), "student1", "student")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = h
            .app
            .oneshot(
                as_user(Request::post("/tasks"), "jane", "mentor")
                    .header("content-type", "application/json")
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = json_body(res).await;
        assert_eq!(body["status"], "pending");
        assert_eq!(body["dueDate"], "2025-02-10");
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_json() {
        let h = harness().await;
        let res = h
            .app
            .oneshot(
                as_user(Request::post("/tasks"), "jane", "mentor")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"title\": 1}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_patch_requires_identity() {
        let h = harness().await;
        let task = seed(&h.store, "API Documentation", "student1", 65).await;
        let res = h
            .app
            .oneshot(
                Request::patch(format!("/tasks/{}", task.id))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"status":"completed"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_student_patches_only_own_task() {
        let h = harness().await;
        let task = seed(&h.store, "API Documentation", "student1", 65).await;
        let patch = |user: &str| {
            as_user(Request::patch(format!("/tasks/{}", task.id)), user, "student")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"status":"overdue","progress":70}"#))
                .unwrap()
        };

        let res = h.app.clone().oneshot(patch("student2")).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(h.store.get(&task.id).await.unwrap(), task);

        let res = h.app.oneshot(patch("student1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["status"], "overdue");
        assert_eq!(body["progress"], 70);
    }

    #[tokio::test]
    async fn test_mentor_patch_to_completed_sets_full_progress() {
        let h = harness().await;
        let task = seed(&h.store, "Testing Strategy", "student3", 30).await;
        let res = h
            .app
            .oneshot(
                as_user(Request::patch(format!("/tasks/{}", task.id)), "jane", "mentor")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"status":"completed"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["progress"], 100);
    }

    #[tokio::test]
    async fn test_delete_is_mentor_only() {
        let h = harness().await;
        let task = seed(&h.store, "Security Audit", "student2", 0).await;
        let delete = |user: &str, role: &str| {
            as_user(Request::delete(format!("/tasks/{}", task.id)), user, role)
                .body(Body::empty())
                .unwrap()
        };
        let res = h.app.clone().oneshot(delete("student2", "student")).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let res = h.app.clone().oneshot(delete("jane", "mentor")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let res = h.app.oneshot(delete("jane", "mentor")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_submission_completes_task() {
        let h = harness().await;
        let task = seed(&h.store, "API Documentation", "student1", 10).await;

        let res = h
            .app
            .oneshot(submission(&task.id, "student1", &[("report v1.pdf", "%PDF-1.4")]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["task"]["status"], "completed");
        assert_eq!(body["task"]["progress"], 100);
        let files = body["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0]["filename"].as_str().unwrap().ends_with("report_v1.pdf"));
        assert!(files[0]["url"].as_str().unwrap().starts_with("/uploads/"));

        let stored = h.store.get(&task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.progress, 100);
    }

    #[tokio::test]
    async fn test_submission_by_other_student_is_rejected() {
        let h = harness().await;
        let task = seed(&h.store, "API Documentation", "student1", 10).await;
        let res = h
            .app
            .oneshot(submission(&task.id, "student2", &[("x.txt", "x")]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let stored = h.store.get(&task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::InProgress);
        assert_eq!(stored.progress, 10);
    }

    #[tokio::test]
    async fn test_submission_limits() {
        let h = harness().await;
        let task = seed(&h.store, "API Documentation", "student1", 10).await;

        let empty = h.app.clone().oneshot(submission(&task.id, "student1", &[])).await.unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let too_big = h
            .app
            .clone()
            .oneshot(submission(&task.id, "student1", &[("big.bin", &"x".repeat(64))]))
            .await
            .unwrap();
        assert_eq!(too_big.status(), StatusCode::BAD_REQUEST);

        let too_many = h
            .app
            .oneshot(submission(
                &task.id,
                "student1",
                &[("a.txt", "a"), ("b.txt", "b"), ("c.txt", "c")],
            ))
            .await
            .unwrap();
        assert_eq!(too_many.status(), StatusCode::BAD_REQUEST);

        assert_eq!(h.store.get(&task.id).await.unwrap().progress, 10);
    }

    #[tokio::test]
    async fn test_submission_to_missing_task_is_404() {
        let h = harness().await;
        let res = h.app.oneshot(submission("nope", "student1", &[("a.txt", "a")])).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
