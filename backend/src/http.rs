use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::get,
    Router,
};
use chrono::FixedOffset;
use chrono_tz::Tz;
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use shared::{CreateTaskRequest, NewTask, Tab, Task, TaskError, TaskPatch, TaskQuery};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::clock::Clock;
use crate::live::{self, LiveEvent};
use crate::store::{StoreError, TaskStore};

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    zone: Tz,
}

impl AppState {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, zone: Tz) -> Self {
        Self { store, clock, zone }
    }

    fn query_for(&self, params: &TabParams) -> Result<TaskQuery, ApiError> {
        let tab = match params.tab.as_deref() {
            Some(raw) => raw
                .parse::<Tab>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
            None => Tab::default(),
        };

        let now = self.clock.now();
        if let Some(name) = params.tz.as_deref() {
            let zone = name
                .parse::<Tz>()
                .map_err(|_| ApiError::BadRequest(format!("unknown time zone `{name}`")))?;
            return Ok(TaskQuery::for_tab(tab, &now.with_timezone(&zone)));
        }
        match params.utc_offset {
            Some(minutes) => {
                let offset = minutes
                    .checked_mul(60)
                    .and_then(FixedOffset::east_opt)
                    .ok_or_else(|| {
                        ApiError::BadRequest(format!("utc_offset out of range: {minutes}"))
                    })?;
                Ok(TaskQuery::for_tab(tab, &now.with_timezone(&offset)))
            }
            None => Ok(TaskQuery::for_tab(tab, &now.with_timezone(&self.zone))),
        }
    }
}

/// `tab` picks the range. Period bounds use the caller's IANA zone `tz` when
/// given, else the fixed `utc_offset` (minutes east of UTC), else the
/// configured zone.
#[derive(Debug, Default, Deserialize)]
pub struct TabParams {
    pub tab: Option<String>,
    pub tz: Option<String>,
    pub utc_offset: Option<i32>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Task(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/live", get(live_tasks))
        .route(
            "/api/tasks/:id",
            get(get_task)
                .put(update_task)
                .patch(update_task)
                .delete(delete_task),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TabParams>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let query = state.query_for(&params)?;
    Ok(Json(state.store.query(&query).await?))
}

/// Streams a `snapshot` event per result set change. A store failure is sent
/// as a single `failure` event and ends the stream. The live query lives as
/// long as the response body, so a client that disconnects unsubscribes.
async fn live_tasks(
    State(state): State<AppState>,
    Query(params): Query<TabParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let query = state.query_for(&params)?;
    let (subscription, events) = live::watch(Arc::clone(&state.store), query);

    let stream = stream::unfold(
        Some((events, subscription)),
        |feed| async move {
            let (mut events, subscription) = feed?;
            match events.recv().await? {
                LiveEvent::Snapshot(tasks) => {
                    let event = snapshot_event(&tasks);
                    Some((Ok(event), Some((events, subscription))))
                }
                LiveEvent::Failed(message) => {
                    subscription.unsubscribe();
                    let event = Event::default().event("failure").data(message);
                    Some((Ok(event), None))
                }
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn snapshot_event(tasks: &[Task]) -> Event {
    match Event::default().event("snapshot").json_data(tasks) {
        Ok(event) => event,
        Err(err) => Event::default().event("failure").data(err.to_string()),
    }
}

async fn get_task(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Task>, ApiError> {
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or(ApiError::Store(StoreError::NotFound(id)))
}

async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let draft = NewTask::from_input(&payload.text, state.clock.now())?;
    let task = state.store.insert(draft).await?;
    tracing::info!(task_id = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::BadRequest("nothing to update".into()));
    }
    Ok(Json(state.store.update(id, patch).await?))
}

async fn delete_task(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(id).await?;
    tracing::info!(task_id = %id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}
