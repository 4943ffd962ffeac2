//! HTTP handlers for the REST API.
//!
//! Each handler forwards to the [`SchedulerHandle`](crate::runtime::handle::SchedulerHandle)
//! and converts domain values into wire DTOs.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};

use super::{
    AppState,
    dto::{
        AddEntryBody, ContestUpdate, HealthResponse, ItemBody, ItemDto, ItemsQuery, MuteBody,
        StatusResponse, RemoveEntryBody, RescheduleBody, SchedulePayload, SnapshotCreate,
    },
    error::AppError,
};
use crate::{
    control::{ControlCommand, LaunchRequest, SourceRef, check_control, dispatch_control},
    schedule::EntryDraft,
    snapshot::SnapshotMeta,
    types::{ItemId, KindFilter, SnapshotId},
};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// JSON body whose rejection is reported as an [`AppError`].
pub type JsonBody<T> = Result<Json<T>, JsonRejection>;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        database: state.database.clone(),
    })
}

// =============================================================================
// Items
// =============================================================================

/// GET /items?kind=video|activity
///
/// An unrecognized `kind` lists everything.
pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> HandlerResult<Vec<ItemDto>> {
    let filter = query
        .kind
        .as_deref()
        .and_then(|kind| kind.parse::<KindFilter>().ok())
        .unwrap_or_default();
    let items = state.scheduler.list_items(filter).await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

/// POST /items
pub async fn create_item(
    State(state): State<AppState>,
    body: JsonBody<ItemBody>,
) -> Result<(StatusCode, Json<ItemDto>), AppError> {
    let Json(body) = body?;
    let item = state.scheduler.create_item(body.into()).await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

/// PUT /items/{id}
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: JsonBody<ItemBody>,
) -> HandlerResult<ItemDto> {
    let Json(body) = body?;
    let item = state
        .scheduler
        .update_item(ItemId::from(id), body.into())
        .await?;
    Ok(Json(item.into()))
}

/// POST /items/upsert
///
/// Media-inventory import: same body as create, deduplicated by name.
pub async fn upsert_item(
    State(state): State<AppState>,
    body: JsonBody<ItemBody>,
) -> HandlerResult<ItemDto> {
    let Json(body) = body?;
    let item = state.scheduler.upsert_item(body.into()).await?;
    Ok(Json(item.into()))
}

/// DELETE /items/{id}
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.scheduler.delete_item(ItemId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Schedule
// =============================================================================

/// GET /schedule
pub async fn get_schedule(State(state): State<AppState>) -> HandlerResult<SchedulePayload> {
    let view = state.scheduler.schedule().await?;
    Ok(Json(view.into()))
}

/// PUT /schedule
pub async fn replace_schedule(
    State(state): State<AppState>,
    entries: JsonBody<Vec<EntryDraft>>,
) -> HandlerResult<SchedulePayload> {
    let Json(entries) = entries?;
    let view = state.scheduler.replace_schedule(entries).await?;
    Ok(Json(view.into()))
}

/// POST /schedule/add
pub async fn add_entry(
    State(state): State<AppState>,
    body: JsonBody<AddEntryBody>,
) -> HandlerResult<SchedulePayload> {
    let Json(body) = body?;
    let view = state
        .scheduler
        .add_entry(body.item_id, body.start_timestamp)
        .await?;
    Ok(Json(view.into()))
}

/// POST /schedule/remove
pub async fn remove_entry(
    State(state): State<AppState>,
    body: JsonBody<RemoveEntryBody>,
) -> HandlerResult<SchedulePayload> {
    let Json(body) = body?;
    let view = state.scheduler.remove_entry(body.entry_id).await?;
    Ok(Json(view.into()))
}

/// POST /schedule/reschedule
pub async fn reschedule_entry(
    State(state): State<AppState>,
    body: JsonBody<RescheduleBody>,
) -> HandlerResult<SchedulePayload> {
    let Json(body) = body?;
    let view = state
        .scheduler
        .reschedule_entry(body.entry_id, body.start_timestamp)
        .await?;
    Ok(Json(view.into()))
}

// =============================================================================
// Snapshots and contest clock
// =============================================================================

/// POST /schedule/snapshots
pub async fn save_snapshot(
    State(state): State<AppState>,
    body: JsonBody<SnapshotCreate>,
) -> Result<(StatusCode, Json<SnapshotMeta>), AppError> {
    let Json(body) = body?;
    let meta = state.scheduler.save_snapshot(body.label).await?;
    Ok((StatusCode::CREATED, Json(meta)))
}

/// GET /schedule/snapshots
pub async fn list_snapshots(State(state): State<AppState>) -> HandlerResult<Vec<SnapshotMeta>> {
    Ok(Json(state.scheduler.list_snapshots().await?))
}

/// POST /schedule/snapshots/{id}
pub async fn restore_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HandlerResult<SchedulePayload> {
    let view = state
        .scheduler
        .restore_snapshot(SnapshotId::from(id))
        .await?;
    Ok(Json(view.into()))
}

/// POST /contest
pub async fn update_contest(
    State(state): State<AppState>,
    body: JsonBody<ContestUpdate>,
) -> HandlerResult<SchedulePayload> {
    let Json(body) = body?;
    let view = state.scheduler.set_contest_start(body.start_timestamp).await?;
    Ok(Json(view.into()))
}

// =============================================================================
// Control surface (fire-and-forget)
// =============================================================================

type Queued = Result<(StatusCode, Json<StatusResponse>), AppError>;

fn queue(state: &AppState, cmd: ControlCommand) -> (StatusCode, Json<StatusResponse>) {
    dispatch_control(state.control.clone(), cmd);
    (StatusCode::ACCEPTED, Json(StatusResponse::queued()))
}

/// POST /obs/launch
pub async fn obs_launch(
    State(state): State<AppState>,
    body: JsonBody<LaunchRequest>,
) -> Queued {
    let Json(body) = body?;
    Ok(queue(&state, ControlCommand::Launch(body)))
}

/// POST /obs/remove
pub async fn obs_remove(
    State(state): State<AppState>,
    body: JsonBody<SourceRef>,
) -> Queued {
    let Json(body) = body?;
    Ok(queue(&state, ControlCommand::Remove(body)))
}

/// POST /obs/mute
pub async fn obs_mute(
    State(state): State<AppState>,
    body: JsonBody<MuteBody>,
) -> Queued {
    let Json(body) = body?;
    Ok(queue(
        &state,
        ControlCommand::Mute {
            source_name: body.source_name,
        },
    ))
}

/// POST /obs/unmute
pub async fn obs_unmute(
    State(state): State<AppState>,
    body: JsonBody<MuteBody>,
) -> Queued {
    let Json(body) = body?;
    Ok(queue(
        &state,
        ControlCommand::Unmute {
            source_name: body.source_name,
        },
    ))
}

/// GET /obs/heartbeat
pub async fn obs_heartbeat(State(state): State<AppState>) -> HandlerResult<StatusResponse> {
    check_control(state.control.clone()).await?;
    Ok(Json(StatusResponse::ok()))
}
