//! Route table.

use axum::{
    Router,
    routing::{get, post, put},
};

use super::{AppState, handlers};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/items", get(handlers::list_items).post(handlers::create_item))
        .route("/items/upsert", post(handlers::upsert_item))
        .route(
            "/items/{id}",
            put(handlers::update_item).delete(handlers::delete_item),
        )
        .route(
            "/schedule",
            get(handlers::get_schedule).put(handlers::replace_schedule),
        )
        .route("/schedule/add", post(handlers::add_entry))
        .route("/schedule/remove", post(handlers::remove_entry))
        .route("/schedule/reschedule", post(handlers::reschedule_entry))
        .route(
            "/schedule/snapshots",
            get(handlers::list_snapshots).post(handlers::save_snapshot),
        )
        .route("/schedule/snapshots/{id}", post(handlers::restore_snapshot))
        .route("/contest", post(handlers::update_contest))
        .route("/obs/launch", post(handlers::obs_launch))
        .route("/obs/remove", post(handlers::obs_remove))
        .route("/obs/mute", post(handlers::obs_mute))
        .route("/obs/unmute", post(handlers::obs_unmute))
        .route("/obs/heartbeat", get(handlers::obs_heartbeat))
        .with_state(state)
}
