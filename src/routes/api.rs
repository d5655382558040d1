use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::pages::load_listing;
use crate::error::AppError;
use crate::state::AppState;

pub async fn submissions_json(
    State(state): State<Arc<AppState>>,
    Path(event): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let listing = load_listing(&state, &event, params).await?;

    Ok(Json(serde_json::json!({
        "event": listing.event.event.slug,
        "filter": listing.form.form(),
        "applied": listing.filter,
        "submissions": listing.rows,
    })))
}

pub async fn media_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    if filename.contains("..") || filename.contains('/') || filename.is_empty() {
        return Err(AppError::BadRequest(format!("invalid file name {}", filename)));
    }

    let path = state.config.media_folder.join(&filename);
    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("file"))
        }
        Err(e) => return Err(e.into()),
    };

    Ok(media_response(&filename, content))
}

fn media_response(filename: &str, content: Vec<u8>) -> Response {
    let mime = mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or("application/octet-stream");

    (
        [
            (header::CONTENT_TYPE, mime),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        content,
    )
        .into_response()
}
