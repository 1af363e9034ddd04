use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Form, Json,
    body::Body,
    extract::{FromRequestParts, Multipart, Path, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    response::{Redirect, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::{
    error::AppError,
    state::{AppState, SharedState},
};
use crate::catalog::{Candidate, has_mp4_extension};
use crate::resolver::Pick;

/// Userinfo of the verified caller. Extracting it enforces authorization.
pub struct User(pub Value);

impl FromRequestParts<SharedState> for User {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let state = Arc::clone(state);
        let user = tokio::task::spawn_blocking(move || state.auth.verify(authorization.as_deref()))
            .await
            .map_err(|err| AppError::InternalError(err.into()))??;

        Ok(User(user))
    }
}

#[derive(Serialize)]
pub struct VideoView {
    id: u64,
    filename: String,
}

impl From<Candidate> for VideoView {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            filename: candidate.file_name,
        }
    }
}

#[derive(Serialize)]
pub struct PickView {
    id: u64,
    day: NaiveDate,
    filename: String,
}

impl From<Pick> for PickView {
    fn from(pick: Pick) -> Self {
        Self {
            id: pick.candidate.id,
            day: pick.day,
            filename: pick.candidate.file_name,
        }
    }
}

#[derive(Serialize)]
pub struct LibraryView {
    today: NaiveDate,
    pick: Option<PickView>,
    videos: Vec<VideoView>,
}

#[derive(Deserialize)]
pub struct DeleteForm {
    filename: String,
}

// Resolver calls touch the filesystem; keep them off the async workers.
async fn blocking<T, F>(state: &SharedState, task: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> anyhow::Result<T> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || task(&state))
        .await
        .map_err(|err| AppError::InternalError(err.into()))?
        .map_err(AppError::from)
}

async fn serve_video(locator: PathBuf, request: Request) -> Response {
    let response = ServeFile::new(locator)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});

    response.map(Body::new)
}

pub async fn user_handler(User(user): User) -> Json<Value> {
    Json(user)
}

pub async fn library_handler(
    _: User,
    State(state): State<SharedState>,
) -> Result<Json<LibraryView>, AppError> {
    let today = state.today();
    let (pick, candidates) = blocking(&state, move |state| {
        Ok((state.resolver.peek(today)?, state.resolver.candidates()?))
    })
    .await?;

    Ok(Json(LibraryView {
        today,
        pick: pick.map(PickView::from),
        videos: candidates.into_iter().map(VideoView::from).collect(),
    }))
}

pub async fn today_handler(
    _: User,
    State(state): State<SharedState>,
    request: Request,
) -> Result<Response, AppError> {
    let today = state.today();
    let pick = blocking(&state, move |state| state.resolver.resolve(today)).await?;

    Ok(serve_video(pick.candidate.locator, request).await)
}

pub async fn today_info_handler(
    _: User,
    State(state): State<SharedState>,
) -> Result<Json<PickView>, AppError> {
    let today = state.today();
    let pick = blocking(&state, move |state| state.resolver.resolve(today)).await?;

    Ok(Json(pick.into()))
}

pub async fn play_handler(
    _: User,
    State(state): State<SharedState>,
    Path(filename): Path<String>,
    request: Request,
) -> Result<Response, AppError> {
    let candidate = blocking(&state, move |state| state.resolver.locate(&filename)).await?;

    Ok(serve_video(candidate.locator, request).await)
}

/// Multipart form with a `file` field, as sent by an HTML file input.
pub async fn upload_handler(
    _: User,
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if !has_mp4_extension(&file_name) {
            return Err(AppError::BadRequest("Only MP4 files are allowed".to_string()));
        }

        let mut content = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            content.extend_from_slice(&chunk);
        }
        if content.is_empty() {
            return Err(AppError::BadRequest("Empty upload".to_string()));
        }

        blocking(&state, move |state| state.resolver.add(&mut content.as_slice())).await?;
        return Ok(Redirect::to("/espen"));
    }

    Err(AppError::BadRequest("Missing file field".to_string()))
}

pub async fn delete_handler(
    _: User,
    State(state): State<SharedState>,
    Form(form): Form<DeleteForm>,
) -> Result<Redirect, AppError> {
    blocking(&state, move |state| state.resolver.remove(&form.filename)).await?;

    Ok(Redirect::to("/espen"))
}

pub async fn pin_handler(
    _: User,
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<PickView>, AppError> {
    let today = state.today();
    let pick = blocking(&state, move |state| state.resolver.pin(today, id)).await?;

    Ok(Json(pick.into()))
}
