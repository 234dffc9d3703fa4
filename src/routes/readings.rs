//! Shared reading API endpoints
//!
//! A shared reading is a time-boxed group read of one book. Participants
//! join (with an invite code when the reading is private), report their
//! progress, and the detail view aggregates participation statistics.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{
    BookRepository, NewReading, Participant, PublicReading, ReadingRepository, ReadingStats,
    SharedReading,
};
use crate::error::{AppError, Result};
use crate::routes::books::BookRef;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateReadingRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub book_id: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub invite_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProgressRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    pub progress: f64,
    #[serde(default)]
    pub cfi: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListParams {
    pub search: Option<String>,
}

/// Reading detail with its book and aggregate statistics
#[derive(Serialize)]
pub struct ReadingDetailResponse {
    pub reading: SharedReading,
    pub book: BookRef,
    pub participants: Vec<Participant>,
    pub stats: ReadingStats,
}

#[derive(Serialize)]
pub struct PublicReadingsResponse {
    pub readings: Vec<PublicReading>,
    pub total: usize,
}

fn default_true() -> bool {
    true
}

/// Create the readings router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_reading))
        .route("/public", get(list_public))
        .route("/:id", get(get_reading))
        .route("/:id/join", post(join_reading))
        .route("/:id/progress", put(update_progress))
}

/// POST /api/v1/readings
async fn create_reading(
    State(state): State<AppState>,
    Json(request): Json<CreateReadingRequest>,
) -> Result<(StatusCode, Json<SharedReading>)> {
    if request.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title must not be empty".to_string()));
    }

    let start = parse_date(&request.start_date, "startDate")?;
    let end = parse_date(&request.end_date, "endDate")?;
    if end <= start {
        return Err(AppError::BadRequest(
            "endDate must be after startDate".to_string(),
        ));
    }

    BookRepository::new(state.db())
        .get(&request.book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book '{}' not found", request.book_id)))?;

    let reading = ReadingRepository::new(state.db())
        .create(&NewReading {
            title: request.title.trim().to_string(),
            description: request.description.unwrap_or_default(),
            book_id: request.book_id,
            created_by: request.user_id,
            start_date: start.to_rfc3339(),
            end_date: end.to_rfc3339(),
            is_public: request.is_public,
        })
        .await?;

    tracing::info!(reading_id = %reading.id, book_id = %reading.book_id, "Shared reading created");

    Ok((StatusCode::CREATED, Json(reading)))
}

/// GET /api/v1/readings/public
///
/// Public readings that have not ended yet.
async fn list_public(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PublicReadingsResponse>> {
    let readings = ReadingRepository::new(state.db())
        .list_public(params.search.as_deref())
        .await?;
    let total = readings.len();

    Ok(Json(PublicReadingsResponse { readings, total }))
}

/// GET /api/v1/readings/:id
async fn get_reading(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReadingDetailResponse>> {
    let repo = ReadingRepository::new(state.db());
    let reading = repo
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Shared reading '{}' not found", id)))?;

    let book = BookRepository::new(state.db())
        .get(&reading.book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book '{}' not found", reading.book_id)))?;

    let participants = repo.participants(&id).await?;
    let stats = repo.stats(&id).await?;

    Ok(Json(ReadingDetailResponse {
        reading,
        book: BookRef::from(&book),
        participants,
        stats,
    }))
}

/// POST /api/v1/readings/:id/join
async fn join_reading(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<JoinRequest>,
) -> Result<(StatusCode, Json<Participant>)> {
    let repo = ReadingRepository::new(state.db());
    let reading = repo
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Shared reading '{}' not found", id)))?;

    if !reading.is_public && request.invite_code != reading.invite_code {
        return Err(AppError::Forbidden(
            "A valid invite code is required to join this reading".to_string(),
        ));
    }

    let participant = repo
        .add_participant(&id, request.user_id.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(participant)))
}

/// PUT /api/v1/readings/:id/progress
async fn update_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ProgressRequest>,
) -> Result<Json<Participant>> {
    if !(0.0..=100.0).contains(&request.progress) {
        return Err(AppError::BadRequest(
            "progress must be between 0 and 100".to_string(),
        ));
    }

    let repo = ReadingRepository::new(state.db());
    repo.get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Shared reading '{}' not found", id)))?;

    let participant = repo
        .update_progress(
            &id,
            request.user_id.as_deref(),
            request.progress,
            request.cfi.as_deref(),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("Not a participant of this reading".to_string()))?;

    Ok(Json(participant))
}

fn parse_date(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| AppError::BadRequest(format!("{} is not a valid RFC 3339 date", field)))
}
