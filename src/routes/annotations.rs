//! Annotation API endpoints
//!
//! CFI-anchored annotations inside a shared reading, and the citations
//! derived from them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::db::{
    Annotation, AnnotationRepository, BookRepository, Citation, CitationRepository, NewAnnotation,
    NewCitation, ReadingRepository,
};
use crate::error::{AppError, Result};
use crate::state::AppState;

const MAX_CONTENT_LEN: usize = 1000;
const MAX_SELECTED_TEXT_LEN: usize = 500;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateAnnotationRequest {
    pub shared_reading_id: String,
    pub content: String,
    pub cfi: String,
    pub selected_text: String,
    pub page: i64,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAnnotationRequest {
    pub content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CiteRequest {
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Create the annotations router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_annotation))
        .route("/reading/:reading_id", get(list_for_reading))
        .route("/:id", put(update_annotation).delete(delete_annotation))
        .route("/:id/cite", post(cite_annotation))
}

/// POST /api/v1/annotations
async fn create_annotation(
    State(state): State<AppState>,
    Json(request): Json<CreateAnnotationRequest>,
) -> Result<(StatusCode, Json<Annotation>)> {
    validate_content(&request.content)?;
    if request.selected_text.is_empty() || request.selected_text.len() > MAX_SELECTED_TEXT_LEN {
        return Err(AppError::BadRequest(format!(
            "selectedText must be between 1 and {} characters",
            MAX_SELECTED_TEXT_LEN
        )));
    }
    if request.cfi.is_empty() {
        return Err(AppError::BadRequest("cfi must not be empty".to_string()));
    }
    if request.page < 1 {
        return Err(AppError::BadRequest("page must be at least 1".to_string()));
    }

    ReadingRepository::new(state.db())
        .get(&request.shared_reading_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Shared reading '{}' not found",
                request.shared_reading_id
            ))
        })?;

    let annotation = AnnotationRepository::new(state.db())
        .create(&NewAnnotation {
            reading_id: request.shared_reading_id,
            user_id: request.user_id,
            content: request.content,
            cfi: request.cfi,
            selected_text: request.selected_text,
            page: request.page,
            is_public: request.is_public,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(annotation)))
}

/// GET /api/v1/annotations/reading/:reading_id
async fn list_for_reading(
    State(state): State<AppState>,
    Path(reading_id): Path<String>,
) -> Result<Json<Vec<Annotation>>> {
    ReadingRepository::new(state.db())
        .get(&reading_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Shared reading '{}' not found", reading_id)))?;

    let annotations = AnnotationRepository::new(state.db())
        .list_for_reading(&reading_id)
        .await?;

    Ok(Json(annotations))
}

/// PUT /api/v1/annotations/:id
async fn update_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateAnnotationRequest>,
) -> Result<Json<Annotation>> {
    validate_content(&request.content)?;

    let annotation = AnnotationRepository::new(state.db())
        .update_content(&id, &request.content)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Annotation '{}' not found", id)))?;

    Ok(Json(annotation))
}

/// DELETE /api/v1/annotations/:id
async fn delete_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let deleted = AnnotationRepository::new(state.db()).delete(&id).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Annotation '{}' not found", id)))
    }
}

/// POST /api/v1/annotations/:id/cite
///
/// Turn an annotation into a shareable citation. The quoted text and the
/// book attribution are copied onto the citation so it outlives edits to
/// the annotation.
async fn cite_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CiteRequest>,
) -> Result<(StatusCode, Json<Citation>)> {
    let annotation = AnnotationRepository::new(state.db())
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Annotation '{}' not found", id)))?;

    let reading = ReadingRepository::new(state.db())
        .get(&annotation.reading_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Shared reading '{}' not found", annotation.reading_id))
        })?;

    let book = BookRepository::new(state.db())
        .get(&reading.book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book '{}' not found", reading.book_id)))?;

    let citation = CitationRepository::new(state.db())
        .create(&NewCitation {
            annotation_id: annotation.id,
            user_id: request.user_id,
            text: annotation.selected_text,
            author: book.author,
            book_title: book.title,
            shared_on_platforms: request.platforms,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(citation)))
}

fn validate_content(content: &str) -> Result<()> {
    if content.is_empty() || content.len() > MAX_CONTENT_LEN {
        return Err(AppError::BadRequest(format!(
            "content must be between 1 and {} characters",
            MAX_CONTENT_LEN
        )));
    }
    Ok(())
}
