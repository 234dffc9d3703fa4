//! Book API endpoints
//!
//! REST API for EPUB book management:
//! - Upload a book (multipart, with optional metadata overrides)
//! - List / get / delete books
//! - Get chapter content by spine index
//! - Get the table of contents

use std::io::Cursor;
use std::path::Path as FsPath;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{new_book_id, Book, BookRepository, NewBook};
use crate::epub::{self, EpubError};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Book summary, the shape returned by upload and list
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub total_chapters: i64,
    pub file_size: i64,
    pub created_at: String,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            description: book.description.clone(),
            total_chapters: book.total_chapters,
            file_size: book.file_size,
            created_at: book.created_at.clone(),
        }
    }
}

/// Response for the book list
#[derive(Serialize)]
pub struct BookListResponse {
    pub books: Vec<BookSummary>,
    pub total: usize,
}

/// Full book details, including how many readings it is part of
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDetailResponse {
    #[serde(flatten)]
    pub book: BookSummary,
    pub reading_count: i64,
}

/// Chapter read response: content plus navigation hints
#[derive(Serialize)]
pub struct ChapterReadResponse {
    pub chapter: ChapterPayload,
    pub book: BookRef,
    pub navigation: Navigation,
}

#[derive(Serialize)]
pub struct ChapterPayload {
    pub index: usize,
    pub id: String,
    pub title: String,
    pub content: String,
    pub href: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRef {
    pub id: String,
    pub title: String,
    pub author: String,
    pub total_chapters: i64,
}

impl From<&Book> for BookRef {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            total_chapters: book.total_chapters,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_index: Option<usize>,
    pub next_index: Option<usize>,
}

impl Navigation {
    fn at(index: usize, total: usize) -> Self {
        let has_previous = index > 0;
        let has_next = index + 1 < total;
        Self {
            has_previous,
            has_next,
            previous_index: has_previous.then(|| index - 1),
            next_index: has_next.then(|| index + 1),
        }
    }
}

/// Table-of-contents response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TocResponse {
    pub book: BookRef,
    pub table_of_contents: Vec<TocItem>,
}

#[derive(Serialize)]
pub struct TocItem {
    pub index: usize,
    pub id: String,
    pub title: String,
    pub href: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListParams {
    pub search: Option<String>,
}

/// Create the books router
pub fn router(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(list_books).post(upload_book))
        .route("/:id", get(get_book).delete(delete_book))
        .route("/:id/chapters/:index", get(get_chapter))
        .route("/:id/toc", get(get_toc))
        .layer(DefaultBodyLimit::max(max_upload_size))
}

/// POST /api/v1/books
///
/// Multipart upload: file under `epub` or `file`, plus optional `title`,
/// `author` and `description` overrides. The archive is written to storage
/// first; if extraction then fails, the file is removed again and no book
/// record is created.
async fn upload_book(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BookSummary>)> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut title_override = None;
    let mut author_override = None;
    let mut description_override = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "epub" | "file" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown.epub".to_string());
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field.bytes().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read file data: {}", e))
                })?;
                file = Some((filename, content_type, data.to_vec()));
            }
            "title" => title_override = non_empty(field_text(field).await?),
            "author" => author_override = non_empty(field_text(field).await?),
            "description" => description_override = non_empty(field_text(field).await?),
            _ => {}
        }
    }

    let (file_name, content_type, data) = file.ok_or_else(|| {
        AppError::BadRequest("No file provided. Use field name 'epub' or 'file'".to_string())
    })?;

    // Boundary check, before anything is written to storage
    let is_epub = file_name.to_lowercase().ends_with(".epub")
        || content_type.as_deref() == Some("application/epub+zip");
    if !is_epub {
        return Err(EpubError::UnsupportedFileType(file_name).into());
    }

    let book_id = new_book_id();
    let file_size = data.len() as i64;
    let stored_path = state.storage().store(&book_id, &data).await?;

    let metadata = match epub::extract_metadata(Cursor::new(&data)) {
        Ok(metadata) => metadata,
        Err(e) => {
            // No orphaned archive files on a failed upload
            if let Err(cleanup) = state.storage().remove(&stored_path).await {
                tracing::warn!("Failed to clean up rejected upload: {}", cleanup);
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        book_id = %book_id,
        title = %metadata.title,
        chapters = metadata.total_chapters,
        size = file_size,
        "EPUB extracted"
    );

    let new_book = NewBook {
        id: book_id,
        title: title_override.unwrap_or_else(|| metadata.title.clone()),
        author: author_override.unwrap_or_else(|| metadata.author.clone()),
        description: description_override.unwrap_or_else(|| metadata.description.clone()),
        file_path: stored_path.to_string_lossy().into_owned(),
        file_name,
        file_size,
        mime_type: content_type.unwrap_or_else(|| "application/epub+zip".to_string()),
        total_chapters: metadata.total_chapters as i64,
        epub_metadata: serde_json::to_string(&metadata.stored())?,
    };

    let book = match BookRepository::new(state.db()).insert(&new_book).await {
        Ok(book) => book,
        Err(e) => {
            if let Err(cleanup) = state.storage().remove(&stored_path).await {
                tracing::warn!("Failed to clean up after insert failure: {}", cleanup);
            }
            return Err(e);
        }
    };

    Ok((StatusCode::CREATED, Json(BookSummary::from(&book))))
}

/// GET /api/v1/books
async fn list_books(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<BookListResponse>> {
    let books = BookRepository::new(state.db())
        .list(params.search.as_deref())
        .await?;

    let summaries: Vec<BookSummary> = books.iter().map(BookSummary::from).collect();
    let total = summaries.len();

    Ok(Json(BookListResponse {
        books: summaries,
        total,
    }))
}

/// GET /api/v1/books/:id
async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookDetailResponse>> {
    let repo = BookRepository::new(state.db());
    let book = repo
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book '{}' not found", id)))?;
    let reading_count = repo.reading_count(&id).await?;

    Ok(Json(BookDetailResponse {
        book: BookSummary::from(&book),
        reading_count,
    }))
}

/// DELETE /api/v1/books/:id
async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let repo = BookRepository::new(state.db());
    let book = repo
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book '{}' not found", id)))?;

    repo.delete(&id).await?;
    state.storage().remove(FsPath::new(&book.file_path)).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/books/:id/chapters/:index
///
/// Chapter indices are zero-based spine positions. The archive is re-opened
/// on every read; content is never duplicated into the database.
async fn get_chapter(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<ChapterReadResponse>> {
    let book = BookRepository::new(state.db())
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book '{}' not found", id)))?;

    let stored = book.stored_metadata()?;
    let total = stored.chapters.len();
    if index >= total {
        return Err(EpubError::ChapterNotFound { index, total }.into());
    }

    let data = state.storage().read(FsPath::new(&book.file_path)).await?;
    let chapter = epub::read_chapter(Cursor::new(&data), &stored, index)?;

    Ok(Json(ChapterReadResponse {
        chapter: ChapterPayload {
            index: chapter.index,
            id: chapter.id,
            title: chapter.title,
            content: chapter.content,
            href: chapter.href,
        },
        book: BookRef::from(&book),
        navigation: Navigation::at(index, total),
    }))
}

/// GET /api/v1/books/:id/toc
async fn get_toc(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TocResponse>> {
    let book = BookRepository::new(state.db())
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book '{}' not found", id)))?;

    let stored = book.stored_metadata()?;
    let table_of_contents = stored
        .chapters
        .iter()
        .enumerate()
        .map(|(index, chapter)| TocItem {
            index,
            id: chapter.id.clone(),
            title: chapter.title.clone(),
            href: chapter.href.clone(),
        })
        .collect();

    Ok(Json(TocResponse {
        book: BookRef::from(&book),
        table_of_contents,
    }))
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read form field: {}", e)))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_at_bounds() {
        let first = Navigation::at(0, 3);
        assert!(!first.has_previous);
        assert!(first.has_next);
        assert_eq!(first.next_index, Some(1));
        assert_eq!(first.previous_index, None);

        let last = Navigation::at(2, 3);
        assert!(last.has_previous);
        assert!(!last.has_next);
        assert_eq!(last.previous_index, Some(1));
        assert_eq!(last.next_index, None);

        let only = Navigation::at(0, 1);
        assert!(!only.has_previous);
        assert!(!only.has_next);
    }
}
