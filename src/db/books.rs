//! Book database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::epub::StoredEpubMetadata;
use crate::error::{AppError, Result};

/// Book record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub total_pages: Option<i64>,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub total_chapters: i64,
    /// Serialized `StoredEpubMetadata`
    pub epub_metadata: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Book {
    /// Deserialize the stored chapter list
    pub fn stored_metadata(&self) -> Result<StoredEpubMetadata> {
        let raw = self
            .epub_metadata
            .as_deref()
            .ok_or_else(|| AppError::Internal(format!("book {} has no EPUB metadata", self.id)))?;
        Ok(serde_json::from_str(raw)?)
    }
}

/// Data for a new book row, assembled by the upload handler
#[derive(Debug, Clone)]
pub struct NewBook {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub total_chapters: i64,
    pub epub_metadata: String,
}

/// Book repository
pub struct BookRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BookRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new book and return the stored row
    pub async fn insert(&self, book: &NewBook) -> Result<Book> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO books (id, title, author, description, file_path, file_name,
                               file_size, mime_type, total_chapters, epub_metadata,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.file_path)
        .bind(&book.file_name)
        .bind(book.file_size)
        .bind(&book.mime_type)
        .bind(book.total_chapters)
        .bind(&book.epub_metadata)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(&book.id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch inserted book".to_string()))
    }

    /// Get a book by id
    pub async fn get(&self, id: &str) -> Result<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, description, total_pages, file_path, file_name,
                   file_size, mime_type, total_chapters, epub_metadata, created_at, updated_at
            FROM books
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(book)
    }

    /// List books, newest first, optionally filtered on title or author
    pub async fn list(&self, search: Option<&str>) -> Result<Vec<Book>> {
        let books = match search {
            Some(term) => {
                let pattern = format!("%{}%", term);
                sqlx::query_as::<_, Book>(
                    r#"
                    SELECT id, title, author, description, total_pages, file_path, file_name,
                           file_size, mime_type, total_chapters, epub_metadata, created_at, updated_at
                    FROM books
                    WHERE title LIKE ? OR author LIKE ?
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(&pattern)
                .bind(&pattern)
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Book>(
                    r#"
                    SELECT id, title, author, description, total_pages, file_path, file_name,
                           file_size, mime_type, total_chapters, epub_metadata, created_at, updated_at
                    FROM books
                    ORDER BY created_at DESC
                    "#,
                )
                .fetch_all(self.pool)
                .await?
            }
        };

        Ok(books)
    }

    /// Delete a book; participants and annotations cascade through readings
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of shared readings opened over a book
    pub async fn reading_count(&self, book_id: &str) -> Result<i64> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM shared_readings WHERE book_id = ?")
                .bind(book_id)
                .fetch_one(self.pool)
                .await?;

        Ok(result.0)
    }
}

/// Generate a fresh book id
pub fn new_book_id() -> String {
    Uuid::new_v4().to_string()
}
