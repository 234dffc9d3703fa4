//! Annotation database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Annotation record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: String,
    pub reading_id: String,
    pub user_id: Option<String>,
    pub content: String,
    /// CFI anchoring the annotated passage inside the book
    pub cfi: String,
    pub selected_text: String,
    pub page: i64,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Data for a new annotation
#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub reading_id: String,
    pub user_id: Option<String>,
    pub content: String,
    pub cfi: String,
    pub selected_text: String,
    pub page: i64,
    pub is_public: bool,
}

/// Annotation repository
pub struct AnnotationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AnnotationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an annotation
    pub async fn create(&self, annotation: &NewAnnotation) -> Result<Annotation> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO annotations (id, reading_id, user_id, content, cfi, selected_text,
                                     page, is_public, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&annotation.reading_id)
        .bind(&annotation.user_id)
        .bind(&annotation.content)
        .bind(&annotation.cfi)
        .bind(&annotation.selected_text)
        .bind(annotation.page)
        .bind(annotation.is_public)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created annotation".to_string()))
    }

    /// Get an annotation by id
    pub async fn get(&self, id: &str) -> Result<Option<Annotation>> {
        let annotation = sqlx::query_as::<_, Annotation>(
            r#"
            SELECT id, reading_id, user_id, content, cfi, selected_text, page,
                   is_public, created_at, updated_at
            FROM annotations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(annotation)
    }

    /// List annotations of a reading in page order
    pub async fn list_for_reading(&self, reading_id: &str) -> Result<Vec<Annotation>> {
        let annotations = sqlx::query_as::<_, Annotation>(
            r#"
            SELECT id, reading_id, user_id, content, cfi, selected_text, page,
                   is_public, created_at, updated_at
            FROM annotations
            WHERE reading_id = ?
            ORDER BY page ASC, created_at ASC
            "#,
        )
        .bind(reading_id)
        .fetch_all(self.pool)
        .await?;

        Ok(annotations)
    }

    /// Update the text content of an annotation
    pub async fn update_content(&self, id: &str, content: &str) -> Result<Option<Annotation>> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE annotations SET content = ?, updated_at = ? WHERE id = ?",
        )
        .bind(content)
        .bind(&now)
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get(id).await
    }

    /// Delete an annotation
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM annotations WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::books::{BookRepository, NewBook};
    use crate::db::readings::{NewReading, ReadingRepository};
    use crate::db::test_pool;
    use chrono::Duration;

    async fn seed_reading(pool: &SqlitePool) -> String {
        BookRepository::new(pool)
            .insert(&NewBook {
                id: "b1".to_string(),
                title: "Dune".to_string(),
                author: "Herbert".to_string(),
                description: String::new(),
                file_path: "/tmp/b1.epub".to_string(),
                file_name: "b1.epub".to_string(),
                file_size: 1,
                mime_type: "application/epub+zip".to_string(),
                total_chapters: 1,
                epub_metadata: "{}".to_string(),
            })
            .await
            .unwrap();

        let now = Utc::now();
        ReadingRepository::new(pool)
            .create(&NewReading {
                title: "Circle".to_string(),
                description: String::new(),
                book_id: "b1".to_string(),
                created_by: None,
                start_date: now.to_rfc3339(),
                end_date: (now + Duration::days(7)).to_rfc3339(),
                is_public: true,
            })
            .await
            .unwrap()
            .id
    }

    fn note(reading_id: &str, page: i64, content: &str) -> NewAnnotation {
        NewAnnotation {
            reading_id: reading_id.to_string(),
            user_id: Some("u1".to_string()),
            content: content.to_string(),
            cfi: format!("epubcfi(/6/{})", page * 2),
            selected_text: "a passage".to_string(),
            page,
            is_public: true,
        }
    }

    #[tokio::test]
    async fn create_list_update_delete() {
        let pool = test_pool().await;
        let reading_id = seed_reading(&pool).await;
        let repo = AnnotationRepository::new(&pool);

        repo.create(&note(&reading_id, 4, "later")).await.unwrap();
        let first = repo.create(&note(&reading_id, 1, "first")).await.unwrap();

        let listed = repo.list_for_reading(&reading_id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content, "first");

        let updated = repo
            .update_content(&first.id, "revised")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "revised");

        assert!(repo.delete(&first.id).await.unwrap());
        assert!(!repo.delete(&first.id).await.unwrap());
        assert!(repo.update_content(&first.id, "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_the_reading_cascades() {
        let pool = test_pool().await;
        let reading_id = seed_reading(&pool).await;
        let repo = AnnotationRepository::new(&pool);
        repo.create(&note(&reading_id, 1, "note")).await.unwrap();

        sqlx::query("DELETE FROM shared_readings WHERE id = ?")
            .bind(&reading_id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(repo.list_for_reading(&reading_id).await.unwrap().is_empty());
    }
}
