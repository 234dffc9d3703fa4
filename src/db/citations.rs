//! Citation database operations

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Shareable citation derived from an annotation. The quoted text and book
/// attribution are copied at creation time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub id: String,
    pub annotation_id: String,
    pub user_id: Option<String>,
    pub text: String,
    pub author: String,
    pub book_title: String,
    pub shared_on_platforms: Vec<String>,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct CitationRow {
    id: String,
    annotation_id: String,
    user_id: Option<String>,
    text: String,
    author: String,
    book_title: String,
    /// JSON array of platform names
    shared_on_platforms: String,
    created_at: String,
}

impl CitationRow {
    fn into_citation(self) -> Result<Citation> {
        Ok(Citation {
            id: self.id,
            annotation_id: self.annotation_id,
            user_id: self.user_id,
            text: self.text,
            author: self.author,
            book_title: self.book_title,
            shared_on_platforms: serde_json::from_str(&self.shared_on_platforms)?,
            created_at: self.created_at,
        })
    }
}

/// Data for a new citation
#[derive(Debug, Clone)]
pub struct NewCitation {
    pub annotation_id: String,
    pub user_id: Option<String>,
    pub text: String,
    pub author: String,
    pub book_title: String,
    pub shared_on_platforms: Vec<String>,
}

/// Citation repository
pub struct CitationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CitationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a citation
    pub async fn create(&self, citation: &NewCitation) -> Result<Citation> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let platforms = serde_json::to_string(&citation.shared_on_platforms)?;

        sqlx::query(
            r#"
            INSERT INTO citations (id, annotation_id, user_id, text, author, book_title,
                                   shared_on_platforms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&citation.annotation_id)
        .bind(&citation.user_id)
        .bind(&citation.text)
        .bind(&citation.author)
        .bind(&citation.book_title)
        .bind(&platforms)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created citation".to_string()))
    }

    /// Get a citation by id
    pub async fn get(&self, id: &str) -> Result<Option<Citation>> {
        let row = sqlx::query_as::<_, CitationRow>(
            r#"
            SELECT id, annotation_id, user_id, text, author, book_title,
                   shared_on_platforms, created_at
            FROM citations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(CitationRow::into_citation).transpose()
    }

    /// List the citations made from one annotation
    pub async fn list_for_annotation(&self, annotation_id: &str) -> Result<Vec<Citation>> {
        let rows = sqlx::query_as::<_, CitationRow>(
            r#"
            SELECT id, annotation_id, user_id, text, author, book_title,
                   shared_on_platforms, created_at
            FROM citations
            WHERE annotation_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(annotation_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(CitationRow::into_citation).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::annotations::{AnnotationRepository, NewAnnotation};
    use crate::db::books::{BookRepository, NewBook};
    use crate::db::readings::{NewReading, ReadingRepository};
    use crate::db::test_pool;
    use chrono::Duration;

    async fn seed_annotation(pool: &SqlitePool) -> String {
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
        let reading = ReadingRepository::new(pool)
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
            .unwrap();

        AnnotationRepository::new(pool)
            .create(&NewAnnotation {
                reading_id: reading.id,
                user_id: Some("u1".to_string()),
                content: "striking".to_string(),
                cfi: "epubcfi(/6/4)".to_string(),
                selected_text: "Fear is the mind-killer".to_string(),
                page: 8,
                is_public: true,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn create_copies_attribution_and_platforms() {
        let pool = test_pool().await;
        let annotation_id = seed_annotation(&pool).await;
        let repo = CitationRepository::new(&pool);

        let citation = repo
            .create(&NewCitation {
                annotation_id: annotation_id.clone(),
                user_id: Some("u1".to_string()),
                text: "Fear is the mind-killer".to_string(),
                author: "Herbert".to_string(),
                book_title: "Dune".to_string(),
                shared_on_platforms: vec!["twitter".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(citation.text, "Fear is the mind-killer");
        assert_eq!(citation.book_title, "Dune");
        assert_eq!(citation.shared_on_platforms, vec!["twitter"]);

        let listed = repo.list_for_annotation(&annotation_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, citation.id);
    }

    #[tokio::test]
    async fn deleting_the_annotation_cascades() {
        let pool = test_pool().await;
        let annotation_id = seed_annotation(&pool).await;
        let repo = CitationRepository::new(&pool);

        repo.create(&NewCitation {
            annotation_id: annotation_id.clone(),
            user_id: None,
            text: "quote".to_string(),
            author: "Herbert".to_string(),
            book_title: "Dune".to_string(),
            shared_on_platforms: vec![],
        })
        .await
        .unwrap();

        AnnotationRepository::new(&pool)
            .delete(&annotation_id)
            .await
            .unwrap();

        assert!(repo
            .list_for_annotation(&annotation_id)
            .await
            .unwrap()
            .is_empty());
    }
}
