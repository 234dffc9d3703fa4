//! Shared reading database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Shared reading record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SharedReading {
    pub id: String,
    pub title: String,
    pub description: String,
    pub book_id: String,
    pub created_by: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub is_public: bool,
    pub invite_code: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Participant record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub reading_id: String,
    pub user_id: Option<String>,
    pub progress: f64,
    pub cfi: String,
    pub joined_at: String,
    pub updated_at: String,
}

/// Public reading listing row, joined with its book and aggregate counts
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PublicReading {
    pub id: String,
    pub title: String,
    pub description: String,
    pub book_id: String,
    pub start_date: String,
    pub end_date: String,
    pub book_title: String,
    pub book_author: String,
    pub participant_count: i64,
    pub annotation_count: i64,
}

/// Aggregate statistics for one reading
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReadingStats {
    pub participant_count: i64,
    pub annotation_count: i64,
    pub average_progress: f64,
}

/// Data for a new shared reading
#[derive(Debug, Clone)]
pub struct NewReading {
    pub title: String,
    pub description: String,
    pub book_id: String,
    pub created_by: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub is_public: bool,
}

/// Reading repository
pub struct ReadingRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ReadingRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a shared reading. Private readings get a generated invite code.
    pub async fn create(&self, reading: &NewReading) -> Result<SharedReading> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let invite_code = if reading.is_public {
            None
        } else {
            Some(Uuid::new_v4().simple().to_string()[..8].to_string())
        };

        sqlx::query(
            r#"
            INSERT INTO shared_readings (id, title, description, book_id, created_by,
                                         start_date, end_date, is_public, invite_code,
                                         created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&reading.title)
        .bind(&reading.description)
        .bind(&reading.book_id)
        .bind(&reading.created_by)
        .bind(&reading.start_date)
        .bind(&reading.end_date)
        .bind(reading.is_public)
        .bind(&invite_code)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created reading".to_string()))
    }

    /// Get a reading by id
    pub async fn get(&self, id: &str) -> Result<Option<SharedReading>> {
        let reading = sqlx::query_as::<_, SharedReading>(
            r#"
            SELECT id, title, description, book_id, created_by, start_date, end_date,
                   is_public, invite_code, created_at, updated_at
            FROM shared_readings
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(reading)
    }

    /// List public readings that have not ended yet, optionally filtered on
    /// reading title, book title or book author
    pub async fn list_public(&self, search: Option<&str>) -> Result<Vec<PublicReading>> {
        let now = Utc::now().to_rfc3339();
        let pattern = search.map(|s| format!("%{}%", s));

        let readings = sqlx::query_as::<_, PublicReading>(
            r#"
            SELECT r.id, r.title, r.description, r.book_id, r.start_date, r.end_date,
                   b.title AS book_title, b.author AS book_author,
                   (SELECT COUNT(*) FROM participants p WHERE p.reading_id = r.id) AS participant_count,
                   (SELECT COUNT(*) FROM annotations a WHERE a.reading_id = r.id) AS annotation_count
            FROM shared_readings r
            JOIN books b ON b.id = r.book_id
            WHERE r.is_public = 1
              AND r.end_date >= ?
              AND (? IS NULL OR r.title LIKE ? OR b.title LIKE ? OR b.author LIKE ?)
            ORDER BY r.start_date ASC
            "#,
        )
        .bind(&now)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(self.pool)
        .await?;

        Ok(readings)
    }

    /// Aggregate statistics over participants and annotations of a reading
    pub async fn stats(&self, reading_id: &str) -> Result<ReadingStats> {
        let stats = sqlx::query_as::<_, ReadingStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM participants WHERE reading_id = ?) AS participant_count,
                (SELECT COUNT(*) FROM annotations WHERE reading_id = ?) AS annotation_count,
                (SELECT COALESCE(AVG(progress), 0) FROM participants WHERE reading_id = ?) AS average_progress
            "#,
        )
        .bind(reading_id)
        .bind(reading_id)
        .bind(reading_id)
        .fetch_one(self.pool)
        .await?;

        Ok(stats)
    }

    /// List the participants of a reading
    pub async fn participants(&self, reading_id: &str) -> Result<Vec<Participant>> {
        let participants = sqlx::query_as::<_, Participant>(
            r#"
            SELECT id, reading_id, user_id, progress, cfi, joined_at, updated_at
            FROM participants
            WHERE reading_id = ?
            ORDER BY joined_at ASC
            "#,
        )
        .bind(reading_id)
        .fetch_all(self.pool)
        .await?;

        Ok(participants)
    }

    /// Add a participant. Joining the same reading twice is a conflict.
    pub async fn add_participant(
        &self,
        reading_id: &str,
        user_id: Option<&str>,
    ) -> Result<Participant> {
        if user_id.is_some() {
            let existing: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM participants WHERE reading_id = ? AND user_id IS ?",
            )
            .bind(reading_id)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;

            if existing.is_some() {
                return Err(AppError::Conflict(
                    "Already participating in this reading".to_string(),
                ));
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO participants (id, reading_id, user_id, joined_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(reading_id)
        .bind(user_id)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.participant(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created participant".to_string()))
    }

    /// Update a participant's progress (percent) and optional position
    pub async fn update_progress(
        &self,
        reading_id: &str,
        user_id: Option<&str>,
        progress: f64,
        cfi: Option<&str>,
    ) -> Result<Option<Participant>> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE participants
            SET progress = ?, cfi = COALESCE(?, cfi), updated_at = ?
            WHERE reading_id = ? AND user_id IS ?
            "#,
        )
        .bind(progress)
        .bind(cfi)
        .bind(&now)
        .bind(reading_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let participant = sqlx::query_as::<_, Participant>(
            r#"
            SELECT id, reading_id, user_id, progress, cfi, joined_at, updated_at
            FROM participants
            WHERE reading_id = ? AND user_id IS ?
            "#,
        )
        .bind(reading_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(participant)
    }

    async fn participant(&self, id: &str) -> Result<Option<Participant>> {
        let participant = sqlx::query_as::<_, Participant>(
            r#"
            SELECT id, reading_id, user_id, progress, cfi, joined_at, updated_at
            FROM participants
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::books::{BookRepository, NewBook};
    use crate::db::test_pool;
    use chrono::Duration;

    async fn seed_book(pool: &SqlitePool) -> String {
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
        "b1".to_string()
    }

    fn reading_for(book_id: &str, is_public: bool) -> NewReading {
        let now = Utc::now();
        NewReading {
            title: "Summer reading".to_string(),
            description: String::new(),
            book_id: book_id.to_string(),
            created_by: Some("u1".to_string()),
            start_date: now.to_rfc3339(),
            end_date: (now + Duration::days(30)).to_rfc3339(),
            is_public,
        }
    }

    #[tokio::test]
    async fn private_readings_get_an_invite_code() {
        let pool = test_pool().await;
        let book_id = seed_book(&pool).await;
        let repo = ReadingRepository::new(&pool);

        let public = repo.create(&reading_for(&book_id, true)).await.unwrap();
        assert!(public.invite_code.is_none());

        let private = repo.create(&reading_for(&book_id, false)).await.unwrap();
        let code = private.invite_code.unwrap();
        assert_eq!(code.len(), 8);
    }

    #[tokio::test]
    async fn public_listing_joins_book_and_counts() {
        let pool = test_pool().await;
        let book_id = seed_book(&pool).await;
        let repo = ReadingRepository::new(&pool);

        let reading = repo.create(&reading_for(&book_id, true)).await.unwrap();
        repo.create(&reading_for(&book_id, false)).await.unwrap();
        repo.add_participant(&reading.id, Some("u1")).await.unwrap();

        let public = repo.list_public(None).await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].book_title, "Dune");
        assert_eq!(public[0].participant_count, 1);
        assert_eq!(public[0].annotation_count, 0);

        assert_eq!(repo.list_public(Some("herb")).await.unwrap().len(), 1);
        assert!(repo.list_public(Some("nothing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_join_is_a_conflict() {
        let pool = test_pool().await;
        let book_id = seed_book(&pool).await;
        let repo = ReadingRepository::new(&pool);
        let reading = repo.create(&reading_for(&book_id, true)).await.unwrap();

        repo.add_participant(&reading.id, Some("u1")).await.unwrap();
        let err = repo.add_participant(&reading.id, Some("u1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn progress_updates_feed_average() {
        let pool = test_pool().await;
        let book_id = seed_book(&pool).await;
        let repo = ReadingRepository::new(&pool);
        let reading = repo.create(&reading_for(&book_id, true)).await.unwrap();

        repo.add_participant(&reading.id, Some("u1")).await.unwrap();
        repo.add_participant(&reading.id, Some("u2")).await.unwrap();

        let updated = repo
            .update_progress(&reading.id, Some("u1"), 50.0, Some("epubcfi(/6/4)"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.progress, 50.0);
        assert_eq!(updated.cfi, "epubcfi(/6/4)");

        let stats = repo.stats(&reading.id).await.unwrap();
        assert_eq!(stats.participant_count, 2);
        assert_eq!(stats.average_progress, 25.0);

        // Unknown participant
        let missing = repo
            .update_progress(&reading.id, Some("u9"), 10.0, None)
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
