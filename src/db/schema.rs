//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Books table; epub_metadata holds the serialized chapter list and the
-- package document path, recomputed only on re-upload
CREATE TABLE IF NOT EXISTS books (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    total_pages INTEGER,
    file_path TEXT NOT NULL,
    file_name TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    total_chapters INTEGER NOT NULL DEFAULT 0,
    epub_metadata TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);
CREATE INDEX IF NOT EXISTS idx_books_author ON books(author);

-- Time-boxed shared readings of one book
CREATE TABLE IF NOT EXISTS shared_readings (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    created_by TEXT,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 1,
    invite_code TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_readings_book_id ON shared_readings(book_id);
CREATE INDEX IF NOT EXISTS idx_readings_end_date ON shared_readings(end_date);

-- Participants of a shared reading, with their individual progress
CREATE TABLE IF NOT EXISTS participants (
    id TEXT PRIMARY KEY,
    reading_id TEXT NOT NULL REFERENCES shared_readings(id) ON DELETE CASCADE,
    user_id TEXT,
    progress REAL NOT NULL DEFAULT 0,
    cfi TEXT NOT NULL DEFAULT '',
    joined_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE(reading_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_participants_reading_id ON participants(reading_id);

-- CFI-anchored annotations inside a shared reading
CREATE TABLE IF NOT EXISTS annotations (
    id TEXT PRIMARY KEY,
    reading_id TEXT NOT NULL REFERENCES shared_readings(id) ON DELETE CASCADE,
    user_id TEXT,
    content TEXT NOT NULL,
    cfi TEXT NOT NULL,
    selected_text TEXT NOT NULL,
    page INTEGER NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_annotations_reading_id ON annotations(reading_id);
CREATE INDEX IF NOT EXISTS idx_annotations_cfi ON annotations(cfi);

-- Shareable citations derived from annotations; text and book attribution
-- are copied at creation time so a citation survives its annotation
CREATE TABLE IF NOT EXISTS citations (
    id TEXT PRIMARY KEY,
    annotation_id TEXT NOT NULL REFERENCES annotations(id) ON DELETE CASCADE,
    user_id TEXT,
    text TEXT NOT NULL,
    author TEXT NOT NULL,
    book_title TEXT NOT NULL,
    shared_on_platforms TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_citations_annotation_id ON citations(annotation_id);
"#;
