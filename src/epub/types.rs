//! EPUB data types
//!
//! `PackageMetadata` is what extraction produces at upload time. The chapter
//! list and package document path are flattened into `StoredEpubMetadata`,
//! serialized as JSON onto the book row, and deserialized on every chapter
//! read. Chapter indices are stable for the lifetime of the stored archive.

use serde::{Deserialize, Serialize};

/// One spine entry, in reading order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterDescriptor {
    /// Manifest item identifier (the spine `idref`)
    pub id: String,
    /// Path inside the archive, relative to the package document directory.
    /// Empty when the spine references an id the manifest does not declare;
    /// the slot is kept so indices stay spine-aligned.
    pub href: String,
    /// 1-based position in the spine
    pub order: usize,
    /// Synthesized as "Chapter N"
    pub title: String,
}

/// Metadata extracted from the package document at upload time
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub title: String,
    pub author: String,
    pub description: String,
    /// Archive path of the package document (the `.opf` file)
    pub opf_path: String,
    pub chapters: Vec<ChapterDescriptor>,
    pub total_chapters: usize,
}

impl PackageMetadata {
    /// The part of the metadata that is persisted with the book record
    pub fn stored(&self) -> StoredEpubMetadata {
        StoredEpubMetadata {
            opf_path: self.opf_path.clone(),
            chapters: self.chapters.clone(),
        }
    }
}

/// Serialized chapter list attached to a book row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEpubMetadata {
    pub opf_path: String,
    pub chapters: Vec<ChapterDescriptor>,
}

/// Raw content of one chapter, re-read from the archive on demand
#[derive(Debug, Clone, Serialize)]
pub struct ChapterContent {
    pub index: usize,
    pub id: String,
    pub title: String,
    pub content: String,
    pub href: String,
}
