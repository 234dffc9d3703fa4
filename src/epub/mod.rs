//! EPUB metadata extraction and chapter access

mod parser;
mod types;

pub use parser::{
    extract_metadata, read_chapter, resolve_entry_path, EpubError, UNKNOWN_AUTHOR, UNKNOWN_TITLE,
};
pub use types::*;
