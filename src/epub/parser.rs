//! EPUB metadata extraction and chapter reading
//!
//! An EPUB is a zip archive whose fixed entry `META-INF/container.xml` points
//! at a package document (`.opf`). The package document carries the Dublin
//! Core metadata, a manifest (id -> href for every resource) and a spine (the
//! linear reading order as manifest id references). Extraction walks
//! container -> package document -> manifest + spine and produces an ordered
//! chapter list; chapter content is re-read from the archive on demand.

use std::collections::HashMap;
use std::io::{Read, Seek};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

use super::types::{ChapterContent, ChapterDescriptor, PackageMetadata, StoredEpubMetadata};

/// Archive entry holding the container descriptor
const CONTAINER_PATH: &str = "META-INF/container.xml";

pub const UNKNOWN_TITLE: &str = "Unknown title";
pub const UNKNOWN_AUTHOR: &str = "Unknown author";

#[derive(Debug, Error)]
pub enum EpubError {
    /// Container or package document missing or unparsable. Fails the whole
    /// upload; the caller must remove any partially-stored archive file.
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// Rejected at the upload boundary, before extraction runs
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Chapter index out of bounds against the stored chapter count
    #[error("chapter {index} not found (book has {total} chapters)")]
    ChapterNotFound { index: usize, total: usize },

    /// Index valid but the referenced archive entry is absent; the stored
    /// metadata and the archive disagree
    #[error("chapter content missing: {0}")]
    ChapterContentMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn malformed(context: &str, err: impl std::fmt::Display) -> EpubError {
    EpubError::MalformedArchive(format!("{}: {}", context, err))
}

/// Extract package metadata and the spine-ordered chapter list from an
/// EPUB archive.
pub fn extract_metadata<R: Read + Seek>(reader: R) -> Result<PackageMetadata, EpubError> {
    let mut archive =
        ZipArchive::new(reader).map_err(|e| malformed("failed to open archive", e))?;

    let container_xml = read_entry(&mut archive, CONTAINER_PATH)
        .map_err(|e| match e {
            EpubError::ChapterContentMissing(_) => {
                EpubError::MalformedArchive("container descriptor not found".to_string())
            }
            other => other,
        })?;

    let opf_path = package_document_path(&container_xml)?;

    let opf_xml = read_entry(&mut archive, &opf_path).map_err(|e| match e {
        EpubError::ChapterContentMissing(_) => {
            EpubError::MalformedArchive(format!("package document not found: {}", opf_path))
        }
        other => other,
    })?;

    let opf = parse_package_document(&opf_xml)?;

    let chapters: Vec<ChapterDescriptor> = opf
        .spine
        .iter()
        .enumerate()
        .map(|(index, idref)| {
            let order = index + 1;
            ChapterDescriptor {
                id: idref.clone(),
                // An unresolved idref keeps its slot with an empty href so
                // indices stay aligned with the spine
                href: opf.manifest.get(idref).cloned().unwrap_or_default(),
                order,
                title: format!("Chapter {}", order),
            }
        })
        .collect();

    let total_chapters = chapters.len();

    Ok(PackageMetadata {
        title: opf.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        author: opf.author.unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        description: opf.description.unwrap_or_default(),
        opf_path,
        chapters,
        total_chapters,
    })
}

/// Read the raw textual content of one chapter.
///
/// The chapter href is relative to the package document directory; the
/// full archive path is recomputed the same way on every read.
pub fn read_chapter<R: Read + Seek>(
    reader: R,
    stored: &StoredEpubMetadata,
    index: usize,
) -> Result<ChapterContent, EpubError> {
    let total = stored.chapters.len();
    let chapter = stored
        .chapters
        .get(index)
        .ok_or(EpubError::ChapterNotFound { index, total })?;

    if chapter.href.is_empty() {
        return Err(EpubError::ChapterContentMissing(format!(
            "spine item '{}' has no manifest entry",
            chapter.id
        )));
    }

    let entry_path = resolve_entry_path(&stored.opf_path, &chapter.href);

    let mut archive =
        ZipArchive::new(reader).map_err(|e| malformed("failed to open archive", e))?;

    let mut entry = archive.by_name(&entry_path).map_err(|e| match e {
        ZipError::FileNotFound => EpubError::ChapterContentMissing(entry_path.clone()),
        other => malformed("failed to read archive entry", other),
    })?;

    let mut content = String::new();
    entry.read_to_string(&mut content).map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            malformed(&format!("chapter '{}' is not valid UTF-8", entry_path), e)
        } else {
            EpubError::Io(e)
        }
    })?;

    Ok(ChapterContent {
        index,
        id: chapter.id.clone(),
        title: chapter.title.clone(),
        content,
        href: chapter.href.clone(),
    })
}

/// Join the package document directory with a chapter href.
///
/// Hrefs are relative to the directory holding the `.opf` file; when the
/// package document sits at the archive root there is no prefix.
pub fn resolve_entry_path(opf_path: &str, href: &str) -> String {
    match opf_path.rsplit_once('/') {
        Some((dir, _)) => format!("{}/{}", dir, href),
        None => href.to_string(),
    }
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, EpubError> {
    let mut entry = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => EpubError::ChapterContentMissing(name.to_string()),
        other => malformed("failed to read archive entry", other),
    })?;

    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| malformed(&format!("entry '{}' is not valid UTF-8", name), e))?;
    Ok(content)
}

/// Parse `META-INF/container.xml` and return the `full-path` attribute of
/// the first `<rootfile>` element.
fn package_document_path(container_xml: &str) -> Result<String, EpubError> {
    let mut reader = Reader::from_str(container_xml);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"rootfile" =>
            {
                return attribute_value(&e, "full-path")?
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        EpubError::MalformedArchive(
                            "container rootfile has no full-path attribute".to_string(),
                        )
                    });
            }
            Ok(Event::Eof) => {
                return Err(EpubError::MalformedArchive(
                    "container.xml declares no rootfile".to_string(),
                ));
            }
            Err(e) => return Err(malformed("invalid container.xml", e)),
            Ok(_) => {}
        }
    }
}

/// Which part of the package document the reader is currently inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Metadata,
    Manifest,
    Spine,
}

/// Dublin Core field currently being captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaField {
    Title,
    Creator,
    Description,
}

struct ParsedOpf {
    title: Option<String>,
    author: Option<String>,
    description: Option<String>,
    /// manifest item id -> href
    manifest: HashMap<String, String>,
    /// spine idrefs in document order
    spine: Vec<String>,
}

/// Parse the package document: Dublin Core metadata, manifest and spine.
///
/// Text content of a metadata element is accumulated across text and CDATA
/// events and through any nested markup, so `<dc:title>X</dc:title>` and
/// wrapped forms normalize to the same string.
fn parse_package_document(opf_xml: &str) -> Result<ParsedOpf, EpubError> {
    let mut reader = Reader::from_str(opf_xml);

    let mut section = Section::None;
    // (field, nesting depth inside the captured element, accumulated text)
    let mut capture: Option<(MetaField, usize, String)> = None;

    let mut title = None;
    let mut author = None;
    let mut description = None;
    let mut manifest: HashMap<String, String> = HashMap::new();
    let mut spine: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if capture.is_some() {
                    if let Some((_, depth, _)) = capture.as_mut() {
                        *depth += 1;
                    }
                    continue;
                }
                match (section, e.local_name().as_ref()) {
                    (Section::None, b"metadata") => section = Section::Metadata,
                    (Section::None, b"manifest") => section = Section::Manifest,
                    (Section::None, b"spine") => section = Section::Spine,
                    (Section::Metadata, b"title") if title.is_none() => {
                        capture = Some((MetaField::Title, 0, String::new()));
                    }
                    (Section::Metadata, b"creator") if author.is_none() => {
                        capture = Some((MetaField::Creator, 0, String::new()));
                    }
                    (Section::Metadata, b"description") if description.is_none() => {
                        capture = Some((MetaField::Description, 0, String::new()));
                    }
                    (Section::Manifest, b"item") => {
                        record_manifest_item(&e, &mut manifest)?;
                    }
                    (Section::Spine, b"itemref") => {
                        spine.push(attribute_value(&e, "idref")?.unwrap_or_default());
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if capture.is_some() {
                    continue;
                }
                match (section, e.local_name().as_ref()) {
                    (Section::Manifest, b"item") => {
                        record_manifest_item(&e, &mut manifest)?;
                    }
                    (Section::Spine, b"itemref") => {
                        spine.push(attribute_value(&e, "idref")?.unwrap_or_default());
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    buf.push_str(
                        &t.unescape()
                            .map_err(|e| malformed("invalid package document text", e))?,
                    );
                }
            }
            Ok(Event::CData(t)) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                if let Some((field, depth, buf)) = capture.take() {
                    if depth > 0 {
                        capture = Some((field, depth - 1, buf));
                    } else {
                        let value = buf.trim().to_string();
                        let slot = match field {
                            MetaField::Title => &mut title,
                            MetaField::Creator => &mut author,
                            MetaField::Description => &mut description,
                        };
                        if !value.is_empty() {
                            *slot = Some(value);
                        }
                    }
                    continue;
                }
                match e.local_name().as_ref() {
                    b"metadata" | b"manifest" | b"spine" => section = Section::None,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed("invalid package document", e)),
            Ok(_) => {}
        }
    }

    Ok(ParsedOpf {
        title,
        author,
        description,
        manifest,
        spine,
    })
}

fn record_manifest_item(
    e: &BytesStart<'_>,
    manifest: &mut HashMap<String, String>,
) -> Result<(), EpubError> {
    let id = attribute_value(e, "id")?;
    let href = attribute_value(e, "href")?;
    if let (Some(id), Some(href)) = (id, href) {
        manifest.insert(id, href);
    }
    Ok(())
}

fn attribute_value(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, EpubError> {
    let attr = e
        .try_get_attribute(name)
        .map_err(|err| malformed("invalid attribute", err))?;
    attr.map(|a| {
        a.unescape_value()
            .map(|v| v.into_owned())
            .map_err(|err| malformed("invalid attribute value", err))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
    </rootfiles>
</container>"#;

    const OPF_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
        <dc:title>The Test Book</dc:title>
        <dc:creator>Ada Author</dc:creator>
        <dc:description>A book for testing.</dc:description>
    </metadata>
    <manifest>
        <item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
        <item id="c2" href="c2.xhtml" media-type="application/xhtml+xml"/>
        <item id="c3" href="c3.xhtml" media-type="application/xhtml+xml"/>
        <item id="css" href="style.css" media-type="text/css"/>
    </manifest>
    <spine>
        <itemref idref="c1"/>
        <itemref idref="c2"/>
        <itemref idref="c3"/>
    </spine>
</package>"#;

    fn build_archive(entries: &[(&str, &str)]) -> Cursor<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    fn fixture_epub() -> Cursor<Vec<u8>> {
        build_archive(&[
            ("META-INF/container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", OPF_XML),
            ("OEBPS/c1.xhtml", "<html><body>One</body></html>"),
            ("OEBPS/c2.xhtml", "<html><body>Two</body></html>"),
            ("OEBPS/c3.xhtml", "<html><body>Three</body></html>"),
            ("OEBPS/style.css", "body {}"),
        ])
    }

    #[test]
    fn extracts_metadata_and_spine_ordered_chapters() {
        let meta = extract_metadata(fixture_epub()).unwrap();

        assert_eq!(meta.title, "The Test Book");
        assert_eq!(meta.author, "Ada Author");
        assert_eq!(meta.description, "A book for testing.");
        assert_eq!(meta.opf_path, "OEBPS/content.opf");
        assert_eq!(meta.total_chapters, 3);

        let orders: Vec<usize> = meta.chapters.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        let hrefs: Vec<&str> = meta.chapters.iter().map(|c| c.href.as_str()).collect();
        assert_eq!(hrefs, vec!["c1.xhtml", "c2.xhtml", "c3.xhtml"]);
        assert_eq!(meta.chapters[0].title, "Chapter 1");
        assert_eq!(meta.chapters[2].id, "c3");
    }

    #[test]
    fn extraction_is_deterministic() {
        let first = extract_metadata(fixture_epub()).unwrap();
        let second = extract_metadata(fixture_epub()).unwrap();
        assert_eq!(first.chapters, second.chapters);
    }

    #[test]
    fn missing_container_is_malformed() {
        let archive = build_archive(&[("OEBPS/content.opf", OPF_XML)]);
        let err = extract_metadata(archive).unwrap_err();
        assert!(matches!(err, EpubError::MalformedArchive(_)), "{err}");
        assert!(err.to_string().contains("container descriptor not found"));
    }

    #[test]
    fn missing_package_document_is_malformed() {
        let archive = build_archive(&[("META-INF/container.xml", CONTAINER_XML)]);
        let err = extract_metadata(archive).unwrap_err();
        assert!(matches!(err, EpubError::MalformedArchive(_)), "{err}");
        assert!(err.to_string().contains("package document not found"));
    }

    #[test]
    fn container_without_rootfile_is_malformed() {
        let archive = build_archive(&[(
            "META-INF/container.xml",
            r#"<container><rootfiles></rootfiles></container>"#,
        )]);
        let err = extract_metadata(archive).unwrap_err();
        assert!(matches!(err, EpubError::MalformedArchive(_)), "{err}");
    }

    #[test]
    fn not_a_zip_is_malformed() {
        let err = extract_metadata(Cursor::new(b"plain text".to_vec())).unwrap_err();
        assert!(matches!(err, EpubError::MalformedArchive(_)), "{err}");
    }

    #[test]
    fn missing_optional_metadata_gets_placeholders() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf">
            <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"/>
            <manifest><item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/></manifest>
            <spine><itemref idref="c1"/></spine>
        </package>"#;
        let archive = build_archive(&[
            ("META-INF/container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", opf),
        ]);

        let meta = extract_metadata(archive).unwrap();
        assert_eq!(meta.title, UNKNOWN_TITLE);
        assert_eq!(meta.author, UNKNOWN_AUTHOR);
        assert_eq!(meta.description, "");
        assert_eq!(meta.total_chapters, 1);
    }

    #[test]
    fn nested_markup_in_title_normalizes_to_text() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf">
            <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
                <dc:title id="t1"><span>Wrapped</span> Title</dc:title>
                <dc:description><![CDATA[From <b>CDATA</b>]]></dc:description>
            </metadata>
            <manifest><item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/></manifest>
            <spine><itemref idref="c1"/></spine>
        </package>"#;
        let archive = build_archive(&[
            ("META-INF/container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", opf),
        ]);

        let meta = extract_metadata(archive).unwrap();
        assert_eq!(meta.title, "Wrapped Title");
        assert_eq!(meta.description, "From <b>CDATA</b>");
    }

    #[test]
    fn unresolved_idref_keeps_its_spine_slot() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf">
            <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
                <dc:title>Gaps</dc:title>
            </metadata>
            <manifest>
                <item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
                <item id="c3" href="c3.xhtml" media-type="application/xhtml+xml"/>
            </manifest>
            <spine>
                <itemref idref="c1"/>
                <itemref idref="ghost"/>
                <itemref idref="c3"/>
            </spine>
        </package>"#;
        let archive = build_archive(&[
            ("META-INF/container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", opf),
        ]);

        let meta = extract_metadata(archive).unwrap();
        assert_eq!(meta.total_chapters, 3);
        assert_eq!(meta.chapters[1].id, "ghost");
        assert_eq!(meta.chapters[1].href, "");
        assert_eq!(meta.chapters[1].order, 2);
        assert_eq!(meta.chapters[2].href, "c3.xhtml");
        assert_eq!(meta.chapters[2].order, 3);
    }

    #[test]
    fn reads_chapter_content() {
        let meta = extract_metadata(fixture_epub()).unwrap();
        let chapter = read_chapter(fixture_epub(), &meta.stored(), 1).unwrap();

        assert_eq!(chapter.index, 1);
        assert_eq!(chapter.id, "c2");
        assert_eq!(chapter.title, "Chapter 2");
        assert_eq!(chapter.href, "c2.xhtml");
        assert_eq!(chapter.content, "<html><body>Two</body></html>");
    }

    #[test]
    fn chapter_index_one_past_last_is_not_found() {
        let meta = extract_metadata(fixture_epub()).unwrap();
        let err = read_chapter(fixture_epub(), &meta.stored(), 3).unwrap_err();
        assert!(
            matches!(err, EpubError::ChapterNotFound { index: 3, total: 3 }),
            "{err}"
        );
    }

    #[test]
    fn absent_entry_is_chapter_content_missing() {
        let meta = extract_metadata(fixture_epub()).unwrap();
        // Same chapter list, but an archive missing the chapter documents
        let truncated = build_archive(&[
            ("META-INF/container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", OPF_XML),
        ]);
        let err = read_chapter(truncated, &meta.stored(), 0).unwrap_err();
        assert!(matches!(err, EpubError::ChapterContentMissing(_)), "{err}");
    }

    #[test]
    fn resolves_hrefs_against_package_document_directory() {
        assert_eq!(
            resolve_entry_path("OEBPS/content.opf", "c1.xhtml"),
            "OEBPS/c1.xhtml"
        );
        assert_eq!(resolve_entry_path("content.opf", "c1.xhtml"), "c1.xhtml");
        assert_eq!(
            resolve_entry_path("a/b/pkg.opf", "text/c1.xhtml"),
            "a/b/text/c1.xhtml"
        );
    }

    #[test]
    fn package_document_at_archive_root() {
        let container = r#"<container><rootfiles>
            <rootfile full-path="content.opf" media-type="application/oebps-package+xml"/>
        </rootfiles></container>"#;
        let opf = r#"<package>
            <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Flat</dc:title></metadata>
            <manifest><item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/></manifest>
            <spine><itemref idref="c1"/></spine>
        </package>"#;
        let entries = [
            ("META-INF/container.xml", container),
            ("content.opf", opf),
            ("c1.xhtml", "<html/>"),
        ];

        let meta = extract_metadata(build_archive(&entries)).unwrap();
        assert_eq!(meta.opf_path, "content.opf");

        let chapter = read_chapter(build_archive(&entries), &meta.stored(), 0).unwrap();
        assert_eq!(chapter.content, "<html/>");
    }
}
