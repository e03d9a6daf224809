//! PDF manipulation primitives backed by `lopdf`.
//!
//! All operations work on in-memory byte buffers; callers own file I/O. The
//! functions here are CPU-bound and are expected to run under
//! `spawn_blocking` when called from request handlers.

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Write};

use lopdf::{Dictionary, Document, Object, ObjectId};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

mod select;

pub use select::PageSelection;

/// Error produced by PDF operations. The message is safe to surface to the
/// end user.
#[derive(Debug)]
pub enum PdfError {
    /// The input could not be parsed as a usable PDF.
    Invalid(String),
    /// The requested page selection is not satisfiable.
    InvalidSelection(String),
    /// The operation itself failed (serialization, packaging).
    Operation(String),
}

impl PdfError {
    pub fn message(&self) -> &str {
        match self {
            PdfError::Invalid(msg) | PdfError::InvalidSelection(msg) | PdfError::Operation(msg) => {
                msg
            }
        }
    }
}

impl std::fmt::Display for PdfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for PdfError {}

/// Basic facts about an uploaded document.
#[derive(Debug, Clone, Copy)]
pub struct PdfSummary {
    pub page_count: u32,
}

/// Which pages a rotation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTarget {
    All,
    Even,
    Odd,
}

impl RotationTarget {
    pub fn from_form_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "even" => RotationTarget::Even,
            "odd" => RotationTarget::Odd,
            _ => RotationTarget::All,
        }
    }

    fn applies_to(self, page_number: u32) -> bool {
        match self {
            RotationTarget::All => true,
            RotationTarget::Even => page_number % 2 == 0,
            RotationTarget::Odd => page_number % 2 != 0,
        }
    }
}

/// Loads a document and checks it is usable: parseable, not encrypted, and
/// containing at least one page.
pub fn inspect(bytes: &[u8]) -> Result<PdfSummary, PdfError> {
    let doc = load(bytes)?;
    let page_count = doc.get_pages().len() as u32;
    if page_count == 0 {
        return Err(PdfError::Invalid("the PDF has no pages".to_string()));
    }
    Ok(PdfSummary { page_count })
}

/// Extracts the given 1-indexed pages into a standalone document.
///
/// Builds by deleting the complement and pruning orphaned objects, which
/// keeps shared resources (fonts, images) intact without walking the
/// dependency graph by hand.
pub fn extract_pages(bytes: &[u8], pages: &[u32]) -> Result<Vec<u8>, PdfError> {
    if pages.is_empty() {
        return Err(PdfError::InvalidSelection(
            "no pages specified".to_string(),
        ));
    }

    let doc = load(bytes)?;
    let page_count = doc.get_pages().len() as u32;

    for &page in pages {
        if page == 0 || page > page_count {
            return Err(PdfError::InvalidSelection(format!(
                "page {page} does not exist (document has {page_count} pages)"
            )));
        }
    }

    let keep: HashSet<u32> = pages.iter().copied().collect();
    let mut to_delete: Vec<u32> = (1..=page_count).filter(|p| !keep.contains(p)).collect();

    let mut subset = doc;
    // Delete back-to-front so page numbers stay stable while deleting.
    to_delete.reverse();
    for page in to_delete {
        subset.delete_pages(&[page]);
    }

    subset.prune_objects();
    subset.compress();
    save(subset)
}

/// Splits a document into one single-page PDF per selected page and packs
/// them into a ZIP archive (`page_<n>.pdf` members).
pub fn split_to_zip(bytes: &[u8], pages: &[u32]) -> Result<Vec<u8>, PdfError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for &page in pages {
        let single = extract_pages(bytes, &[page])?;
        zip.start_file(format!("page_{page}.pdf"), options)
            .map_err(|err| PdfError::Operation(format!("failed to start archive entry: {err}")))?;
        zip.write_all(&single)
            .map_err(|err| PdfError::Operation(format!("failed to write archive entry: {err}")))?;
    }

    let cursor = zip
        .finish()
        .map_err(|err| PdfError::Operation(format!("failed to finalize archive: {err}")))?;
    Ok(cursor.into_inner())
}

/// Concatenates the inputs, in order, into a single document.
///
/// Each source is renumbered past the running maximum object id, its page
/// objects are reparented under a fresh page tree, and non-structural
/// objects are carried over wholesale.
pub fn merge(inputs: &[Vec<u8>]) -> Result<Vec<u8>, PdfError> {
    if inputs.len() < 2 {
        return Err(PdfError::InvalidSelection(
            "merging requires at least two PDF files".to_string(),
        ));
    }

    let mut max_id: u32 = 1;
    let mut page_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut carried_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for (index, bytes) in inputs.iter().enumerate() {
        let mut doc = load(bytes).map_err(|err| {
            PdfError::Invalid(format!("input {}: {}", index + 1, err.message()))
        })?;

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for &page_id in doc.get_pages().values() {
            if let Ok(page) = doc.get_object(page_id) {
                page_objects.insert(page_id, page.clone());
            }
        }

        for (object_id, object) in doc.objects {
            match object.type_name().unwrap_or("") {
                "Catalog" | "Pages" | "Page" | "Outlines" | "Outline" => {}
                _ => {
                    carried_objects.insert(object_id, object);
                }
            }
        }
    }

    if page_objects.is_empty() {
        return Err(PdfError::Invalid(
            "none of the inputs contained any pages".to_string(),
        ));
    }

    let mut document = Document::with_version("1.5");
    for (object_id, object) in carried_objects {
        document.objects.insert(object_id, object);
    }

    let pages_id = document.new_object_id();
    for (object_id, object) in &page_objects {
        if let Object::Dictionary(dict) = object {
            let mut page = dict.clone();
            page.set("Parent", Object::Reference(pages_id));
            document.objects.insert(*object_id, Object::Dictionary(page));
        }
    }

    let kids: Vec<Object> = page_objects.keys().map(|&id| Object::Reference(id)).collect();
    let pages_dict = Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(page_objects.len() as i64)),
    ]);
    document
        .objects
        .insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = document.new_object_id();
    let catalog_dict = Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    document
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));
    document.trailer.set("Root", Object::Reference(catalog_id));
    document.max_id = document.objects.len() as u32;

    document.renumber_objects();
    document.compress();
    save(document)
}

/// Rotates the targeted pages by `angle` degrees clockwise. Valid angles are
/// 90, 180 and 270; the rotation composes with any existing `/Rotate` entry.
pub fn rotate(bytes: &[u8], angle: i64, target: RotationTarget) -> Result<Vec<u8>, PdfError> {
    if !matches!(angle, 90 | 180 | 270) {
        return Err(PdfError::InvalidSelection(format!(
            "unsupported rotation angle {angle}; use 90, 180 or 270"
        )));
    }

    let mut doc = load(bytes)?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(PdfError::Invalid("the PDF has no pages".to_string()));
    }

    for (&page_number, &page_id) in &pages {
        if !target.applies_to(page_number) {
            continue;
        }

        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| PdfError::Operation(format!("unreadable page object: {err}")))?;

        let existing = page
            .get(b"Rotate")
            .ok()
            .and_then(|value| value.as_i64().ok())
            .unwrap_or(0);
        let rotated = (existing + angle).rem_euclid(360);
        page.set("Rotate", Object::Integer(rotated));
    }

    save(doc)
}

/// Recompresses page content streams, the same "good enough" compression the
/// original tool offered.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut doc = load(bytes)?;
    if doc.get_pages().is_empty() {
        return Err(PdfError::Invalid("the PDF has no pages".to_string()));
    }
    doc.compress();
    save(doc)
}

fn load(bytes: &[u8]) -> Result<Document, PdfError> {
    let doc = Document::load_mem(bytes)
        .map_err(|err| PdfError::Invalid(format!("not a valid PDF file: {err}")))?;
    if doc.is_encrypted() {
        return Err(PdfError::Invalid(
            "encrypted PDFs are not supported".to_string(),
        ));
    }
    Ok(doc)
}

fn save(mut doc: Document) -> Result<Vec<u8>, PdfError> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|err| PdfError::Operation(format!("failed to serialize PDF: {err}")))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::StringFormat;
    use lopdf::content::{Content, Operation};
    use lopdf::Stream;
    use std::io::Read;
    use zip::ZipArchive;

    // Builds a minimal n-page PDF with one text operation per page.
    fn sample_pdf(num_pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        let resources_id = doc.add_object(Dictionary::from_iter([(
            "Font",
            Object::Dictionary(Dictionary::from_iter([(
                "F1",
                Object::Reference(font_id),
            )])),
        )]));

        let mut kids = Vec::new();
        for page in 1..=num_pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![100.into(), 700.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::String(
                            format!("Page {page}").into_bytes(),
                            StringFormat::Literal,
                        )],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                Dictionary::new(),
                content.encode().expect("encode content"),
            ));
            let page_id = doc.add_object(Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Resources", Object::Reference(resources_id)),
                (
                    "MediaBox",
                    Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
                ),
                ("Contents", Object::Reference(content_id)),
            ]));
            kids.push(Object::Reference(page_id));
        }

        let pages_dict = Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(num_pages as i64)),
            ("Kids", Object::Array(kids)),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save sample pdf");
        bytes
    }

    #[test]
    fn inspect_counts_pages() {
        let summary = inspect(&sample_pdf(4)).expect("inspect");
        assert_eq!(summary.page_count, 4);
    }

    #[test]
    fn inspect_rejects_garbage() {
        assert!(inspect(b"definitely not a pdf").is_err());
    }

    #[test]
    fn extract_keeps_requested_pages_only() {
        let bytes = sample_pdf(5);
        let subset = extract_pages(&bytes, &[2, 4]).expect("extract");
        let summary = inspect(&subset).expect("inspect subset");
        assert_eq!(summary.page_count, 2);
    }

    #[test]
    fn extract_rejects_out_of_range_page() {
        let bytes = sample_pdf(3);
        assert!(extract_pages(&bytes, &[4]).is_err());
    }

    #[test]
    fn split_packs_one_pdf_per_page() {
        let bytes = sample_pdf(3);
        let archive_bytes = split_to_zip(&bytes, &[1, 3]).expect("split");

        let mut archive = ZipArchive::new(Cursor::new(archive_bytes)).expect("open zip");
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).expect("entry").name().to_string())
            .collect();
        assert_eq!(names, vec!["page_1.pdf", "page_3.pdf"]);

        let mut member = Vec::new();
        archive
            .by_name("page_1.pdf")
            .expect("member")
            .read_to_end(&mut member)
            .expect("read member");
        assert_eq!(inspect(&member).expect("member pdf").page_count, 1);
    }

    #[test]
    fn merge_concatenates_in_order() {
        let merged = merge(&[sample_pdf(2), sample_pdf(3)]).expect("merge");
        assert_eq!(inspect(&merged).expect("inspect merged").page_count, 5);
    }

    #[test]
    fn merge_requires_two_inputs() {
        assert!(merge(&[sample_pdf(2)]).is_err());
    }

    #[test]
    fn rotate_sets_rotation_entry() {
        let rotated = rotate(&sample_pdf(2), 90, RotationTarget::All).expect("rotate");
        let doc = Document::load_mem(&rotated).expect("reload");
        for &page_id in doc.get_pages().values() {
            let page = doc.get_object(page_id).and_then(Object::as_dict).expect("page dict");
            let angle = page
                .get(b"Rotate")
                .and_then(|value| value.as_i64())
                .expect("rotate entry");
            assert_eq!(angle, 90);
        }
    }

    #[test]
    fn rotate_odd_leaves_even_pages_untouched() {
        let rotated = rotate(&sample_pdf(2), 180, RotationTarget::Odd).expect("rotate");
        let doc = Document::load_mem(&rotated).expect("reload");
        let pages = doc.get_pages();

        let angle_of = |page_number: u32| {
            let page_id = pages[&page_number];
            doc.get_object(page_id)
                .and_then(Object::as_dict)
                .expect("page dict")
                .get(b"Rotate")
                .and_then(|value| value.as_i64())
                .unwrap_or(0)
        };

        assert_eq!(angle_of(1), 180);
        assert_eq!(angle_of(2), 0);
    }

    #[test]
    fn rotate_rejects_bad_angle() {
        assert!(rotate(&sample_pdf(1), 45, RotationTarget::All).is_err());
    }

    #[test]
    fn compress_roundtrips() {
        let compressed = compress(&sample_pdf(3)).expect("compress");
        assert_eq!(inspect(&compressed).expect("inspect").page_count, 3);
    }
}
