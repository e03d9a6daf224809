use std::collections::BTreeSet;

use super::PdfError;

/// A page selection as submitted from the split form. Pages are 1-indexed
/// throughout; resolution against a concrete document happens in
/// [`PageSelection::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSelection {
    /// Contiguous inclusive range.
    Range { start: u32, end: u32 },
    /// Explicit list parsed from a spec such as `1,3,5-7`.
    Explicit(Vec<(u32, u32)>),
    /// Every even-numbered page.
    Even,
    /// Every odd-numbered page.
    Odd,
}

impl PageSelection {
    /// Parses a comma-separated page spec (`1,3,5-7`) into an explicit
    /// selection. Whitespace around parts is tolerated.
    pub fn parse_spec(spec: &str) -> Result<Self, PdfError> {
        let mut parts = Vec::new();

        for raw in spec.split(',') {
            let part = raw.trim();
            if part.is_empty() {
                continue;
            }

            if let Some((lo, hi)) = part.split_once('-') {
                let start = parse_page_number(lo)?;
                let end = parse_page_number(hi)?;
                if start > end {
                    return Err(PdfError::InvalidSelection(format!(
                        "range {start}-{end} is reversed"
                    )));
                }
                parts.push((start, end));
            } else {
                let page = parse_page_number(part)?;
                parts.push((page, page));
            }
        }

        if parts.is_empty() {
            return Err(PdfError::InvalidSelection(
                "no pages specified".to_string(),
            ));
        }

        Ok(PageSelection::Explicit(parts))
    }

    /// Resolves the selection against a document with `page_count` pages,
    /// returning sorted, de-duplicated 1-indexed page numbers.
    ///
    /// Ranges must fall entirely within the document; explicit specs follow
    /// the looser rule of dropping out-of-range pages and only failing when
    /// nothing is left.
    pub fn resolve(&self, page_count: u32) -> Result<Vec<u32>, PdfError> {
        let pages: Vec<u32> = match self {
            PageSelection::Range { start, end } => {
                if *start < 1 || *end > page_count || start > end {
                    return Err(PdfError::InvalidSelection(format!(
                        "invalid page range; enter pages between 1 and {page_count}"
                    )));
                }
                (*start..=*end).collect()
            }
            PageSelection::Explicit(parts) => {
                let mut set = BTreeSet::new();
                for (start, end) in parts {
                    for page in *start..=*end {
                        if page >= 1 && page <= page_count {
                            set.insert(page);
                        }
                    }
                }
                set.into_iter().collect()
            }
            PageSelection::Even => (1..=page_count).filter(|p| p % 2 == 0).collect(),
            PageSelection::Odd => (1..=page_count).filter(|p| p % 2 != 0).collect(),
        };

        if pages.is_empty() {
            return Err(PdfError::InvalidSelection(
                "no pages selected to split".to_string(),
            ));
        }

        Ok(pages)
    }
}

fn parse_page_number(input: &str) -> Result<u32, PdfError> {
    let trimmed = input.trim();
    let value: u32 = trimmed.parse().map_err(|_| {
        PdfError::InvalidSelection(format!("`{trimmed}` is not a valid page number"))
    })?;
    if value == 0 {
        return Err(PdfError::InvalidSelection(
            "page numbers start at 1".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_spec() {
        let selection = PageSelection::parse_spec("1, 3,5-7").expect("parse");
        assert_eq!(
            selection,
            PageSelection::Explicit(vec![(1, 1), (3, 3), (5, 7)])
        );
    }

    #[test]
    fn rejects_reversed_range_in_spec() {
        assert!(PageSelection::parse_spec("7-5").is_err());
    }

    #[test]
    fn rejects_zero_page() {
        assert!(PageSelection::parse_spec("0,2").is_err());
    }

    #[test]
    fn rejects_empty_spec() {
        assert!(PageSelection::parse_spec(" , ").is_err());
    }

    #[test]
    fn resolves_range_within_bounds() {
        let pages = PageSelection::Range { start: 2, end: 4 }
            .resolve(10)
            .expect("resolve");
        assert_eq!(pages, vec![2, 3, 4]);
    }

    #[test]
    fn range_out_of_bounds_fails() {
        assert!(PageSelection::Range { start: 2, end: 11 }.resolve(10).is_err());
    }

    #[test]
    fn explicit_drops_out_of_range_pages() {
        let selection = PageSelection::parse_spec("1,9,12").expect("parse");
        assert_eq!(selection.resolve(10).expect("resolve"), vec![1, 9]);
    }

    #[test]
    fn explicit_with_nothing_in_range_fails() {
        let selection = PageSelection::parse_spec("11,12").expect("parse");
        assert!(selection.resolve(10).is_err());
    }

    #[test]
    fn even_and_odd_partition_document() {
        let even = PageSelection::Even.resolve(5).expect("even");
        let odd = PageSelection::Odd.resolve(5).expect("odd");
        assert_eq!(even, vec![2, 4]);
        assert_eq!(odd, vec![1, 3, 5]);
    }

    #[test]
    fn odd_on_single_page_document() {
        assert_eq!(PageSelection::Odd.resolve(1).expect("odd"), vec![1]);
    }

    #[test]
    fn even_on_single_page_document_fails() {
        assert!(PageSelection::Even.resolve(1).is_err());
    }
}
