use std::collections::BTreeMap;

use thiserror::Error;

use parser::backend::{LopdfBackend, PageBoxes, PageId, PdfBackend};

pub mod edit;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod parser;
pub mod types;

pub use edit::Editor;
pub use types::*;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("Document is encrypted")]
    Encrypted,
    #[error("Page {page} is out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: usize },
    #[error("Image error: {0}")]
    Image(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A decoded PDF document.
///
/// Constructed via [`Document::from_bytes`]. Pages are addressed by their
/// 1-based number in page-tree order.
pub struct Document {
    backend: LopdfBackend,
    pages: BTreeMap<u32, PageId>,
}

impl Document {
    /// Parse PDF bytes. Encrypted documents are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        let backend = LopdfBackend::load_bytes(bytes)?;
        let pages = backend.pages();
        Ok(Self { backend, pages })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Get a page by its 1-based number.
    pub fn page(&self, number: u32) -> Result<Page<'_>, PdfError> {
        let id = self
            .pages
            .get(&number)
            .copied()
            .ok_or(PdfError::PageOutOfRange {
                page: number,
                count: self.pages.len(),
            })?;
        Ok(Page {
            backend: &self.backend,
            number,
            id,
        })
    }

    /// Iterate over all pages in ascending order.
    pub fn pages(&self) -> impl Iterator<Item = Page<'_>> {
        self.pages.iter().map(|(&number, &id)| Page {
            backend: &self.backend,
            number,
            id,
        })
    }
}

/// A single page of a [`Document`].
pub struct Page<'a> {
    backend: &'a dyn PdfBackend,
    number: u32,
    id: PageId,
}

impl Page<'_> {
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Text runs in content-stream order.
    pub fn text_runs(&self) -> Result<Vec<TextRun>, PdfError> {
        parser::text::page_text_runs(self.backend, self.id)
    }

    /// Page extents at `scale`, rotation applied.
    pub fn geometry(&self, scale: f32) -> Result<PageGeometry, PdfError> {
        let boxes = self.backend.page_boxes(self.id)?;
        Ok(page_geometry(&boxes, scale))
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Normalise a rectangle so that `[0..2]` is the lower-left corner.
fn normalize(r: [f32; 4]) -> [f32; 4] {
    [r[0].min(r[2]), r[1].min(r[3]), r[0].max(r[2]), r[1].max(r[3])]
}

/// The visible area of a page: CropBox clipped to MediaBox.  A CropBox that
/// does not overlap the MediaBox is ignored.
pub(crate) fn view_box(boxes: &PageBoxes) -> [f32; 4] {
    let media = normalize(boxes.media_box);
    let Some(crop) = boxes.crop_box.map(normalize) else {
        return media;
    };

    let clipped = [
        crop[0].max(media[0]),
        crop[1].max(media[1]),
        crop[2].min(media[2]),
        crop[3].min(media[3]),
    ];
    if clipped[0] < clipped[2] && clipped[1] < clipped[3] {
        clipped
    } else {
        media
    }
}

fn page_geometry(boxes: &PageBoxes, scale: f32) -> PageGeometry {
    let view = view_box(boxes);
    let width = (view[2] - view[0]) * scale;
    let height = (view[3] - view[1]) * scale;

    match boxes.rotate.rem_euclid(360) {
        90 | 270 => PageGeometry {
            width: height,
            height: width,
        },
        _ => PageGeometry { width, height },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes(media_box: [f32; 4], crop_box: Option<[f32; 4]>, rotate: i64) -> PageBoxes {
        PageBoxes {
            media_box,
            crop_box,
            rotate,
        }
    }

    #[test]
    fn test_geometry_letter() {
        let g = page_geometry(&boxes([0.0, 0.0, 612.0, 792.0], None, 0), 1.0);
        assert_eq!(g, PageGeometry { width: 612.0, height: 792.0 });
    }

    #[test]
    fn test_geometry_scale() {
        let g = page_geometry(&boxes([0.0, 0.0, 612.0, 792.0], None, 0), 2.0);
        assert_eq!(g, PageGeometry { width: 1224.0, height: 1584.0 });
    }

    #[test]
    fn test_geometry_rotation_swaps() {
        let media = [0.0, 0.0, 612.0, 792.0];
        for rotate in [90, 270, -90, 450] {
            let g = page_geometry(&boxes(media, None, rotate), 1.0);
            assert_eq!(g, PageGeometry { width: 792.0, height: 612.0 }, "rotate {rotate}");
        }
        let g = page_geometry(&boxes(media, None, 180), 1.0);
        assert_eq!(g.width, 612.0);
    }

    #[test]
    fn test_view_box_crop_clipped_to_media() {
        let b = boxes(
            [0.0, 0.0, 612.0, 792.0],
            Some([36.0, -10.0, 700.0, 756.0]),
            0,
        );
        assert_eq!(view_box(&b), [36.0, 0.0, 612.0, 756.0]);
    }

    #[test]
    fn test_view_box_disjoint_crop_ignored() {
        let b = boxes(
            [0.0, 0.0, 100.0, 100.0],
            Some([200.0, 200.0, 300.0, 300.0]),
            0,
        );
        assert_eq!(view_box(&b), [0.0, 0.0, 100.0, 100.0]);
    }

    #[test]
    fn test_view_box_normalizes_corners() {
        let b = boxes([612.0, 792.0, 0.0, 0.0], None, 0);
        assert_eq!(view_box(&b), [0.0, 0.0, 612.0, 792.0]);
    }

    #[test]
    fn test_from_bytes_rejects_empty() {
        assert!(matches!(Document::from_bytes(&[]), Err(PdfError::Parse(_))));
    }

    #[test]
    fn test_document_pages_and_runs() {
        let bytes = fixtures::pages(&[
            &[("Invoice", 72.0, 700.0)],
            &[("Total", 72.0, 100.0), ("Invoice", 300.0, 100.0)],
        ]);
        let doc = Document::from_bytes(&bytes).unwrap();
        assert_eq!(doc.page_count(), 2);

        let numbers: Vec<u32> = doc.pages().map(|p| p.number()).collect();
        assert_eq!(numbers, vec![1, 2]);

        let page = doc.page(1).unwrap();
        let runs = page.text_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "Invoice");
        assert_eq!((runs[0].x(), runs[0].y()), (72.0, 700.0));
        assert!((runs[0].width - 7.0 * 0.6 * fixtures::FONT_SIZE).abs() < 1e-3);
        assert_eq!(runs[0].height, fixtures::FONT_SIZE);
        assert_eq!(runs[0].font_name, "Courier");

        let geometry = page.geometry(1.0).unwrap();
        assert_eq!(geometry, PageGeometry { width: 612.0, height: 792.0 });

        let texts: Vec<String> = doc
            .page(2)
            .unwrap()
            .text_runs()
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["Total", "Invoice"]);
    }

    #[test]
    fn test_page_out_of_range() {
        let bytes = fixtures::pages(&[&[("x", 0.0, 0.0)]]);
        let doc = Document::from_bytes(&bytes).unwrap();
        assert!(matches!(
            doc.page(2),
            Err(PdfError::PageOutOfRange { page: 2, count: 1 })
        ));
        assert!(doc.page(0).is_err());
    }

    #[test]
    fn test_empty_page_tree() {
        let doc = Document::from_bytes(&fixtures::pages(&[])).unwrap();
        assert_eq!(doc.page_count(), 0);
        assert_eq!(doc.pages().count(), 0);
    }
}
