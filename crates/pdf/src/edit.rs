//! Document editing: black-box redaction annotations and image watermarks.
//!
//! ```text
//! Editor::from_bytes(pdf)?
//!     .redact(&redactions)?
//!     .watermark(&watermark)?
//!     .to_bytes()?
//! ```

use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};

use crate::parser::backend::{LopdfBackend, PageId, PdfBackend};
use crate::types::{Redaction, Watermark};
use crate::{view_box, PdfError};

/// Resource names used for the watermark.  Unusual enough not to clash with
/// names a producer would pick.
const WATERMARK_IMAGE: &str = "PdfmatchWm";
const WATERMARK_GSTATE: &str = "PdfmatchWmGs";

/// A PDF opened for modification.
pub struct Editor {
    backend: LopdfBackend,
}

impl Editor {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        Ok(Self {
            backend: LopdfBackend::load_bytes(bytes)?,
        })
    }

    pub fn page_count(&self) -> usize {
        self.backend.page_count()
    }

    fn page_id(&self, number: u32) -> Result<PageId, PdfError> {
        let pages = self.backend.pages();
        pages
            .get(&number)
            .copied()
            .ok_or(PdfError::PageOutOfRange {
                page: number,
                count: pages.len(),
            })
    }

    /// Add one filled black Square annotation per redaction, named
    /// `redact<i>` after its index.
    pub fn redact(&mut self, redactions: &[Redaction]) -> Result<&mut Self, PdfError> {
        let date = pdf_date(chrono::Utc::now());

        for (i, r) in redactions.iter().enumerate() {
            let page = self.page_id(r.page)?;
            let doc = self.backend.doc_mut();

            let width = r.width.abs();
            let height = r.height.abs();
            let appearance = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), Object::Real(width), Object::Real(height)],
                },
                format!("0 g 0 G 1 w 0 0 {width} {height} re B").into_bytes(),
            ));

            let annot = doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Square",
                "Rect" => vec![
                    Object::Real(r.x),
                    Object::Real(r.y),
                    Object::Real(r.x + r.width),
                    Object::Real(r.y + r.height),
                ],
                "NM" => Object::string_literal(format!("redact{i}")),
                "M" => Object::string_literal(date.clone()),
                "F" => 0,
                "C" => vec![0.into(), 0.into(), 0.into()],
                "IC" => vec![0.into(), 0.into(), 0.into()],
                "BS" => dictionary! { "W" => 1, "S" => "S" },
                "Border" => vec![0.into(), 0.into(), 1.into()],
                "AP" => dictionary! { "N" => appearance },
                "P" => page,
            });
            push_annotation(doc, page, annot)?;

            log::debug!(
                "added redaction {} on page {} at ({}, {}) {}x{}",
                i,
                r.page,
                r.x,
                r.y,
                r.width,
                r.height
            );
        }

        Ok(self)
    }

    /// Stamp an image on every page, centred and scaled to fit
    /// `watermark.scale` of the visible area.
    pub fn watermark(&mut self, watermark: &Watermark) -> Result<&mut Self, PdfError> {
        let img = image::load_from_memory(&watermark.image)
            .map_err(|e| PdfError::Image(e.to_string()))?
            .to_rgba8();
        let (img_w, img_h) = img.dimensions();
        if img_w == 0 || img_h == 0 {
            return Err(PdfError::Image("watermark image is empty".into()));
        }

        let mut rgb = Vec::with_capacity((img_w * img_h * 3) as usize);
        let mut alpha = Vec::with_capacity((img_w * img_h) as usize);
        for px in img.pixels() {
            rgb.extend_from_slice(&px.0[..3]);
            alpha.push(px.0[3]);
        }

        let pages: Vec<PageId> = self.backend.pages().into_values().collect();
        let placements = pages
            .iter()
            .map(|&page| -> Result<_, PdfError> {
                let view = view_box(&self.backend.page_boxes(page)?);
                let resources = self
                    .backend
                    .owned_resources(page, &[b"XObject".as_slice(), b"ExtGState".as_slice()]);
                Ok((page, view, resources))
            })
            .collect::<Result<Vec<_>, PdfError>>()?;

        let doc = self.backend.doc_mut();

        let smask = doc.add_object(compressed(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => img_w as i64,
                "Height" => img_h as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        let image = doc.add_object(compressed(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => img_w as i64,
                "Height" => img_h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "SMask" => smask,
            },
            rgb,
        ));
        let gstate = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => Object::Real(watermark.opacity),
            "CA" => Object::Real(watermark.opacity),
        });

        for (page, view, mut resources) in placements {
            let page_w = view[2] - view[0];
            let page_h = view[3] - view[1];
            let fit = (page_w * watermark.scale / img_w as f32)
                .min(page_h * watermark.scale / img_h as f32);
            let w = img_w as f32 * fit;
            let h = img_h as f32 * fit;
            let x = view[0] + (page_w - w) / 2.0;
            let y = view[1] + (page_h - h) / 2.0;

            add_resource(&mut resources, b"XObject", WATERMARK_IMAGE, image);
            add_resource(&mut resources, b"ExtGState", WATERMARK_GSTATE, gstate);

            let stamp = doc.add_object(Stream::new(
                dictionary! {},
                format!(
                    "q /{WATERMARK_GSTATE} gs {w} 0 0 {h} {x} {y} cm /{WATERMARK_IMAGE} Do Q"
                )
                .into_bytes(),
            ));
            let existing = page_contents(doc, page)?;
            let contents = if watermark.on_top {
                let save = doc.add_object(Stream::new(dictionary! {}, b"q".to_vec()));
                let restore = doc.add_object(Stream::new(dictionary! {}, b"Q".to_vec()));
                let mut all = vec![Object::Reference(save)];
                all.extend(existing);
                all.extend([Object::Reference(restore), Object::Reference(stamp)]);
                all
            } else {
                let mut all = vec![Object::Reference(stamp)];
                all.extend(existing);
                all
            };

            let page_dict = page_dict_mut(doc, page)?;
            page_dict.set("Resources", resources);
            page_dict.set("Contents", contents);
        }

        log::debug!(
            "watermarked {} pages with a {}x{} image",
            pages.len(),
            img_w,
            img_h
        );

        Ok(self)
    }

    /// Serialise the edited document.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, PdfError> {
        let mut bytes = Vec::new();
        self.backend
            .doc_mut()
            .save_to(&mut bytes)
            .map_err(|e| PdfError::Parse(format!("cannot write PDF: {}", e)))?;
        Ok(bytes)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Format a timestamp as a PDF date string (`D:YYYYMMDDHHmmSSZ`).
fn pdf_date(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("D:{}Z", now.format("%Y%m%d%H%M%S"))
}

fn compressed(dict: Dictionary, content: Vec<u8>) -> Stream {
    let mut stream = Stream::new(dict, content);
    if let Err(e) = stream.compress() {
        log::warn!("storing image stream uncompressed: {}", e);
    }
    stream
}

fn page_dict_mut(doc: &mut lopdf::Document, page: PageId) -> Result<&mut Dictionary, PdfError> {
    doc.get_object_mut(page)
        .and_then(|o| o.as_dict_mut())
        .map_err(|e| PdfError::Parse(format!("page object is not a dictionary: {}", e)))
}

/// Append an annotation reference to the page's `/Annots`, which may be
/// missing, inline or an indirect array.
fn push_annotation(
    doc: &mut lopdf::Document,
    page: PageId,
    annot: ObjectId,
) -> Result<(), PdfError> {
    let existing = page_dict_mut(doc, page)?.get(b"Annots").ok().cloned();

    match existing {
        Some(Object::Reference(id)) => {
            let annots = doc
                .get_object_mut(id)
                .and_then(|o| o.as_array_mut())
                .map_err(|e| PdfError::Parse(format!("/Annots is not an array: {}", e)))?;
            annots.push(Object::Reference(annot));
        }
        Some(Object::Array(mut annots)) => {
            annots.push(Object::Reference(annot));
            page_dict_mut(doc, page)?.set("Annots", annots);
        }
        _ => {
            page_dict_mut(doc, page)?.set("Annots", vec![Object::Reference(annot)]);
        }
    }
    Ok(())
}

/// The page's content streams as a list of references.
fn page_contents(doc: &lopdf::Document, page: PageId) -> Result<Vec<Object>, PdfError> {
    let dict = doc
        .get_object(page)
        .and_then(|o| o.as_dict())
        .map_err(|e| PdfError::Parse(format!("page object is not a dictionary: {}", e)))?;

    Ok(match dict.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    })
}

fn add_resource(resources: &mut Dictionary, category: &[u8], name: &str, id: ObjectId) {
    let mut entries = resources
        .get(category)
        .ok()
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    entries.set(name, id);
    resources.set(category, entries);
}
