use std::collections::BTreeMap;

use lopdf::{self, content::Content};

use super::cmap::ToUnicode;
use super::fonts::{FontMetrics, FontWidths};
use crate::types::{Matrix, IDENTITY_MATRIX};
use crate::PdfError;

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

/// An indirect object identifier mirroring `lopdf::ObjectId`: (object number, generation number).
pub type ObjectId = (u32, u16);

/// A page identifier: the object id of the page dictionary.
pub type PageId = ObjectId;

/// Maximum number of indirections followed when resolving a reference.
const MAX_INDIRECTIONS: usize = 8;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Where a content stream and its resource dictionary come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Page(PageId),
    /// A Form XObject painted on `page`.  Resources the form does not
    /// declare itself are looked up on the page.
    Form { id: ObjectId, page: PageId },
}

impl Scope {
    pub fn page(&self) -> PageId {
        match self {
            Scope::Page(page) => *page,
            Scope::Form { page, .. } => *page,
        }
    }
}

/// Font information extracted from a resource dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendFontInfo {
    /// The font name key as it appears in the resource dictionary (e.g. `b"F1"`).
    pub name: Vec<u8>,
    /// Base font name from the font dictionary, if present.
    pub base_font: Option<String>,
    /// Font subtype (e.g. `Type1`, `TrueType`, `Type0`).
    pub subtype: Option<String>,
    /// Encoding entry from the font dictionary, if it is a name.
    pub encoding: Option<String>,
    /// Glyph widths and code length.
    pub metrics: FontMetrics,
    /// Parsed `/ToUnicode` CMap, if the font carries one.
    pub to_unicode: Option<ToUnicode>,
}

/// The boxes that determine a page's visible area, inheritance applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBoxes {
    /// `[llx, lly, urx, ury]`
    pub media_box: [f32; 4],
    pub crop_box: Option<[f32; 4]>,
    /// `/Rotate` in degrees as declared (not normalised).
    pub rotate: i64,
}

/// A Form XObject reachable by name from some resource dictionary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormXObject {
    pub id: ObjectId,
    /// The form's `/Matrix` (identity when absent).
    pub matrix: Matrix,
}

/// A simplified, lopdf-independent representation of a PDF value.
///
/// This enum decouples higher-level logic from the concrete `lopdf::Object`
/// type so that the functional core can work with pure data.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f32),
    Name(Vec<u8>),
    Str(Vec<u8>),
    Array(Vec<PdfValue>),
    Dict(Vec<(Vec<u8>, PdfValue)>),
    Reference(ObjectId),
}

/// A single content-stream operation (operator + operands).
#[derive(Debug, Clone)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<PdfValue>,
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Extract an `f32` from a [`PdfValue`], accepting both `Integer` and `Real`.
pub fn get_number_from_value(val: &PdfValue) -> Option<f32> {
    match val {
        PdfValue::Integer(i) => Some(*i as f32),
        PdfValue::Real(f) => Some(*f),
        _ => None,
    }
}

/// Convert a `lopdf::Object` into a [`PdfValue`].
///
/// References are preserved as `PdfValue::Reference`.  Stream dictionaries
/// are converted but the raw stream bytes are discarded.
pub fn convert_object(obj: &lopdf::Object) -> PdfValue {
    match obj {
        lopdf::Object::Null => PdfValue::Null,
        lopdf::Object::Boolean(b) => PdfValue::Bool(*b),
        lopdf::Object::Integer(i) => PdfValue::Integer(*i),
        lopdf::Object::Real(f) => PdfValue::Real(*f),
        lopdf::Object::Name(n) => PdfValue::Name(n.clone()),
        lopdf::Object::String(s, _) => PdfValue::Str(s.clone()),
        lopdf::Object::Array(arr) => PdfValue::Array(arr.iter().map(convert_object).collect()),
        lopdf::Object::Dictionary(dict) => PdfValue::Dict(
            dict.iter()
                .map(|(k, v)| (k.clone(), convert_object(v)))
                .collect(),
        ),
        lopdf::Object::Stream(stream) => PdfValue::Dict(
            stream
                .dict
                .iter()
                .map(|(k, v)| (k.clone(), convert_object(v)))
                .collect(),
        ),
        lopdf::Object::Reference(id) => PdfValue::Reference(*id),
    }
}

/// Best-effort decoding of raw PDF string bytes into a Rust `String`.
///
/// Handles three cases in order:
/// 1. UTF-16BE with BOM (`\xFE\xFF` prefix) -- strips BOM and decodes.
/// 2. Valid UTF-8 -- returned as-is.
/// 3. Fallback to Latin-1 (ISO 8859-1) -- each byte mapped to its Unicode
///    code point.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let code_units: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter(|chunk| chunk.len() == 2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&code_units);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    bytes.iter().map(|&b| b as char).collect()
}

// ---------------------------------------------------------------------------
// PdfBackend trait
// ---------------------------------------------------------------------------

/// Abstraction over a PDF parsing backend (currently backed by `lopdf`).
///
/// The text state machine only talks to this trait, so it can be tested
/// against mock implementations that hand out pre-decoded operations.
pub trait PdfBackend {
    /// Return a mapping from 1-based page number to [`PageId`].
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// Return the MediaBox, CropBox and rotation of a page.
    fn page_boxes(&self, page: PageId) -> Result<PageBoxes, PdfError>;

    /// Return font information for every font declared in the scope's resources.
    fn fonts(&self, scope: Scope) -> Result<Vec<BackendFontInfo>, PdfError>;

    /// Return the decoded content stream bytes of a page or form.
    fn content(&self, scope: Scope) -> Result<Vec<u8>, PdfError>;

    /// Decode raw content-stream bytes into a sequence of [`ContentOp`]s.
    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError>;

    /// Look up a Form XObject by resource name.  Image XObjects and unknown
    /// names yield `None`.
    fn form_xobject(&self, scope: Scope, name: &[u8]) -> Option<FormXObject>;
}

// ---------------------------------------------------------------------------
// LopdfBackend
// ---------------------------------------------------------------------------

/// Concrete [`PdfBackend`] implementation backed by [`lopdf::Document`].
pub struct LopdfBackend {
    doc: lopdf::Document,
}

impl LopdfBackend {
    /// Parse a PDF from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self, PdfError> {
        let doc = lopdf::Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        if doc.is_encrypted() {
            return Err(PdfError::Encrypted);
        }

        log::debug!(
            "loaded PDF {} with {} pages",
            doc.version,
            doc.get_pages().len()
        );

        Ok(Self { doc })
    }

    /// Mutable access for the editor.
    pub(crate) fn doc_mut(&mut self) -> &mut lopdf::Document {
        &mut self.doc
    }

    /// An owned copy of the page's effective resource dictionary, with the
    /// given categories (e.g. `b"XObject"`) resolved to direct dictionaries.
    pub(crate) fn owned_resources(&self, page: PageId, categories: &[&[u8]]) -> lopdf::Dictionary {
        let mut resources = self
            .resources(Scope::Page(page))
            .cloned()
            .unwrap_or_default();
        for &category in categories {
            let resolved = resources
                .get(category)
                .ok()
                .and_then(|o| self.resolve_dict(o))
                .cloned()
                .unwrap_or_default();
            resources.set(category, resolved);
        }
        resources
    }

    /// Total number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    // -- private helpers ----------------------------------------------------

    /// Follow references until a direct object is reached.
    fn resolve<'a>(&'a self, mut obj: &'a lopdf::Object) -> Option<&'a lopdf::Object> {
        for _ in 0..MAX_INDIRECTIONS {
            match obj {
                lopdf::Object::Reference(id) => obj = self.doc.get_object(*id).ok()?,
                other => return Some(other),
            }
        }
        None
    }

    fn resolve_dict<'a>(&'a self, obj: &'a lopdf::Object) -> Option<&'a lopdf::Dictionary> {
        match self.resolve(obj)? {
            lopdf::Object::Dictionary(d) => Some(d),
            lopdf::Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    fn resolve_array<'a>(&'a self, obj: &'a lopdf::Object) -> Option<&'a Vec<lopdf::Object>> {
        self.resolve(obj)?.as_array().ok()
    }

    fn number(&self, obj: &lopdf::Object) -> Option<f32> {
        match self.resolve(obj)? {
            lopdf::Object::Integer(i) => Some(*i as f32),
            lopdf::Object::Real(f) => Some(*f),
            _ => None,
        }
    }

    fn name(&self, dict: &lopdf::Dictionary, key: &[u8]) -> Option<String> {
        dict.get(key)
            .ok()
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).into_owned())
    }

    fn page_dict(&self, page: PageId) -> Result<&lopdf::Dictionary, PdfError> {
        self.doc
            .get_object(page)
            .map_err(|e| PdfError::Parse(format!("cannot get page object: {}", e)))?
            .as_dict()
            .map_err(|e| PdfError::Parse(format!("page object is not a dictionary: {}", e)))
    }

    /// Walk up the page tree to find an inheritable attribute.
    fn find_inherited<'a>(
        &'a self,
        dict: &'a lopdf::Dictionary,
        key: &[u8],
    ) -> Option<&'a lopdf::Object> {
        let mut current = dict;
        for _ in 0..64 {
            if let Ok(obj) = current.get(key) {
                return Some(obj);
            }
            let parent = current.get(b"Parent").ok()?;
            current = self.resolve_dict(parent)?;
        }
        None
    }

    fn rect(&self, obj: &lopdf::Object) -> Result<[f32; 4], PdfError> {
        let arr = self
            .resolve_array(obj)
            .ok_or_else(|| PdfError::Parse("page box is not an array".into()))?;
        let nums: Vec<f32> = arr
            .iter()
            .map(|o| {
                self.number(o).ok_or_else(|| {
                    PdfError::Parse(format!("expected number in page box, got {:?}", o))
                })
            })
            .collect::<Result<_, _>>()?;
        if nums.len() < 4 {
            return Err(PdfError::Parse(format!(
                "page box has {} elements, expected 4",
                nums.len()
            )));
        }
        Ok([nums[0], nums[1], nums[2], nums[3]])
    }

    fn stream_bytes(&self, stream: &lopdf::Stream) -> Result<Vec<u8>, PdfError> {
        if stream.dict.has(b"Filter") {
            stream
                .decompressed_content()
                .map_err(|e| PdfError::Parse(format!("cannot decompress stream: {}", e)))
        } else {
            Ok(stream.content.clone())
        }
    }

    /// The resource dictionary in effect for a scope.
    fn resources(&self, scope: Scope) -> Option<&lopdf::Dictionary> {
        if let Scope::Form { id, .. } = scope {
            let own = self
                .doc
                .get_object(id)
                .ok()
                .and_then(|o| o.as_stream().ok())
                .and_then(|s| s.dict.get(b"Resources").ok())
                .and_then(|r| self.resolve_dict(r));
            if own.is_some() {
                return own;
            }
        }
        let page = self.page_dict(scope.page()).ok()?;
        self.find_inherited(page, b"Resources")
            .and_then(|r| self.resolve_dict(r))
    }

    fn resource_category(&self, scope: Scope, category: &[u8]) -> Option<&lopdf::Dictionary> {
        let resources = self.resources(scope)?;
        resources
            .get(category)
            .ok()
            .and_then(|o| self.resolve_dict(o))
    }

    /// Build a [`BackendFontInfo`] from a font dictionary.
    fn font_info(&self, name: &[u8], dict: &lopdf::Dictionary) -> BackendFontInfo {
        let subtype = self.name(dict, b"Subtype");
        let metrics = match subtype.as_deref() {
            Some("Type0") => self.composite_metrics(dict),
            Some("Type3") => {
                let units = dict
                    .get(b"FontMatrix")
                    .ok()
                    .and_then(|o| self.resolve_array(o))
                    .and_then(|arr| arr.first())
                    .and_then(|o| self.number(o))
                    .unwrap_or(0.001);
                FontMetrics {
                    widths: self.simple_widths(dict),
                    units_per_glyph: units,
                    code_len: 1,
                }
            }
            _ => FontMetrics {
                widths: self.simple_widths(dict),
                ..FontMetrics::default()
            },
        };

        let to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_stream().ok())
            .and_then(|s| self.stream_bytes(s).ok())
            .map(|data| ToUnicode::parse(&data));

        BackendFontInfo {
            name: name.to_vec(),
            base_font: self.name(dict, b"BaseFont"),
            subtype,
            encoding: self.name(dict, b"Encoding"),
            metrics,
            to_unicode,
        }
    }

    fn simple_widths(&self, dict: &lopdf::Dictionary) -> FontWidths {
        let widths: Option<Vec<f32>> = dict
            .get(b"Widths")
            .ok()
            .and_then(|o| self.resolve_array(o))
            .map(|arr| arr.iter().map(|o| self.number(o).unwrap_or(0.0)).collect());
        let Some(widths) = widths else {
            return FontWidths::Unknown;
        };

        let first_char = dict
            .get(b"FirstChar")
            .ok()
            .and_then(|o| self.number(o))
            .unwrap_or(0.0) as u32;
        let missing = dict
            .get(b"FontDescriptor")
            .ok()
            .and_then(|o| self.resolve_dict(o))
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(|o| self.number(o))
            .unwrap_or(0.0);

        FontWidths::Simple {
            first_char,
            widths,
            missing,
        }
    }

    /// Widths of a Type0 font come from its single descendant CID font.
    fn composite_metrics(&self, dict: &lopdf::Dictionary) -> FontMetrics {
        let descendant = dict
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| self.resolve_array(o))
            .and_then(|arr| arr.first())
            .and_then(|o| self.resolve_dict(o));

        let widths = match descendant {
            Some(cid) => {
                let default = cid
                    .get(b"DW")
                    .ok()
                    .and_then(|o| self.number(o))
                    .unwrap_or(1000.0);
                let ranges = cid
                    .get(b"W")
                    .ok()
                    .and_then(|o| self.resolve_array(o))
                    .map(|w| self.cid_width_ranges(w))
                    .unwrap_or_default();
                FontWidths::Composite { default, ranges }
            }
            None => FontWidths::Unknown,
        };

        FontMetrics {
            widths,
            units_per_glyph: 0.001,
            code_len: 2,
        }
    }

    /// A character code: a non-negative integral number that fits in `u32`.
    fn code(&self, obj: &lopdf::Object) -> Option<u32> {
        match self.resolve(obj)? {
            lopdf::Object::Integer(i) => u32::try_from(*i).ok(),
            lopdf::Object::Real(f) if f.is_finite() && f.fract() == 0.0 && *f >= 0.0 => {
                u32::try_from(*f as i64).ok()
            }
            _ => None,
        }
    }

    /// Parse a CID `/W` array: `c [w1 w2 ...]` and `c_first c_last w` forms.
    /// Parsing stops at the first entry whose codes are not valid.
    fn cid_width_ranges(&self, w: &[lopdf::Object]) -> Vec<(u32, u32, f32)> {
        let mut ranges = Vec::new();
        let mut i = 0;
        while i + 1 < w.len() {
            let Some(first) = self.code(&w[i]) else {
                break;
            };
            if let Some(list) = self.resolve_array(&w[i + 1]) {
                let codes = (first..=u32::MAX).zip(list.iter());
                for (code, width) in codes {
                    ranges.push((code, code, self.number(width).unwrap_or(0.0)));
                }
                i += 2;
            } else if i + 2 < w.len() {
                let Some(last) = self.code(&w[i + 1]).filter(|&last| last >= first) else {
                    break;
                };
                let width = self.number(&w[i + 2]).unwrap_or(0.0);
                ranges.push((first, last, width));
                i += 3;
            } else {
                break;
            }
        }
        ranges
    }
}

// ---------------------------------------------------------------------------
// PdfBackend implementation for LopdfBackend
// ---------------------------------------------------------------------------

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    fn page_boxes(&self, page: PageId) -> Result<PageBoxes, PdfError> {
        let dict = self.page_dict(page)?;

        let media_box = self
            .find_inherited(dict, b"MediaBox")
            .ok_or_else(|| PdfError::Parse("MediaBox not found for page".into()))
            .and_then(|o| self.rect(o))?;
        let crop_box = self
            .find_inherited(dict, b"CropBox")
            .and_then(|o| self.rect(o).ok());
        let rotate = self
            .find_inherited(dict, b"Rotate")
            .and_then(|o| self.number(o))
            .map(|r| r as i64)
            .unwrap_or(0);

        Ok(PageBoxes {
            media_box,
            crop_box,
            rotate,
        })
    }

    fn fonts(&self, scope: Scope) -> Result<Vec<BackendFontInfo>, PdfError> {
        let Some(fonts) = self.resource_category(scope, b"Font") else {
            return Ok(Vec::new());
        };

        Ok(fonts
            .iter()
            .filter_map(|(name, obj)| {
                self.resolve_dict(obj)
                    .map(|dict| self.font_info(name, dict))
            })
            .collect())
    }

    fn content(&self, scope: Scope) -> Result<Vec<u8>, PdfError> {
        match scope {
            Scope::Page(page) => self
                .doc
                .get_page_content(page)
                .map_err(|e| PdfError::Parse(format!("cannot get page content: {}", e))),
            Scope::Form { id, .. } => {
                let stream = self
                    .doc
                    .get_object(id)
                    .and_then(|o| o.as_stream())
                    .map_err(|e| PdfError::Parse(format!("cannot get form XObject: {}", e)))?;
                self.stream_bytes(stream)
            }
        }
    }

    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError> {
        let content = Content::decode(data)
            .map_err(|e| PdfError::Parse(format!("content stream decode error: {}", e)))?;

        let ops = content
            .operations
            .into_iter()
            .map(|op| ContentOp {
                operator: op.operator,
                operands: op.operands.iter().map(convert_object).collect(),
            })
            .collect();

        Ok(ops)
    }

    fn form_xobject(&self, scope: Scope, name: &[u8]) -> Option<FormXObject> {
        let xobjects = self.resource_category(scope, b"XObject")?;
        let id = xobjects.get(name).ok()?.as_reference().ok()?;
        let stream = self.doc.get_object(id).ok()?.as_stream().ok()?;
        if self.name(&stream.dict, b"Subtype").as_deref() != Some("Form") {
            return None;
        }

        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|o| self.resolve_array(o))
            .map(|arr| arr.iter().filter_map(|o| self.number(o)).collect::<Vec<_>>())
            .filter(|nums| nums.len() == 6)
            .map(|m| [m[0], m[1], m[2], m[3], m[4], m[5]])
            .unwrap_or(IDENTITY_MATRIX);

        Some(FormXObject { id, matrix })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
