//! Content-stream interpretation into positioned [`TextRun`]s.
//!
//! A simplified PDF graphics + text state machine.  Every public function is
//! a pure transformation over the [`PdfBackend`] trait, so the whole module
//! can be exercised against mock backends.
//!
//! ```text
//! content ops  ->  GraphicsState / TextObject  ->  TextRun[]
//!   (per scope)      q Q cm, BT Tf Tm Td ...       one per show operator
//! ```

use std::rc::Rc;

use super::backend::{
    get_number_from_value, BackendFontInfo, ObjectId, PageId, PdfBackend, PdfValue, Scope,
};
use super::fonts::{decode_show_string, DecodedText};
use crate::types::{multiply, Matrix, TextRun, IDENTITY_MATRIX};
use crate::PdfError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Nesting limit for Form XObjects painted from other forms.
const MAX_FORM_DEPTH: usize = 16;

/// A `TJ` kerning gap wider than this fraction of an em is read as a word
/// break and becomes a space in the run text.
const WORD_GAP_RATIO: f32 = 0.15;

// ---------------------------------------------------------------------------
// Internal: state
// ---------------------------------------------------------------------------

/// The part of the graphics state that text positioning depends on.  Saved
/// and restored as a whole by `q` / `Q`.
#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    /// Resolved font for the current `Tf`, if the key was found.
    font: Option<Rc<BackendFontInfo>>,
    /// Name reported on runs: the base font, else the resource key.
    font_name: String,
    font_size: f32,
    /// Character spacing (Tc).
    char_spacing: f32,
    /// Word spacing (Tw).
    word_spacing: f32,
    /// Horizontal scaling factor (Tz / 100).
    horiz_scale: f32,
    /// Leading (TL).
    leading: f32,
    /// Text rise (Ts).
    rise: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY_MATRIX,
            font: None,
            font_name: String::new(),
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horiz_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// Text and line matrices; only meaningful between `BT` and `ET`.
#[derive(Debug, Clone, Copy)]
struct TextObject {
    tm: Matrix,
    tlm: Matrix,
}

impl Default for TextObject {
    fn default() -> Self {
        Self {
            tm: IDENTITY_MATRIX,
            tlm: IDENTITY_MATRIX,
        }
    }
}

impl TextObject {
    /// Translate the line matrix and reset the text matrix to it (Td).
    fn next_line(&mut self, tx: f32, ty: f32) {
        self.tlm = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.tlm);
        self.tm = self.tlm;
    }

    /// Move along the baseline by `tx` text-space units.
    fn advance(&mut self, tx: f32) {
        self.tm = multiply(&[1.0, 0.0, 0.0, 1.0, tx, 0.0], &self.tm);
    }
}

fn numbers<const N: usize>(operands: &[PdfValue]) -> Option<[f32; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, val) in out.iter_mut().zip(operands) {
        *slot = get_number_from_value(val)?;
    }
    Some(out)
}

fn length(x: f32, y: f32) -> f32 {
    x.hypot(y)
}

// ---------------------------------------------------------------------------
// Internal: interpreter
// ---------------------------------------------------------------------------

struct Interpreter<'a> {
    backend: &'a dyn PdfBackend,
    runs: Vec<TextRun>,
    /// Forms currently being painted, outermost first.
    forms: Vec<ObjectId>,
}

impl<'a> Interpreter<'a> {
    fn new(backend: &'a dyn PdfBackend) -> Self {
        Self {
            backend,
            runs: Vec::new(),
            forms: Vec::new(),
        }
    }

    /// Interpret the content of `scope` starting from graphics state `gs`.
    fn run(&mut self, scope: Scope, mut gs: GraphicsState) -> Result<(), PdfError> {
        let raw = self.backend.content(scope)?;
        let ops = self.backend.decode_content(&raw)?;
        let fonts: Vec<Rc<BackendFontInfo>> = self
            .backend
            .fonts(scope)
            .unwrap_or_default()
            .into_iter()
            .map(Rc::new)
            .collect();

        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut text = TextObject::default();

        for op in &ops {
            let operands = op.operands.as_slice();
            match op.operator.as_str() {
                // -- Graphics state -----------------------------------------
                "q" => stack.push(gs.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        gs = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = numbers::<6>(operands) {
                        gs.ctm = multiply(&m, &gs.ctm);
                    }
                }

                // -- Text object delimiters ---------------------------------
                "BT" => text = TextObject::default(),
                "ET" => {}

                // -- Text state ---------------------------------------------
                "Tf" => set_font(operands, &fonts, &mut gs),
                "Tc" => {
                    if let Some([v]) = numbers::<1>(operands) {
                        gs.char_spacing = v;
                    }
                }
                "Tw" => {
                    if let Some([v]) = numbers::<1>(operands) {
                        gs.word_spacing = v;
                    }
                }
                "Tz" => {
                    if let Some([v]) = numbers::<1>(operands) {
                        gs.horiz_scale = v / 100.0;
                    }
                }
                "TL" => {
                    if let Some([v]) = numbers::<1>(operands) {
                        gs.leading = v;
                    }
                }
                "Ts" => {
                    if let Some([v]) = numbers::<1>(operands) {
                        gs.rise = v;
                    }
                }

                // -- Text positioning ---------------------------------------
                "Tm" => {
                    if let Some(m) = numbers::<6>(operands) {
                        text.tm = m;
                        text.tlm = m;
                    }
                }
                "Td" => {
                    if let Some([tx, ty]) = numbers::<2>(operands) {
                        text.next_line(tx, ty);
                    }
                }
                "TD" => {
                    if let Some([tx, ty]) = numbers::<2>(operands) {
                        gs.leading = -ty;
                        text.next_line(tx, ty);
                    }
                }
                "T*" => text.next_line(0.0, -gs.leading),

                // -- Text showing -------------------------------------------
                "Tj" => {
                    if let Some(PdfValue::Str(bytes)) = operands.first() {
                        self.show(bytes, &gs, &mut text);
                    }
                }
                "'" => {
                    text.next_line(0.0, -gs.leading);
                    if let Some(PdfValue::Str(bytes)) = operands.first() {
                        self.show(bytes, &gs, &mut text);
                    }
                }
                "\"" => {
                    if let (Some([aw, ac]), Some(PdfValue::Str(bytes))) =
                        (numbers::<2>(operands), operands.get(2))
                    {
                        gs.word_spacing = aw;
                        gs.char_spacing = ac;
                        text.next_line(0.0, -gs.leading);
                        self.show(bytes, &gs, &mut text);
                    }
                }
                "TJ" => {
                    if let Some(PdfValue::Array(elements)) = operands.first() {
                        self.show_array(elements, &gs, &mut text);
                    }
                }

                // -- XObjects -----------------------------------------------
                "Do" => {
                    if let Some(PdfValue::Name(name)) = operands.first() {
                        self.paint_form(scope, name, &gs)?;
                    }
                }

                _ => { /* Ignore non-text operators */ }
            }
        }

        Ok(())
    }

    /// Descend into a Form XObject, if `name` refers to one.
    fn paint_form(
        &mut self,
        scope: Scope,
        name: &[u8],
        gs: &GraphicsState,
    ) -> Result<(), PdfError> {
        let Some(form) = self.backend.form_xobject(scope, name) else {
            return Ok(());
        };

        if self.forms.contains(&form.id) {
            log::warn!(
                "skipping form XObject {:?}: it paints itself recursively",
                form.id
            );
            return Ok(());
        }
        if self.forms.len() >= MAX_FORM_DEPTH {
            log::warn!(
                "skipping form XObject {:?}: nesting deeper than {}",
                form.id,
                MAX_FORM_DEPTH
            );
            return Ok(());
        }

        let mut inner = gs.clone();
        inner.ctm = multiply(&form.matrix, &gs.ctm);

        self.forms.push(form.id);
        let result = self.run(
            Scope::Form {
                id: form.id,
                page: scope.page(),
            },
            inner,
        );
        self.forms.pop();
        result
    }

    fn decode(&self, gs: &GraphicsState, bytes: &[u8]) -> DecodedText {
        decode_show_string(gs.font.as_deref(), bytes)
    }

    /// Horizontal displacement of a decoded string in unscaled text space.
    fn displacement(gs: &GraphicsState, decoded: &DecodedText) -> f32 {
        (decoded.advance * gs.font_size
            + decoded.glyphs as f32 * gs.char_spacing
            + decoded.spaces as f32 * gs.word_spacing)
            * gs.horiz_scale
    }

    /// Text rendering matrix at the current position.
    fn rendering_matrix(gs: &GraphicsState, text: &TextObject) -> Matrix {
        let params = [
            gs.font_size * gs.horiz_scale,
            0.0,
            0.0,
            gs.font_size,
            0.0,
            gs.rise,
        ];
        multiply(&params, &multiply(&text.tm, &gs.ctm))
    }

    fn push_run(
        &mut self,
        text: String,
        transform: Matrix,
        advance: f32,
        gs: &GraphicsState,
        start: &TextObject,
    ) {
        let m = multiply(&start.tm, &gs.ctm);
        self.runs.push(TextRun {
            text,
            transform,
            width: (advance * length(m[0], m[1])).abs(),
            height: (gs.font_size * length(m[2], m[3])).abs(),
            font_name: gs.font_name.clone(),
        });
    }

    /// `Tj`, `'` and `"`: one run per string.
    fn show(&mut self, bytes: &[u8], gs: &GraphicsState, text: &mut TextObject) {
        let decoded = self.decode(gs, bytes);
        let tx = Self::displacement(gs, &decoded);
        let start = *text;
        text.advance(tx);

        if decoded.text.is_empty() {
            return;
        }
        let transform = Self::rendering_matrix(gs, &start);
        self.push_run(decoded.text, transform, tx, gs, &start);
    }

    /// `TJ`: one run for the whole array.  The run starts at the first
    /// string and ends after the last one; kerning in between counts
    /// towards the width.
    fn show_array(&mut self, elements: &[PdfValue], gs: &GraphicsState, text: &mut TextObject) {
        let mut buf = String::new();
        let mut start: Option<TextObject> = None;
        let mut shown = 0.0;
        let mut pending = 0.0;

        for elem in elements {
            match elem {
                PdfValue::Str(bytes) => {
                    let decoded = self.decode(gs, bytes);
                    let tx = Self::displacement(gs, &decoded);
                    if start.is_none() {
                        start = Some(*text);
                    } else {
                        shown += pending;
                    }
                    pending = 0.0;
                    shown += tx;
                    buf.push_str(&decoded.text);
                    text.advance(tx);
                }
                val => {
                    let Some(adj) = get_number_from_value(val) else {
                        continue;
                    };
                    let tx = -adj / 1000.0 * gs.font_size * gs.horiz_scale;
                    let gap = gs.font_size * gs.horiz_scale * WORD_GAP_RATIO;
                    if tx > gap && !buf.is_empty() && !buf.ends_with(' ') {
                        buf.push(' ');
                    }
                    if start.is_some() {
                        pending += tx;
                    }
                    text.advance(tx);
                }
            }
        }

        let Some(start) = start else {
            return;
        };
        let trimmed = buf.trim_end();
        if trimmed.is_empty() {
            return;
        }
        let transform = Self::rendering_matrix(gs, &start);
        self.push_run(trimmed.to_string(), transform, shown, gs, &start);
    }
}

/// Handle the `Tf` (set font) operator.
fn set_font(operands: &[PdfValue], fonts: &[Rc<BackendFontInfo>], gs: &mut GraphicsState) {
    let key = match operands.first() {
        Some(PdfValue::Name(n)) | Some(PdfValue::Str(n)) => n,
        _ => return,
    };
    gs.font_size = operands
        .get(1)
        .and_then(get_number_from_value)
        .unwrap_or(0.0);

    gs.font = fonts.iter().find(|f| &f.name == key).cloned();
    gs.font_name = match gs.font.as_ref().and_then(|f| f.base_font.clone()) {
        Some(base) => base,
        None => {
            if gs.font.is_none() {
                log::debug!(
                    "font /{} not found in resources",
                    String::from_utf8_lossy(key)
                );
            }
            String::from_utf8_lossy(key).into_owned()
        }
    };
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Walk a page's content stream (and the forms it paints) and produce its
/// text runs in content order.
///
/// Handled operators:
///
/// | Operator          | Action |
/// |-------------------|--------|
/// | `q` `Q` `cm`      | Save / restore / concatenate the CTM and text state |
/// | `BT` `ET`         | Begin / end text object |
/// | `Tf`              | Set font and size |
/// | `Tm` `Td` `TD` `T*` | Position text |
/// | `TL` `Tc` `Tw` `Tz` `Ts` | Leading, spacing, scaling, rise |
/// | `Tj` `'` `"`      | Show a string |
/// | `TJ`              | Show strings with kerning adjustments |
/// | `Do`              | Paint a Form XObject |
pub fn page_text_runs(backend: &dyn PdfBackend, page: PageId) -> Result<Vec<TextRun>, PdfError> {
    let mut interpreter = Interpreter::new(backend);
    interpreter.run(Scope::Page(page), GraphicsState::default())?;
    Ok(interpreter.runs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
