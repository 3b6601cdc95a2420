use serde::{Deserialize, Serialize};

/// A 2D affine transform `[a, b, c, d, e, f]` in PDF row-vector convention.
pub type Matrix = [f32; 6];

/// The identity 2x3 matrix: [a, b, c, d, tx, ty].
pub const IDENTITY_MATRIX: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Concatenate two matrices: the result applies `m1` first, then `m2`.
pub fn multiply(m1: &Matrix, m2: &Matrix) -> Matrix {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

/// A contiguous piece of text shown by a single text-showing operator.
///
/// `transform` is the text rendering matrix at the start of the run,
/// expressed in page user space: `transform[4]` and `transform[5]` are the
/// anchor of the run's baseline origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub transform: Matrix,
    pub width: f32,
    pub height: f32,
    pub font_name: String,
}

impl TextRun {
    pub fn x(&self) -> f32 {
        self.transform[4]
    }

    pub fn y(&self) -> f32 {
        self.transform[5]
    }
}

/// Page extents at a given scale, after applying the page rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

/// A rectangle to black out, in page user space.
///
/// Deserializes from a match record: unknown keys such as `text` or
/// `pageWidth` are ignored and a missing `page` means page 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redaction {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default = "first_page")]
    pub page: u32,
}

fn first_page() -> u32 {
    1
}

/// An image stamped on every page.
#[derive(Debug, Clone)]
pub struct Watermark {
    /// Encoded image bytes (PNG or JPEG).
    pub image: Vec<u8>,
    /// Fraction of the page the image may cover, aspect ratio preserved.
    pub scale: f32,
    /// Fill and stroke alpha.
    pub opacity: f32,
    /// Paint over the page content instead of underneath it.
    pub on_top: bool,
}

impl Watermark {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            scale: 0.6,
            opacity: 0.1,
            on_top: false,
        }
    }
}
