//! Glyph metrics and show-string decoding.
//!
//! Everything here is pure data: the backend resolves font dictionaries into
//! [`FontMetrics`] and an optional [`ToUnicode`] map, and the text state
//! machine calls [`decode_show_string`] for each string operand.

use super::backend::{decode_text_simple, BackendFontInfo};

/// Approximate glyph width (in thousandths of an em) used when a font has
/// no width table.  500 is a reasonable default for proportional fonts.
pub const APPROX_GLYPH_WIDTH: f32 = 500.0;

/// Glyph widths declared by a font dictionary, in glyph-space units.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FontWidths {
    /// Simple fonts: `/FirstChar` + `/Widths`, with `/MissingWidth` for
    /// codes outside the table.
    Simple {
        first_char: u32,
        widths: Vec<f32>,
        missing: f32,
    },
    /// CID fonts: `/DW` plus the ranges of the `/W` array.
    Composite {
        default: f32,
        ranges: Vec<(u32, u32, f32)>,
    },
    /// No width information at all.
    #[default]
    Unknown,
}

impl FontWidths {
    /// Width of a single character code in glyph-space units.
    pub fn width(&self, code: u32) -> f32 {
        match self {
            FontWidths::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .unwrap_or(*missing),
            FontWidths::Composite { default, ranges } => ranges
                .iter()
                .find(|(lo, hi, _)| (*lo..=*hi).contains(&code))
                .map(|(_, _, w)| *w)
                .unwrap_or(*default),
            FontWidths::Unknown => APPROX_GLYPH_WIDTH,
        }
    }
}

/// Per-font information needed to measure and decode strings.
#[derive(Debug, Clone, PartialEq)]
pub struct FontMetrics {
    pub widths: FontWidths,
    /// Glyph-space to text-space factor (`FontMatrix[0]`, 0.001 for all
    /// non-Type3 fonts).
    pub units_per_glyph: f32,
    /// Bytes per character code: 2 for Type0 fonts, 1 otherwise.
    pub code_len: usize,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            widths: FontWidths::Unknown,
            units_per_glyph: 0.001,
            code_len: 1,
        }
    }
}

/// Result of decoding one string operand of a text-showing operator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedText {
    pub text: String,
    /// Sum of glyph widths in text-space units for a font size of 1.
    pub advance: f32,
    /// Number of character codes shown.
    pub glyphs: usize,
    /// Number of single-byte code 32 occurrences (subject to word spacing).
    pub spaces: usize,
}

/// Split raw string bytes into character codes of `code_len` bytes.
fn char_codes(bytes: &[u8], code_len: usize) -> Vec<u32> {
    if code_len <= 1 {
        return bytes.iter().map(|&b| b as u32).collect();
    }
    bytes
        .chunks(code_len)
        .filter(|c| c.len() == code_len)
        .map(|c| c.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
        .collect()
}

/// Decode a show-string operand with the given font (if it was resolved).
pub fn decode_show_string(font: Option<&BackendFontInfo>, bytes: &[u8]) -> DecodedText {
    let default_metrics = FontMetrics::default();
    let metrics = font.map(|f| &f.metrics).unwrap_or(&default_metrics);

    let code_len = font
        .and_then(|f| f.to_unicode.as_ref())
        .and_then(|cmap| cmap.code_len())
        .filter(|_| metrics.code_len > 1)
        .unwrap_or(metrics.code_len);
    let codes = char_codes(bytes, code_len);

    let advance = codes
        .iter()
        .map(|&code| metrics.widths.width(code) * metrics.units_per_glyph)
        .sum();
    let spaces = if code_len == 1 {
        codes.iter().filter(|&&c| c == 32).count()
    } else {
        0
    };

    DecodedText {
        text: decode_codes(font, bytes, &codes, code_len),
        advance,
        glyphs: codes.len(),
        spaces,
    }
}

fn decode_codes(
    font: Option<&BackendFontInfo>,
    bytes: &[u8],
    codes: &[u32],
    code_len: usize,
) -> String {
    let cmap = font
        .and_then(|f| f.to_unicode.as_ref())
        .filter(|c| !c.is_empty());
    if let Some(cmap) = cmap {
        return codes
            .iter()
            .filter_map(|&code| match cmap.get(code) {
                Some(s) => Some(s),
                None if code_len == 1 => Some((code as u8 as char).to_string()),
                None => char::from_u32(code).map(|c| c.to_string()),
            })
            .collect();
    }

    // Identity-H / Identity-V fonts typically use 2-byte CID codes that map
    // to Unicode.  Try UTF-16BE decoding.
    let identity = font
        .and_then(|f| f.encoding.as_deref())
        .is_some_and(|enc| enc.contains("Identity"));
    if identity && bytes.len() >= 2 && bytes.len().is_multiple_of(2) {
        let code_units: Vec<u16> = bytes
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        let decoded = String::from_utf16_lossy(&code_units);
        if !decoded.is_empty() && !decoded.chars().all(|c| c == '\u{FFFD}' || c == '\0') {
            return decoded;
        }
    }

    decode_text_simple(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::cmap::ToUnicode;

    fn font(metrics: FontMetrics) -> BackendFontInfo {
        BackendFontInfo {
            name: b"F1".to_vec(),
            base_font: Some("Helvetica".to_string()),
            subtype: Some("Type1".to_string()),
            encoding: None,
            metrics,
            to_unicode: None,
        }
    }

    #[test]
    fn test_simple_widths_lookup() {
        let w = FontWidths::Simple {
            first_char: 65,
            widths: vec![600.0, 700.0],
            missing: 250.0,
        };
        assert_eq!(w.width(65), 600.0);
        assert_eq!(w.width(66), 700.0);
        assert_eq!(w.width(67), 250.0);
        assert_eq!(w.width(10), 250.0);
    }

    #[test]
    fn test_composite_widths_lookup() {
        let w = FontWidths::Composite {
            default: 1000.0,
            ranges: vec![(1, 3, 500.0), (10, 10, 250.0)],
        };
        assert_eq!(w.width(2), 500.0);
        assert_eq!(w.width(10), 250.0);
        assert_eq!(w.width(11), 1000.0);
    }

    #[test]
    fn test_unknown_widths_approximate() {
        assert_eq!(FontWidths::Unknown.width(42), APPROX_GLYPH_WIDTH);
    }

    #[test]
    fn test_decode_without_font_uses_approximation() {
        let d = decode_show_string(None, b"abcd");
        assert_eq!(d.text, "abcd");
        assert_eq!(d.glyphs, 4);
        assert!((d.advance - 2.0).abs() < 1e-6);
        assert_eq!(d.spaces, 0);
    }

    #[test]
    fn test_decode_counts_spaces() {
        let d = decode_show_string(None, b"a b c");
        assert_eq!(d.spaces, 2);
    }

    #[test]
    fn test_decode_uses_width_table() {
        let f = font(FontMetrics {
            widths: FontWidths::Simple {
                first_char: 32,
                widths: vec![250.0; 96],
                missing: 0.0,
            },
            ..FontMetrics::default()
        });
        let d = decode_show_string(Some(&f), b"Hi");
        assert!((d.advance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_decode_identity_utf16() {
        let mut f = font(FontMetrics {
            code_len: 2,
            ..FontMetrics::default()
        });
        f.encoding = Some("Identity-H".to_string());
        let d = decode_show_string(Some(&f), &[0x00, 0x48, 0x00, 0x69]);
        assert_eq!(d.text, "Hi");
        assert_eq!(d.glyphs, 2);
        assert_eq!(d.spaces, 0);
    }

    #[test]
    fn test_decode_with_to_unicode() {
        let mut f = font(FontMetrics {
            code_len: 2,
            ..FontMetrics::default()
        });
        f.to_unicode = Some(ToUnicode::parse(
            b"1 begincodespacerange <0000> <FFFF> endcodespacerange \
              2 beginbfchar <0001> <0054> <0002> <006F> endbfchar",
        ));
        let d = decode_show_string(Some(&f), &[0x00, 0x01, 0x00, 0x02]);
        assert_eq!(d.text, "To");
    }

    #[test]
    fn test_decode_type3_units() {
        let f = font(FontMetrics {
            widths: FontWidths::Simple {
                first_char: 0,
                widths: vec![1.0; 256],
                missing: 0.0,
            },
            units_per_glyph: 0.5,
            code_len: 1,
        });
        let d = decode_show_string(Some(&f), b"ab");
        assert!((d.advance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_char_codes_two_byte_drops_odd_tail() {
        assert_eq!(char_codes(&[0x00, 0x41, 0x00], 2), vec![0x41]);
    }
}
