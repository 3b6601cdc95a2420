//! Minimal `/ToUnicode` CMap support.
//!
//! Only the parts of the CMap syntax that map character codes to Unicode are
//! understood: `begincodespacerange`, `beginbfchar` and `beginbfrange` (both
//! the incrementing and the array forms).  Everything else is skipped.

use std::collections::HashMap;

/// Widest span a single `bfrange` may cover.
const MAX_MAP_RANGE: u32 = (1 << 24) - 1;

/// Character-code to Unicode mapping parsed from a ToUnicode stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicode {
    map: HashMap<u32, String>,
    ranges: Vec<BfRange>,
    code_len: Option<usize>,
}

/// An incrementing `bfrange`, resolved on lookup: code `lo + n` maps to
/// `start` with its last UTF-16 unit advanced by `n`.
#[derive(Debug, Clone, PartialEq)]
struct BfRange {
    lo: u32,
    hi: u32,
    start: Vec<u16>,
}

impl ToUnicode {
    /// Parse the (already decompressed) bytes of a CMap stream.
    ///
    /// Malformed entries are skipped; the result may be empty.
    pub fn parse(data: &[u8]) -> Self {
        let tokens = tokenize(data);
        let mut cmap = ToUnicode::default();
        let mut i = 0;

        while i < tokens.len() {
            match &tokens[i] {
                Token::Word(w) if w == "begincodespacerange" => {
                    i += 1;
                    while i + 1 < tokens.len() && !tokens[i].is_word("endcodespacerange") {
                        if let (Token::Hex(lo), Token::Hex(_)) = (&tokens[i], &tokens[i + 1]) {
                            cmap.code_len.get_or_insert(lo.len());
                        }
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfchar" => {
                    i += 1;
                    while i + 1 < tokens.len() && !tokens[i].is_word("endbfchar") {
                        if let (Token::Hex(src), Token::Hex(dst)) = (&tokens[i], &tokens[i + 1]) {
                            cmap.map.insert(bytes_to_u32(src), utf16be_to_string(dst));
                        }
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfrange" => {
                    i += 1;
                    i = cmap.parse_bfrange(&tokens, i);
                }
                _ => {}
            }
            i += 1;
        }

        cmap
    }

    /// Parse `bfrange` triples starting at `i`; returns the index of the
    /// `endbfrange` keyword (or the end of the token list).
    fn parse_bfrange(&mut self, tokens: &[Token], mut i: usize) -> usize {
        while i + 2 < tokens.len() && !tokens[i].is_word("endbfrange") {
            let (lo, hi, valid) = match (&tokens[i], &tokens[i + 1]) {
                (Token::Hex(lo), Token::Hex(hi)) => {
                    let (lo_code, hi_code) = (bytes_to_u32(lo), bytes_to_u32(hi));
                    (lo_code, hi_code, range_is_valid(lo.len(), lo_code, hi_code))
                }
                _ => {
                    i += 1;
                    continue;
                }
            };
            i += 2;

            if !valid {
                log::debug!("skipping bfrange <{lo:X}> <{hi:X}>");
            }

            match &tokens[i] {
                Token::Hex(dst) => {
                    if valid {
                        self.ranges.push(BfRange {
                            lo,
                            hi,
                            start: to_code_units(dst),
                        });
                    }
                    i += 1;
                }
                Token::Open => {
                    i += 1;
                    let mut next = Some(lo);
                    while i < tokens.len() && tokens[i] != Token::Close {
                        if let (Token::Hex(dst), Some(code)) = (&tokens[i], next) {
                            if valid && code <= hi {
                                self.map.insert(code, utf16be_to_string(dst));
                            }
                            next = code.checked_add(1);
                        }
                        i += 1;
                    }
                    i += 1;
                }
                _ => i += 1,
            }
        }
        i
    }

    pub fn get(&self, code: u32) -> Option<String> {
        if let Some(s) = self.map.get(&code) {
            return Some(s.clone());
        }

        let range = self
            .ranges
            .iter()
            .rev()
            .find(|r| (r.lo..=r.hi).contains(&code))?;
        let mut units = range.start.clone();
        if let Some(last) = units.last_mut() {
            *last = last.wrapping_add((code - range.lo) as u16);
        }
        Some(String::from_utf16_lossy(&units))
    }

    /// Byte length of codes declared by the first codespace range, if any.
    pub fn code_len(&self) -> Option<usize> {
        self.code_len
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty() && self.ranges.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Open,
    Close,
    Word(String),
}

impl Token {
    fn is_word(&self, s: &str) -> bool {
        matches!(self, Token::Word(w) if w == s)
    }
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'<' | b'>' | b'[' | b']' | b'(' | b')' | b'/' | b'%' | b'{' | b'}')
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let b = data[i];
        match b {
            _ if b.is_ascii_whitespace() => i += 1,
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b'<' if data.get(i + 1) == Some(&b'<') => {
                tokens.push(Token::Word("<<".into()));
                i += 2;
            }
            b'>' if data.get(i + 1) == Some(&b'>') => {
                tokens.push(Token::Word(">>".into()));
                i += 2;
            }
            b'<' => {
                i += 1;
                let mut digits = Vec::new();
                while i < data.len() && data[i] != b'>' {
                    if data[i].is_ascii_hexdigit() {
                        digits.push(data[i]);
                    }
                    i += 1;
                }
                i += 1;
                tokens.push(Token::Hex(hex_to_bytes(&digits)));
            }
            b'[' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b']' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b'(' => {
                // Literal strings only appear in CMap headers; skip them.
                let mut depth = 0usize;
                while i < data.len() {
                    match data[i] {
                        b'\\' => i += 1,
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                i += 1;
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => {
                let start = i;
                i += 1;
                while i < data.len() && !data[i].is_ascii_whitespace() && !is_delimiter(data[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
        }
    }

    tokens
}

fn hex_value(d: u8) -> u8 {
    match d {
        b'0'..=b'9' => d - b'0',
        b'a'..=b'f' => d - b'a' + 10,
        b'A'..=b'F' => d - b'A' + 10,
        _ => 0,
    }
}

/// Decode hex digits into bytes; an odd trailing digit is padded with 0.
fn hex_to_bytes(digits: &[u8]) -> Vec<u8> {
    digits
        .chunks(2)
        .map(|pair| {
            let hi = hex_value(pair[0]);
            let lo = pair.get(1).map(|&d| hex_value(d)).unwrap_or(0);
            (hi << 4) | lo
        })
        .collect()
}

/// A range must be ordered, no wider than [`MAX_MAP_RANGE`], and stay within
/// the code length of its lower bound.
fn range_is_valid(code_len: usize, lo: u32, hi: u32) -> bool {
    let code_max = match code_len {
        0 => return false,
        1..=3 => (1u32 << (8 * code_len)) - 1,
        _ => u32::MAX,
    };
    lo <= hi && hi <= code_max && hi - lo <= MAX_MAP_RANGE
}

fn bytes_to_u32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn to_code_units(bytes: &[u8]) -> Vec<u16> {
    if bytes.len() == 1 {
        return vec![bytes[0] as u16];
    }
    bytes
        .chunks(2)
        .filter(|c| c.len() == 2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect()
}

fn utf16be_to_string(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&to_code_units(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CMapName /Adobe-Identity-UCS def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0003> <0020>
<0024> <0041>
endbfchar
2 beginbfrange
<0044> <0046> <0061>
<0050> <0051> [<0058> <0059>]
endbfrange
endcmap
"#;

    #[test]
    fn test_parse_codespace_len() {
        let cmap = ToUnicode::parse(SAMPLE.as_bytes());
        assert_eq!(cmap.code_len(), Some(2));
    }

    #[test]
    fn test_parse_bfchar() {
        let cmap = ToUnicode::parse(SAMPLE.as_bytes());
        assert_eq!(cmap.get(0x0003).as_deref(), Some(" "));
        assert_eq!(cmap.get(0x0024).as_deref(), Some("A"));
    }

    #[test]
    fn test_parse_bfrange_incrementing() {
        let cmap = ToUnicode::parse(SAMPLE.as_bytes());
        assert_eq!(cmap.get(0x0044).as_deref(), Some("a"));
        assert_eq!(cmap.get(0x0045).as_deref(), Some("b"));
        assert_eq!(cmap.get(0x0046).as_deref(), Some("c"));
        assert_eq!(cmap.get(0x0047), None);
    }

    #[test]
    fn test_parse_bfrange_array() {
        let cmap = ToUnicode::parse(SAMPLE.as_bytes());
        assert_eq!(cmap.get(0x0050).as_deref(), Some("X"));
        assert_eq!(cmap.get(0x0051).as_deref(), Some("Y"));
    }

    #[test]
    fn test_parse_ligature_destination() {
        let data = b"1 beginbfchar <01> <00660069> endbfchar";
        let cmap = ToUnicode::parse(data);
        assert_eq!(cmap.get(1).as_deref(), Some("fi"));
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        let cmap = ToUnicode::parse(b"not a cmap at all");
        assert!(cmap.is_empty());
        assert_eq!(cmap.code_len(), None);
    }

    #[test]
    fn test_hex_odd_digit_padded() {
        assert_eq!(hex_to_bytes(b"ABC"), vec![0xAB, 0xC0]);
    }

    #[test]
    fn test_bfrange_over_span_limit_skipped() {
        let start = std::time::Instant::now();
        let cmap = ToUnicode::parse(
            b"beginbfrange <00000000> <FFFFFFFF> <0041> <00000000> <01FFFFFF> <0041> endbfrange",
        );
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
        assert!(cmap.is_empty());
        assert_eq!(cmap.get(0), None);
    }

    #[test]
    fn test_bfrange_at_span_limit_is_lazy() {
        let start = std::time::Instant::now();
        let cmap = ToUnicode::parse(b"beginbfrange <00000000> <00FFFFFF> <0041> endbfrange");
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(cmap.get(0).as_deref(), Some("A"));
        assert_eq!(cmap.get(1).as_deref(), Some("B"));
        assert_eq!(cmap.get(0x0100_0000), None);
    }

    #[test]
    fn test_bfrange_beyond_code_length_skipped() {
        let cmap = ToUnicode::parse(b"beginbfrange <00> <0100> <0041> <20> <21> <0061> endbfrange");
        assert_eq!(cmap.get(0x00), None);
        assert_eq!(cmap.get(0x20).as_deref(), Some("a"));
        assert_eq!(cmap.get(0x21).as_deref(), Some("b"));
    }

    #[test]
    fn test_bfrange_reversed_skipped() {
        let cmap = ToUnicode::parse(b"beginbfrange <0050> <0040> <0041> endbfrange");
        assert!(cmap.is_empty());
    }

    #[test]
    fn test_bfrange_array_at_code_max() {
        let cmap =
            ToUnicode::parse(b"beginbfrange <FFFFFFFF> <FFFFFFFF> [<0041> <0042>] endbfrange");
        assert_eq!(cmap.get(u32::MAX).as_deref(), Some("A"));
        assert_eq!(cmap.get(0), None);
    }

    #[test]
    fn test_bfrange_array_over_span_limit_skipped() {
        let cmap = ToUnicode::parse(b"beginbfrange <00000000> <FFFFFFFF> [<0041>] endbfrange");
        assert!(cmap.is_empty());
    }
}
