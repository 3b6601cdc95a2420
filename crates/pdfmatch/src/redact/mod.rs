use std::path::PathBuf;

use base64::Engine;
use pdf::{Editor, PdfError, Redaction, Watermark};
use serde::Deserialize;

use crate::prelude::{eprintln, println, *};

#[derive(Debug, clap::Args)]
pub struct App {
    /// Path to the PDF file
    pub input: PathBuf,

    /// JSON file with the rectangles to black out: either an array of match
    /// records or an extraction object with a `matchedTexts` field
    #[arg(short, long)]
    pub matches: PathBuf,

    /// Image (PNG or JPEG) stamped behind the content of every page
    #[arg(short, long, env = "PDFMATCH_WATERMARK")]
    pub watermark: Option<PathBuf>,

    /// Paint the watermark over the page content
    #[arg(long, requires = "watermark")]
    pub on_top: bool,

    /// Output file path (if omitted, prints base64 to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// The two shapes a list of rectangles may arrive in.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RedactionList {
    Records(Vec<Redaction>),
    #[serde(rename_all = "camelCase")]
    Extraction {
        matched_texts: Vec<Redaction>,
    },
}

/// Body of a redaction request made over the wire: a base64 PDF and the
/// records to black out.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactRequest {
    pub pdf_string: String,
    pub matched_texts: Vec<Redaction>,
}

/// Parse redaction rectangles from a JSON array of match records or from an
/// extraction result.
pub fn parse_redactions(json: &str) -> Result<Vec<Redaction>> {
    let list: RedactionList = serde_json::from_str(json).map_err(|_| {
        Error::InvalidInput(
            "expected an array of match records or an object with `matchedTexts`".into(),
        )
    })?;

    Ok(match list {
        RedactionList::Records(records) => records,
        RedactionList::Extraction { matched_texts } => matched_texts,
    })
}

/// Black out `redactions` and stamp the optional watermark.
pub fn redact_pdf(
    pdf: &[u8],
    redactions: &[Redaction],
    watermark: Option<&Watermark>,
) -> Result<Vec<u8>, PdfError> {
    let mut editor = Editor::from_bytes(pdf)?;
    editor.redact(redactions)?;
    if let Some(watermark) = watermark {
        editor.watermark(watermark)?;
    }
    editor.to_bytes()
}

/// Read a watermark image from disk.
pub fn load_watermark(path: &std::path::Path, on_top: bool) -> Result<Watermark> {
    let image = std::fs::read(path)
        .wrap_err_with(|| format!("Failed to read watermark {}", path.display()))?;
    Ok(Watermark {
        on_top,
        ..Watermark::new(image)
    })
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let pdf = std::fs::read(&app.input)
        .wrap_err_with(|| format!("Failed to read {}", app.input.display()))?;
    let matches = std::fs::read_to_string(&app.matches)
        .wrap_err_with(|| format!("Failed to read {}", app.matches.display()))?;
    let redactions = parse_redactions(&matches)?;
    let watermark = app
        .watermark
        .as_deref()
        .map(|path| load_watermark(path, app.on_top))
        .transpose()?;

    if global.verbose {
        eprintln!(
            "Redacting {} rectangle(s){}...",
            redactions.len(),
            if watermark.is_some() {
                " with watermark"
            } else {
                ""
            }
        );
    }

    let output = tokio::task::spawn_blocking(move || {
        redact_pdf(&pdf, &redactions, watermark.as_ref())
    })
    .await
    .map_err(|e| eyre!("Task join error: {e}"))?
    .map_err(|e| eyre!(e))?;

    if let Some(out) = app.output {
        std::fs::write(&out, &output)
            .wrap_err_with(|| format!("Failed to write {}", out.display()))?;
        log::info!("wrote {} bytes to {}", output.len(), out.display());
    } else {
        println!(
            "{}",
            base64::engine::general_purpose::STANDARD.encode(&output)
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfmatch_core::{extract, SearchTerms};

    fn invoice_pdf() -> Vec<u8> {
        pdf::fixtures::single_page(&[("Invoice", 72.0, 700.0), ("Total", 72.0, 650.0)])
    }

    /// Annotation names are written as `/NM (redact<i>)`.
    fn annotation_count(pdf: &[u8]) -> usize {
        String::from_utf8_lossy(pdf).matches("(redact").count()
    }

    #[test]
    fn test_parse_redactions_array() {
        let redactions = parse_redactions(
            r#"[{"text":"Invoice","x":72,"y":700,"width":42,"height":10,"pageWidth":612,"pageHeight":792}]"#,
        )
        .unwrap();
        assert_eq!(
            redactions,
            vec![Redaction {
                x: 72.0,
                y: 700.0,
                width: 42.0,
                height: 10.0,
                page: 1,
            }]
        );
    }

    #[test]
    fn test_parse_redactions_extraction() {
        let redactions = parse_redactions(
            r#"{"matchedTexts":[{"x":1,"y":2,"width":3,"height":4,"page":2}]}"#,
        )
        .unwrap();
        assert_eq!(redactions.len(), 1);
        assert_eq!(redactions[0].page, 2);
    }

    #[test]
    fn test_parse_redactions_invalid() {
        let err = parse_redactions(r#"{"x": 1}"#).unwrap_err();
        assert!(err.to_string().starts_with("Invalid input"));
    }

    #[test]
    fn test_redact_extracted_matches() {
        let pdf = invoice_pdf();
        let terms: SearchTerms = ["Invoice", "Total"].into_iter().collect();
        let records = extract(&pdf, &terms).unwrap();
        let json = serde_json::to_string(&records).unwrap();

        let redactions = parse_redactions(&json).unwrap();
        let output = redact_pdf(&pdf, &redactions, None).unwrap();

        assert!(output.starts_with(b"%PDF"));
        assert_eq!(annotation_count(&output), 2);
        // The text layer is untouched.
        assert_eq!(extract(&output, &terms).unwrap(), records);
    }

    #[test]
    fn test_redact_with_watermark() {
        let pdf = invoice_pdf();
        let watermark = Watermark::new(pdf::fixtures::png(4, 2));
        let output = redact_pdf(&pdf, &[], Some(&watermark)).unwrap();
        assert!(output.starts_with(b"%PDF"));
        assert_eq!(annotation_count(&output), 0);
    }

    #[test]
    fn test_redact_page_out_of_range() {
        let redaction = Redaction {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
            page: 3,
        };
        let err = redact_pdf(&invoice_pdf(), &[redaction], None).unwrap_err();
        assert!(matches!(err, PdfError::PageOutOfRange { page: 3, .. }));
    }

    #[test]
    fn test_redact_not_a_pdf() {
        assert!(redact_pdf(b"hello", &[], None).is_err());
    }

    #[test]
    fn test_load_watermark() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), pdf::fixtures::png(2, 2)).unwrap();
        let watermark = load_watermark(file.path(), true).unwrap();
        assert!(watermark.on_top);
        assert_eq!(watermark.opacity, 0.1);
    }
}
