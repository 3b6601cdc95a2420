use std::io::Read;
use std::path::PathBuf;

use base64::Engine;
use pdfmatch_core::{run_items, Extraction, ItemParams};

use crate::prelude::{eprintln, println, *};

#[derive(Debug, clap::Args)]
#[command(group(
    clap::ArgGroup::new("input").args(["pdf", "base64", "base64_file", "items"])
))]
pub struct App {
    /// Path to the PDF file
    #[arg(long)]
    pub pdf: Option<PathBuf>,

    /// Base64-encoded PDF
    #[arg(long)]
    pub base64: Option<String>,

    /// File holding a base64-encoded PDF
    #[arg(long)]
    pub base64_file: Option<PathBuf>,

    /// JSON array of strings to match exactly, e.g. '["Invoice","Total"]'
    #[arg(short, long, env = "PDFMATCH_SEARCH")]
    pub search: Option<String>,

    /// JSON file holding an array of {"base64Pdf", "searchTextArray"} items
    #[arg(long)]
    pub items: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let batch = app.items.is_some();
    let items = collect_items(&app, std::io::stdin())?;

    if global.verbose {
        eprintln!("Matching {} item(s)...", items.len());
    }

    let extractions = tokio::task::spawn_blocking(move || run_items(&items))
        .await
        .map_err(|e| eyre!("Task join error: {e}"))??;

    log::info!(
        "found {} match(es) across {} item(s)",
        extractions
            .iter()
            .map(|e| e.matched_texts.len())
            .sum::<usize>(),
        extractions.len()
    );

    match app.format {
        OutputFormat::Json => println!("{}", format_json(&extractions, batch)?),
        OutputFormat::Table => println!("{}", format_table(&extractions)),
    }

    Ok(())
}

/// Build the invocation items from the command line.  `stdin` is read only
/// when no other PDF source was given.
pub fn collect_items(app: &App, stdin: impl Read) -> Result<Vec<ItemParams>> {
    if let Some(path) = &app.items {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read items file {}", path.display()))?;
        return serde_json::from_str(&raw).map_err(|e| {
            Error::InvalidInput(format!("items file must be a JSON array of items: {e}")).into()
        });
    }

    let search_text_array = app.search.clone().ok_or_else(|| {
        Error::MissingInput("--search (or PDFMATCH_SEARCH) is required without --items".into())
    })?;

    let base64_pdf = if let Some(path) = &app.pdf {
        let bytes =
            std::fs::read(path).wrap_err_with(|| format!("Failed to read {}", path.display()))?;
        base64::engine::general_purpose::STANDARD.encode(bytes)
    } else if let Some(encoded) = &app.base64 {
        encoded.clone()
    } else if let Some(path) = &app.base64_file {
        std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read {}", path.display()))?
    } else {
        let mut encoded = String::new();
        let mut stdin = stdin;
        stdin
            .read_to_string(&mut encoded)
            .wrap_err("Failed to read base64 PDF from stdin")?;
        if encoded.trim().is_empty() {
            return Err(Error::MissingInput(
                "no PDF given: use --pdf, --base64, --base64-file or pipe base64 to stdin".into(),
            )
            .into());
        }
        encoded
    };

    Ok(vec![ItemParams {
        base64_pdf,
        search_text_array,
    }])
}

/// A single item prints as its extraction; a batch prints as an array.
pub fn format_json(extractions: &[Extraction], batch: bool) -> Result<String> {
    let json = match (batch, extractions) {
        (false, [single]) => serde_json::to_string_pretty(single)?,
        _ => serde_json::to_string_pretty(extractions)?,
    };
    Ok(json)
}

pub fn format_table(extractions: &[Extraction]) -> String {
    let mut table = new_table();
    table.add_row(prettytable::row![
        "Item", "Text", "X", "Y", "Width", "Height", "Page W", "Page H"
    ]);

    for (i, extraction) in extractions.iter().enumerate() {
        for record in &extraction.matched_texts {
            table.add_row(prettytable::row![
                i + 1,
                &record.text,
                format!("{:.2}", record.x),
                format!("{:.2}", record.y),
                format!("{:.2}", record.width),
                format!("{:.2}", record.height),
                format!("{:.2}", record.page_width),
                format!("{:.2}", record.page_height)
            ]);
        }
    }

    table.to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use pdfmatch_core::run_item;

    fn app() -> App {
        App {
            pdf: None,
            base64: None,
            base64_file: None,
            search: Some(r#"["Invoice"]"#.to_string()),
            items: None,
            format: OutputFormat::Json,
        }
    }

    fn invoice_pdf() -> Vec<u8> {
        pdf::fixtures::single_page(&[("Invoice", 72.0, 700.0)])
    }

    fn encode(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_collect_from_pdf_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&invoice_pdf()).unwrap();

        let app = App {
            pdf: Some(file.path().to_path_buf()),
            ..app()
        };
        let items = collect_items(&app, std::io::empty()).unwrap();
        assert_eq!(items.len(), 1);

        let extraction = run_item(&items[0]).unwrap();
        assert_eq!(extraction.matched_texts[0].x, 72.0);
    }

    #[test]
    fn test_collect_from_base64_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", encode(&invoice_pdf())).unwrap();

        let app = App {
            base64_file: Some(file.path().to_path_buf()),
            ..app()
        };
        let items = collect_items(&app, std::io::empty()).unwrap();
        assert_eq!(run_item(&items[0]).unwrap().matched_texts.len(), 1);
    }

    #[test]
    fn test_collect_from_stdin() {
        let encoded = encode(&invoice_pdf());
        let items = collect_items(&app(), encoded.as_bytes()).unwrap();
        assert_eq!(items[0].base64_pdf, encoded);
        assert_eq!(items[0].search_text_array, r#"["Invoice"]"#);
    }

    #[test]
    fn test_collect_empty_stdin() {
        let err = collect_items(&app(), std::io::empty()).unwrap_err();
        assert!(err.to_string().starts_with("Missing input"));
    }

    #[test]
    fn test_collect_requires_search() {
        let app = App {
            search: None,
            base64: Some("QUJD".to_string()),
            ..app()
        };
        let err = collect_items(&app, std::io::empty()).unwrap_err();
        assert!(err.to_string().contains("--search"));
    }

    #[test]
    fn test_collect_items_file() {
        let items = vec![
            ItemParams {
                base64_pdf: encode(&invoice_pdf()),
                search_text_array: r#"["Invoice"]"#.to_string(),
            },
            ItemParams {
                base64_pdf: encode(&invoice_pdf()),
                search_text_array: "[]".to_string(),
            },
        ];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&items).unwrap().as_bytes())
            .unwrap();

        let app = App {
            items: Some(file.path().to_path_buf()),
            search: None,
            ..app()
        };
        let collected = collect_items(&app, std::io::empty()).unwrap();
        assert_eq!(collected, items);

        let extractions = run_items(&collected).unwrap();
        assert_eq!(extractions[0].matched_texts.len(), 1);
        assert!(extractions[1].matched_texts.is_empty());
    }

    #[test]
    fn test_collect_items_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"base64Pdf": "x"}"#).unwrap();

        let app = App {
            items: Some(file.path().to_path_buf()),
            ..app()
        };
        let err = collect_items(&app, std::io::empty()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid input"));
    }

    #[test]
    fn test_format_json_single_and_batch() {
        let extraction = Extraction::default();
        let single = format_json(std::slice::from_ref(&extraction), false).unwrap();
        assert!(single.trim_start().starts_with('{'));
        assert!(single.contains("\"matchedTexts\""));

        let batch = format_json(&[extraction], true).unwrap();
        assert!(batch.trim_start().starts_with('['));
    }

    #[test]
    fn test_format_table_rows() {
        let extraction = run_item(&ItemParams {
            base64_pdf: encode(&invoice_pdf()),
            search_text_array: r#"["Invoice"]"#.to_string(),
        })
        .unwrap();
        let table = format_table(&[extraction]);
        assert!(table.contains("Invoice"));
        assert!(table.contains("72.00"));
        assert!(table.contains("612.00"));
    }
}
