use super::{CallToolResult, Content, JsonRpcError, INTERNAL_ERROR, INVALID_PARAMS};
use base64::Engine;
use pdfmatch_core::{run_item, ErrorKind, ExtractError, ItemParams};
use serde::Deserialize;

use crate::redact::{redact_pdf, RedactRequest};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn parse_args<T: serde::de::DeserializeOwned>(
    arguments: Option<serde_json::Value>,
) -> Result<T, JsonRpcError> {
    serde_json::from_value(arguments.unwrap_or(serde_json::Value::Null)).map_err(|e| JsonRpcError {
        code: INVALID_PARAMS,
        message: format!("Invalid arguments: {e}"),
        data: None,
    })
}

fn internal_err(message: String) -> JsonRpcError {
    JsonRpcError {
        code: INTERNAL_ERROR,
        message,
        data: None,
    }
}

fn invalid_params(message: String) -> JsonRpcError {
    JsonRpcError {
        code: INVALID_PARAMS,
        message,
        data: None,
    }
}

/// Validation problems are the caller's fault; decode failures are not.
fn extract_err(err: ExtractError) -> JsonRpcError {
    let (code, kind) = match err.kind() {
        ErrorKind::Validation => (INVALID_PARAMS, "validation"),
        ErrorKind::Decode => (INTERNAL_ERROR, "decode"),
    };
    JsonRpcError {
        code,
        message: err.to_string(),
        data: Some(serde_json::json!({ "kind": kind })),
    }
}

fn to_text_result(value: &impl serde::Serialize) -> Result<serde_json::Value, JsonRpcError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| internal_err(format!("Serialization error: {e}")))?;

    serde_json::to_value(CallToolResult {
        content: vec![Content::Text { text: json }],
        is_error: None,
    })
    .map_err(|e| internal_err(format!("Internal error: {e}")))
}

async fn run_blocking<T, F>(f: F) -> Result<T, JsonRpcError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, JsonRpcError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| internal_err(format!("Task join error: {e}")))?
}

fn decode_base64(field: &str, data: &str) -> Result<Vec<u8>, JsonRpcError> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| invalid_params(format!("Invalid base64 string in {field}: {e}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn handle_pdf_text_extract(
    arguments: Option<serde_json::Value>,
    global: &crate::Global,
) -> Result<serde_json::Value, JsonRpcError> {
    let params: ItemParams = parse_args(arguments)?;

    if global.verbose {
        crate::prelude::eprintln!(
            "pdf_text_extract: {} base64 bytes, terms {}",
            params.base64_pdf.len(),
            params.search_text_array
        );
    }

    let extraction = run_blocking(move || run_item(&params).map_err(extract_err)).await?;

    to_text_result(&extraction)
}

pub async fn handle_pdf_redact(
    arguments: Option<serde_json::Value>,
    _global: &crate::Global,
) -> Result<serde_json::Value, JsonRpcError> {
    #[derive(Deserialize)]
    struct Args {
        #[serde(flatten)]
        request: RedactRequest,
        watermark: Option<String>,
    }

    let args: Args = parse_args(arguments)?;
    let pdf = decode_base64("pdf_string", &args.request.pdf_string)?;
    let watermark = args
        .watermark
        .as_deref()
        .map(|data| decode_base64("watermark", data).map(::pdf::Watermark::new))
        .transpose()?;
    let redactions = args.request.matched_texts;

    let output = run_blocking(move || {
        redact_pdf(&pdf, &redactions, watermark.as_ref())
            .map_err(|e| internal_err(format!("Error processing PDF: {e}")))
    })
    .await?;

    to_text_result(&serde_json::json!({
        "pdf": base64::engine::general_purpose::STANDARD.encode(output),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global() -> crate::Global {
        crate::Global { verbose: false }
    }

    fn encode(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn invoice_pdf() -> Vec<u8> {
        ::pdf::fixtures::single_page(&[("Invoice", 72.0, 700.0)])
    }

    /// The JSON document carried in the first text content item.
    fn text_payload(result: &serde_json::Value) -> serde_json::Value {
        let text = result["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_extract_match() {
        let result = handle_pdf_text_extract(
            Some(serde_json::json!({
                "base64Pdf": encode(&invoice_pdf()),
                "searchTextArray": "[\"Invoice\"]"
            })),
            &global(),
        )
        .await
        .unwrap();

        assert_eq!(result["content"][0]["type"], "text");
        let payload = text_payload(&result);
        let records = payload["matchedTexts"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["text"], "Invoice");
        assert_eq!(records[0]["x"], 72.0);
        assert_eq!(records[0]["y"], 700.0);
        assert_eq!(records[0]["pageWidth"], 612.0);
        assert_eq!(records[0]["pageHeight"], 792.0);
        assert!((records[0]["width"].as_f64().unwrap() - 42.0).abs() < 1e-3);
        assert!((records[0]["height"].as_f64().unwrap() - 10.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_extract_validation_error() {
        let err = handle_pdf_text_extract(
            Some(serde_json::json!({
                "base64Pdf": encode(&invoice_pdf()),
                "searchTextArray": "[1,2]"
            })),
            &global(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, INVALID_PARAMS);
        assert_eq!(
            err.message,
            "The search text array must be a valid JSON array of strings."
        );
        assert_eq!(err.data, Some(serde_json::json!({"kind": "validation"})));
    }

    #[tokio::test]
    async fn test_extract_decode_error() {
        let err = handle_pdf_text_extract(
            Some(serde_json::json!({
                "base64Pdf": encode(b"not a pdf"),
                "searchTextArray": "[\"a\"]"
            })),
            &global(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, INTERNAL_ERROR);
        assert!(err.message.starts_with("Error processing PDF: "));
        assert_eq!(err.data, Some(serde_json::json!({"kind": "decode"})));
    }

    #[tokio::test]
    async fn test_extract_missing_argument() {
        let err = handle_pdf_text_extract(
            Some(serde_json::json!({ "base64Pdf": "QUJD" })),
            &global(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
        assert!(err.message.starts_with("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_redact_returns_pdf() {
        let result = handle_pdf_redact(
            Some(serde_json::json!({
                "pdf_string": encode(&invoice_pdf()),
                "matched_texts": [{"text": "Invoice", "x": 72, "y": 700, "width": 42, "height": 10}]
            })),
            &global(),
        )
        .await
        .unwrap();

        let payload = text_payload(&result);
        let pdf = base64::engine::general_purpose::STANDARD
            .decode(payload["pdf"].as_str().unwrap())
            .unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert!(String::from_utf8_lossy(&pdf).contains("(redact0)"));
    }

    #[tokio::test]
    async fn test_redact_with_watermark() {
        let result = handle_pdf_redact(
            Some(serde_json::json!({
                "pdf_string": encode(&invoice_pdf()),
                "matched_texts": [],
                "watermark": encode(&::pdf::fixtures::png(3, 3))
            })),
            &global(),
        )
        .await
        .unwrap();
        assert!(text_payload(&result)["pdf"].is_string());
    }

    #[tokio::test]
    async fn test_redact_bad_base64() {
        let err = handle_pdf_redact(
            Some(serde_json::json!({
                "pdf_string": "***",
                "matched_texts": []
            })),
            &global(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
        assert!(err.message.starts_with("Invalid base64 string in pdf_string"));
    }

    #[tokio::test]
    async fn test_redact_not_a_pdf() {
        let err = handle_pdf_redact(
            Some(serde_json::json!({
                "pdf_string": encode(b"hello"),
                "matched_texts": []
            })),
            &global(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, INTERNAL_ERROR);
    }
}
