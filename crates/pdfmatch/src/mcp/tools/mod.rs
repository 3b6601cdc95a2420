mod pdf;

use serde::{Deserialize, Serialize};

// Re-export types needed by tool handlers
pub use super::{JsonRpcError, Tool, INTERNAL_ERROR, INVALID_PARAMS};

// MCP Protocol types for tools
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ServerCapabilities {
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Serialize)]
pub struct ToolsCapability {}

#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Debug, Serialize)]
pub struct ToolsList {
    pub tools: Vec<Tool>,
}

#[derive(Debug, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum Content {
    #[serde(rename = "text")]
    Text { text: String },
}

pub fn handle_initialize() -> Result<serde_json::Value, JsonRpcError> {
    let result = InitializeResult {
        protocol_version: "2024-11-05".to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability {}),
        },
        server_info: ServerInfo {
            name: "pdfmatch".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };

    serde_json::to_value(result).map_err(|e| JsonRpcError {
        code: INTERNAL_ERROR,
        message: format!("Internal error: {e}"),
        data: None,
    })
}

pub fn handle_tools_list() -> Result<serde_json::Value, JsonRpcError> {
    let tools = vec![
        Tool {
            name: "pdf_text_extract".to_string(),
            description: "Find text runs in a PDF that exactly match one of the given strings. Matching is case-sensitive and whole-run: a run matches only if its text equals a search string. Returns {\"matchedTexts\": [...]} where each record carries text, x, y, width, height, pageWidth and pageHeight in PDF points, with the origin at the bottom-left of the page.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "base64Pdf": {
                        "type": "string",
                        "description": "The PDF document encoded as standard base64"
                    },
                    "searchTextArray": {
                        "type": "string",
                        "description": "A JSON array of strings, passed as a string (e.g., '[\"Invoice\", \"Total\"]')"
                    }
                },
                "required": ["base64Pdf", "searchTextArray"]
            }),
        },
        Tool {
            name: "pdf_redact".to_string(),
            description: "Black out rectangles in a PDF with filled Square annotations, one per record, and optionally stamp a faint image watermark behind every page. Accepts the records returned by pdf_text_extract. Returns {\"pdf\": \"<base64>\"} with the edited document.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "pdf_string": {
                        "type": "string",
                        "description": "The PDF document encoded as standard base64"
                    },
                    "matched_texts": {
                        "type": "array",
                        "description": "Rectangles to black out: objects with x, y, width, height and an optional 1-based page (default: 1)",
                        "items": {
                            "type": "object",
                            "properties": {
                                "x": { "type": "number" },
                                "y": { "type": "number" },
                                "width": { "type": "number" },
                                "height": { "type": "number" },
                                "page": { "type": "number" }
                            },
                            "required": ["x", "y", "width", "height"]
                        }
                    },
                    "watermark": {
                        "type": "string",
                        "description": "Optional PNG or JPEG image, base64 encoded, stamped on every page"
                    }
                },
                "required": ["pdf_string", "matched_texts"]
            }),
        },
    ];

    let result = ToolsList { tools };

    serde_json::to_value(result).map_err(|e| JsonRpcError {
        code: INTERNAL_ERROR,
        message: format!("Internal error: {e}"),
        data: None,
    })
}

pub async fn handle_tools_call(
    params: Option<serde_json::Value>,
    global: &crate::Global,
) -> Result<serde_json::Value, JsonRpcError> {
    let params: CallToolParams = serde_json::from_value(params.unwrap_or(serde_json::Value::Null))
        .map_err(|e| JsonRpcError {
            code: INVALID_PARAMS,
            message: format!("Invalid params: {e}"),
            data: None,
        })?;

    match params.name.as_str() {
        "pdf_text_extract" => pdf::handle_pdf_text_extract(params.arguments, global).await,
        "pdf_redact" => pdf::handle_pdf_redact(params.arguments, global).await,
        _ => Err(JsonRpcError {
            code: INVALID_PARAMS,
            message: format!("Unknown tool: {}", params.name),
            data: None,
        }),
    }
}
