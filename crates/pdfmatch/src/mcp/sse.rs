use crate::prelude::{eprintln, *};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Path clients POST JSON-RPC messages to; announced on the event stream.
const MESSAGE_PATH: &str = "/message";

pub async fn run_sse(options: super::cli::SseOptions, global: crate::Global) -> Result<()> {
    let addr = format!("{}:{}", options.host, options.port);

    if global.verbose {
        eprintln!("Starting MCP server with SSE transport on {addr}...");
        eprintln!("SSE endpoint: http://{addr}/sse");
        eprintln!("Message endpoint: http://{addr}{MESSAGE_PATH}");
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre!("MCP SSE transport failed to bind to {addr}: {e}"))?;

    log::info!("mcp sse transport listening on {addr}");

    axum::serve(listener, router(global))
        .await
        .map_err(|e| eyre!("MCP SSE transport stopped: {e}"))
}

fn router(global: crate::Global) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/sse", get(sse_handler))
        .route(MESSAGE_PATH, post(message_handler))
        .layer(cors)
        .with_state(Arc::new(global))
}

/// Announce the message endpoint, then keep the stream open.
async fn sse_handler(
    State(_global): State<Arc<crate::Global>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let endpoint = Event::default().event("endpoint").data(MESSAGE_PATH);
    let stream = stream::once(async move { Ok(endpoint) }).chain(stream::pending());
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn message_handler(
    State(global): State<Arc<crate::Global>>,
    Json(request): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    if global.verbose {
        eprintln!("Received: {request}");
    }

    let request_str = request.to_string();
    let response = super::handle_request(&request_str, &global).await;
    match serde_json::to_value(&response) {
        Ok(value) => Json(value),
        Err(e) => {
            log::error!("cannot serialize mcp response: {e}");
            Json(serde_json::Value::Null)
        }
    }
}
