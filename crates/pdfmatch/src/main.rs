use crate::prelude::*;
use clap::Parser;

mod error;
mod extract;
mod mcp;
mod prelude;
mod redact;
mod serve;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Find exact text matches in PDF documents, report where they are, and black them out"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Whether to display additional information.
    #[clap(long, env = "PDFMATCH_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Report text runs that exactly match the search strings
    Extract(crate::extract::App),

    /// Black out match records and optionally watermark the document
    Redact(crate::redact::App),

    /// Model Context Protocol server
    MCP(crate::mcp::App),

    /// HTTP API for extraction and redaction
    Serve(crate::serve::App),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Extract(sub_app) => crate::extract::run(sub_app, app.global).await,
        SubCommands::Redact(sub_app) => crate::redact::run(sub_app, app.global).await,
        SubCommands::MCP(sub_app) => crate::mcp::run(sub_app, app.global).await,
        SubCommands::Serve(sub_app) => crate::serve::run(sub_app, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
