//! Montage MCP Server binary.
//!
//! Starts the plugin bridge listener and serves MCP over stdio. The bridge
//! socket and the MCP transport run as independent tasks; tool calls meet
//! plugin responses in the instruction broker.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rmcp::{ServiceExt, transport::stdio};
use tracing::{error, info};

use montage_mcp::{
    ConnectionRegistry, InstructionBroker, MontageServer, Options, listener, structured_logging,
};

#[derive(Parser)]
#[command(name = "montage-mcp")]
#[command(about = "MCP server bridging tool calls to a video-editor plugin")]
struct Args {
    #[command(flatten)]
    options: Options,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let flush_guard = structured_logging::init_tracing(args.options.dev_log)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    info!("starting Montage MCP server");

    let registry = Arc::new(ConnectionRegistry::new());
    let broker = Arc::new(InstructionBroker::new(
        registry.clone(),
        Duration::from_secs(args.options.call_timeout),
    ));

    // An unbindable port is the one unrecoverable startup fault; everything
    // past this point degrades to per-call errors instead.
    let bridge = listener::bind(&args.options.host, args.options.port).await?;
    let accept_task = tokio::spawn(listener::run(bridge, registry.clone(), broker.clone()));

    let server = MontageServer::new(broker);
    let service = server.serve(stdio()).await.inspect_err(|e| {
        error!("MCP server error: {e:?}");
    })?;

    info!("Montage MCP server is ready and listening");
    service.waiting().await?;

    info!("Montage MCP server shutting down");
    accept_task.abort();

    std::mem::drop(flush_guard);
    Ok(())
}
