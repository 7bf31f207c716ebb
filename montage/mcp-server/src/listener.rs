//! TCP bridge transport for plugin connections.
//!
//! Accepts plugin connections on a local port, frames messages as one JSON
//! object per newline-terminated line, and hands every inbound line to the
//! broker's message hook.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::broker::InstructionBroker;
use crate::registry::{ConnectionRegistry, PluginConnection};

/// Bind the bridge socket.
///
/// A port that is already claimed is an unrecoverable startup fault; the
/// error carries the address so the operator can see what collided.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind plugin bridge socket on {host}:{port}"))?;
    info!("plugin bridge listening on {host}:{port}");
    Ok(listener)
}

/// Accept plugin connections until the task is dropped.
pub async fn run(
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    broker: Arc<InstructionBroker>,
) {
    let mut next_connection_id = 0u64;

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let connection_id = next_connection_id;
                next_connection_id += 1;

                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                registry.add(Arc::new(PluginConnection::new(connection_id, outbound_tx)));
                info!(
                    "plugin {connection_id} connected from {addr} (total: {})",
                    registry.count()
                );

                let registry = registry.clone();
                let broker = broker.clone();
                tokio::spawn(handle_connection(
                    connection_id,
                    stream,
                    outbound_rx,
                    registry,
                    broker,
                ));
            }
            Err(e) => {
                error!("failed to accept plugin connection: {e}");
            }
        }
    }
}

/// Shuttle frames for one plugin until it disconnects.
async fn handle_connection(
    connection_id: u64,
    mut stream: TcpStream,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    registry: Arc<ConnectionRegistry>,
    broker: Arc<InstructionBroker>,
) {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        tokio::select! {
            // Read responses from this plugin
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => {
                        info!("plugin {connection_id} disconnected (EOF)");
                        break;
                    }
                    Ok(_) => {
                        let frame = line.trim();
                        if !frame.is_empty() {
                            broker.handle_message(frame);
                        }
                        line.clear();
                    }
                    Err(e) => {
                        error!("error reading from plugin {connection_id}: {e}");
                        break;
                    }
                }
            }

            // Deliver queued instructions to this plugin
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(frame) => {
                        let framed = format!("{frame}\n");
                        if let Err(e) = writer.write_all(framed.as_bytes()).await {
                            error!("failed to write to plugin {connection_id}: {e}");
                            break;
                        }
                        if let Err(e) = writer.flush().await {
                            error!("failed to flush to plugin {connection_id}: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    registry.remove(connection_id);
    info!(
        "plugin {connection_id} removed (remaining: {})",
        registry.count()
    );
}
