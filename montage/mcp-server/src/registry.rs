//! Connection registry for the plugin bridge.
//!
//! Tracks the set of currently-connected plugins and picks the send target.
//! Selection is last-writer-wins: a single connected plugin is the steady
//! state, and when several are connected only the newest one receives
//! instructions.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;

/// Error returned when a frame cannot be handed to a connection's writer task.
#[derive(Error, Debug)]
#[error("plugin connection {id} is closed")]
pub struct ConnectionClosed {
    pub id: u64,
}

/// Handle to one connected plugin.
///
/// Owns the outbound channel drained by the connection's writer task. The
/// handle may outlive the socket; sends fail once the writer task is gone.
#[derive(Debug)]
pub struct PluginConnection {
    id: u64,
    outbound: mpsc::UnboundedSender<String>,
}

impl PluginConnection {
    pub fn new(id: u64, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue one serialized message for delivery to this plugin.
    pub fn send_frame(&self, frame: String) -> Result<(), ConnectionClosed> {
        self.outbound
            .send(frame)
            .map_err(|_| ConnectionClosed { id: self.id })
    }
}

/// Ordered set of connected plugins. Append on connect, remove on disconnect.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<Vec<Arc<PluginConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, connection: Arc<PluginConnection>) {
        self.connections.lock().unwrap().push(connection);
    }

    /// Remove a connection by id. No-op when the id is not present.
    pub fn remove(&self, id: u64) {
        self.connections.lock().unwrap().retain(|c| c.id() != id);
    }

    /// Most recently connected plugin, or `None` when nothing is connected.
    pub fn current_target(&self) -> Option<Arc<PluginConnection>> {
        self.connections.lock().unwrap().last().cloned()
    }

    /// Number of connected plugins, for diagnostics.
    pub fn count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}
