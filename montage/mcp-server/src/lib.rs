//! Montage MCP Server Library
//!
//! Bridges MCP tool invocations to a long-lived video-editor plugin over a
//! persistent local socket.

pub mod broker;
pub mod catalog;
pub mod constants;
pub mod listener;
pub mod registry;
mod server;
pub mod structured_logging;
pub mod types;

pub use broker::{CallError, InstructionBroker};
pub use registry::{ConnectionRegistry, PluginConnection};
pub use server::MontageServer;

// Re-export Options for use in main.rs
pub use crate::main_types::Options;

mod main_types {
    use clap::Parser;

    use crate::constants;

    #[derive(Parser, Debug, Clone)]
    pub struct Options {
        /// Interface the plugin bridge listens on
        #[arg(long, default_value = constants::DEFAULT_BIND_HOST)]
        pub host: String,

        /// Port the plugin bridge listens on
        #[arg(long, default_value_t = constants::DEFAULT_BIND_PORT)]
        pub port: u16,

        /// Seconds to wait for a plugin response before a call fails
        #[arg(long, default_value_t = constants::DEFAULT_CALL_TIMEOUT_SECS)]
        pub call_timeout: u64,

        /// Enable development logging to the default log file
        #[arg(long, global = true)]
        pub dev_log: bool,
    }
}
