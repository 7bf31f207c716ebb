//! Montage MCP Server implementation using the official rmcp SDK.
//!
//! Provides manage_project, manage_sequence, and manage_media tools for AI
//! assistants to drive the video editor through the connected plugin.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::broker::InstructionBroker;
use crate::catalog;
use crate::types::ActionOutcome;

/// Parameters for the manage_project tool
#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ManageProjectParams {
    /// Project action to execute
    pub action: String,

    /// Action-specific arguments as a JSON object
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Parameters for the manage_sequence tool
#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ManageSequenceParams {
    /// Sequence action to execute
    pub action: String,

    /// Action-specific arguments as a JSON object
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Parameters for the manage_media tool
#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ManageMediaParams {
    /// Media action to execute
    pub action: String,

    /// Action-specific arguments as a JSON object
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Montage MCP Server
///
/// Implements the MCP server protocol and bridges tool calls to the editor
/// plugin via the instruction broker.
#[derive(Clone)]
pub struct MontageServer {
    broker: Arc<InstructionBroker>,
    tool_router: ToolRouter<MontageServer>,
}

#[tool_router]
impl MontageServer {
    pub fn new(broker: Arc<InstructionBroker>) -> Self {
        Self {
            broker,
            tool_router: Self::tool_router(),
        }
    }

    /// Every invocation outcome is returned as structured content; failures
    /// surface as `{success: false, message}` rather than protocol errors.
    fn outcome_content(outcome: ActionOutcome) -> Result<CallToolResult, McpError> {
        let content = Content::json(outcome).map_err(|e| {
            McpError::internal_error(
                "Failed to serialize action outcome",
                Some(serde_json::json!({ "error": e.to_string() })),
            )
        })?;
        Ok(CallToolResult::success(vec![content]))
    }

    #[tool(
        description = "\
            Manage video-editor projects through the connected plugin.\n\
            \n\
            Actions:\n\
            - get_active: describe the currently open project\n\
            - open_project: open a project file (args: path, options?)\n\
            - create_project: create a new project (args: path)\n\
            - save_project: save the open project\n\
            - save_project_as: save the open project under a new path (args: path)\n\
            - close_project: close the open project (args: options?)\n\
            \n\
            Returns a structured result with a success flag and either a\n\
            result payload or a failure message.\
        "
    )]
    async fn manage_project(
        &self,
        Parameters(params): Parameters<ManageProjectParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(action = %params.action, "manage_project tool call");

        let outcome = catalog::project_action(&self.broker, &params.action, params.args).await;
        Self::outcome_content(outcome)
    }

    #[tool(
        description = "\
            Manage video-editor sequences and the playhead.\n\
            \n\
            Actions:\n\
            - get_active: describe the active sequence\n\
            - create_sequence: create a sequence (args: name, preset_path?)\n\
            - create_sequence_from_media: build a sequence from project items\n\
              (args: name, clip_project_items, target_bin?)\n\
            - set_active_sequence: switch the active sequence (args: sequence_id)\n\
            - get_sequence_list: list all sequences in the project\n\
            - get_player_position: read the playhead position\n\
            - set_player_position: move the playhead (args: position)\n\
            \n\
            Returns a structured result with a success flag and either a\n\
            result payload or a failure message.\
        "
    )]
    async fn manage_sequence(
        &self,
        Parameters(params): Parameters<ManageSequenceParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(action = %params.action, "manage_sequence tool call");

        let outcome = catalog::sequence_action(&self.broker, &params.action, params.args).await;
        Self::outcome_content(outcome)
    }

    #[tool(
        description = "\
            Import footage, sequences, and compositions into the open project.\n\
            \n\
            Actions:\n\
            - import_files: import media files (args: file_paths, suppress_ui?,\n\
              target_bin?, as_numbered_stills?)\n\
            - import_sequences: copy sequences from another project\n\
              (args: project_path, sequence_ids)\n\
            - import_comps: import named compositions from a motion-graphics\n\
              project (args: project_path, comp_names, target_bin?)\n\
            - import_all_comps: import every composition from a motion-graphics\n\
              project (args: project_path, target_bin?)\n\
            \n\
            Returns a structured result with a success flag and either a\n\
            result payload or a failure message.\
        "
    )]
    async fn manage_media(
        &self,
        Parameters(params): Parameters<ManageMediaParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(action = %params.action, "manage_media tool call");

        let outcome = catalog::media_action(&self.broker, &params.action, params.args).await;
        Self::outcome_content(outcome)
    }
}

#[tool_handler]
impl ServerHandler for MontageServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "montage-mcp".to_string(),
                version: "0.1.0".to_string(),
            },
            instructions: Some(
                "This server bridges tool calls to a video-editor plugin over a local socket. \
                 Use 'manage_project' for project lifecycle operations, 'manage_sequence' for \
                 sequence and playhead operations, and 'manage_media' to import footage, \
                 sequences, and compositions. Every tool returns a structured result with a \
                 success flag and either a result payload or a failure message; a failure \
                 message of 'no plugin connection available' means the editor plugin is not \
                 running yet."
                    .to_string(),
            ),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("MCP client connected and initialized");
        Ok(self.get_info())
    }
}
