//! Instruction catalog: the fixed set of plugin operations reachable from
//! the MCP tools.
//!
//! Each entry is a pure mapping from named, typed arguments to an
//! `(instruction name, payload)` pair. A single wrapper funnels every entry
//! through the broker and normalizes the outcome, so no failure of any kind
//! escapes this layer. Catalog code never touches the connection registry or
//! the pending table directly.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

use crate::broker::InstructionBroker;
use crate::types::ActionOutcome;

#[derive(Error, Debug)]
enum CatalogError {
    #[error("Unknown {group} action: {action}")]
    UnknownAction {
        group: &'static str,
        action: String,
    },

    #[error("Invalid arguments for {action}: {source}")]
    InvalidArguments {
        action: String,
        source: serde_json::Error,
    },
}

/// A catalog entry resolved to its wire form.
type Mapped = (&'static str, Value);

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Deserialize an entry's argument struct from the tool's `args` object.
/// Absent args (`null`) count as an empty object.
fn parse_args<T: serde::de::DeserializeOwned>(
    action: &str,
    args: Value,
) -> Result<T, CatalogError> {
    let args = if args.is_null() { empty_object() } else { args };
    serde_json::from_value(args).map_err(|source| CatalogError::InvalidArguments {
        action: action.to_string(),
        source,
    })
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct OpenProjectArgs {
    path: String,
    #[serde(default = "empty_object")]
    options: Value,
}

#[derive(Debug, Deserialize)]
struct CloseProjectArgs {
    #[serde(default = "empty_object")]
    options: Value,
}

#[derive(Debug, Deserialize)]
struct CreateSequenceArgs {
    name: String,
    #[serde(default)]
    preset_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateSequenceFromMediaArgs {
    name: String,
    clip_project_items: Vec<Value>,
    #[serde(default)]
    target_bin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetActiveSequenceArgs {
    sequence_id: String,
}

#[derive(Debug, Deserialize)]
struct SetPlayerPositionArgs {
    position: Value,
}

#[derive(Debug, Deserialize)]
struct ImportFilesArgs {
    file_paths: Vec<String>,
    #[serde(default)]
    suppress_ui: bool,
    #[serde(default)]
    target_bin: Option<String>,
    #[serde(default)]
    as_numbered_stills: bool,
}

#[derive(Debug, Deserialize)]
struct ImportSequencesArgs {
    project_path: String,
    sequence_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ImportCompsArgs {
    project_path: String,
    comp_names: Vec<String>,
    #[serde(default)]
    target_bin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImportAllCompsArgs {
    project_path: String,
    #[serde(default)]
    target_bin: Option<String>,
}

fn map_project_action(action: &str, args: Value) -> Result<Mapped, CatalogError> {
    match action.to_lowercase().as_str() {
        "get_active" => Ok(("getActiveProject", json!({}))),
        "open_project" => {
            let args: OpenProjectArgs = parse_args(action, args)?;
            Ok((
                "openProject",
                json!({ "path": args.path, "options": args.options }),
            ))
        }
        "create_project" => {
            let args: PathArgs = parse_args(action, args)?;
            Ok(("createProject", json!({ "path": args.path })))
        }
        "save_project" => Ok(("saveProject", json!({}))),
        "save_project_as" => {
            let args: PathArgs = parse_args(action, args)?;
            Ok(("saveProjectAs", json!({ "path": args.path })))
        }
        "close_project" => {
            let args: CloseProjectArgs = parse_args(action, args)?;
            Ok(("closeProject", json!({ "options": args.options })))
        }
        _ => Err(CatalogError::UnknownAction {
            group: "project",
            action: action.to_string(),
        }),
    }
}

fn map_sequence_action(action: &str, args: Value) -> Result<Mapped, CatalogError> {
    match action.to_lowercase().as_str() {
        "get_active" => Ok(("getActiveSequence", json!({}))),
        "create_sequence" => {
            let args: CreateSequenceArgs = parse_args(action, args)?;
            Ok((
                "createSequence",
                json!({ "name": args.name, "presetPath": args.preset_path }),
            ))
        }
        "create_sequence_from_media" => {
            let args: CreateSequenceFromMediaArgs = parse_args(action, args)?;
            Ok((
                "createSequenceFromMedia",
                json!({
                    "name": args.name,
                    "clipProjectItems": args.clip_project_items,
                    "targetBin": args.target_bin,
                }),
            ))
        }
        "set_active_sequence" => {
            let args: SetActiveSequenceArgs = parse_args(action, args)?;
            Ok((
                "setActiveSequence",
                json!({ "sequenceId": args.sequence_id }),
            ))
        }
        "get_sequence_list" => Ok(("getSequenceList", json!({}))),
        "get_player_position" => Ok(("getPlayerPosition", json!({}))),
        "set_player_position" => {
            let args: SetPlayerPositionArgs = parse_args(action, args)?;
            Ok(("setPlayerPosition", json!({ "position": args.position })))
        }
        _ => Err(CatalogError::UnknownAction {
            group: "sequence",
            action: action.to_string(),
        }),
    }
}

fn map_media_action(action: &str, args: Value) -> Result<Mapped, CatalogError> {
    match action.to_lowercase().as_str() {
        "import_files" => {
            let args: ImportFilesArgs = parse_args(action, args)?;
            Ok((
                "importFiles",
                json!({
                    "filePaths": args.file_paths,
                    "suppressUI": args.suppress_ui,
                    "targetBin": args.target_bin,
                    "asNumberedStills": args.as_numbered_stills,
                }),
            ))
        }
        "import_sequences" => {
            let args: ImportSequencesArgs = parse_args(action, args)?;
            Ok((
                "importSequences",
                json!({
                    "projectPath": args.project_path,
                    "sequenceIds": args.sequence_ids,
                }),
            ))
        }
        "import_comps" => {
            let args: ImportCompsArgs = parse_args(action, args)?;
            Ok((
                "importComps",
                json!({
                    "projectPath": args.project_path,
                    "compNames": args.comp_names,
                    "targetBin": args.target_bin,
                }),
            ))
        }
        "import_all_comps" => {
            let args: ImportAllCompsArgs = parse_args(action, args)?;
            Ok((
                "importAllComps",
                json!({
                    "projectPath": args.project_path,
                    "targetBin": args.target_bin,
                }),
            ))
        }
        _ => Err(CatalogError::UnknownAction {
            group: "media",
            action: action.to_string(),
        }),
    }
}

/// Execute a project action end to end.
pub async fn project_action(
    broker: &InstructionBroker,
    action: &str,
    args: Value,
) -> ActionOutcome {
    run_instruction(broker, map_project_action(action, args)).await
}

/// Execute a sequence action end to end.
pub async fn sequence_action(
    broker: &InstructionBroker,
    action: &str,
    args: Value,
) -> ActionOutcome {
    run_instruction(broker, map_sequence_action(action, args)).await
}

/// Execute a media action end to end.
pub async fn media_action(broker: &InstructionBroker, action: &str, args: Value) -> ActionOutcome {
    run_instruction(broker, map_media_action(action, args)).await
}

/// Common pre/post processing shared by every catalog entry: send the mapped
/// instruction through the broker and fold every possible failure into the
/// uniform outcome shape.
async fn run_instruction(
    broker: &InstructionBroker,
    mapped: Result<Mapped, CatalogError>,
) -> ActionOutcome {
    let (instruction, payload) = match mapped {
        Ok(mapped) => mapped,
        Err(e) => return ActionOutcome::failed(e.to_string()),
    };

    debug!(instruction, "dispatching catalog entry");
    match broker.call(instruction, payload).await {
        Ok(reply) => match reply.error {
            None => ActionOutcome::succeeded(reply.result),
            Some(message) => ActionOutcome::failed(message),
        },
        Err(e) => ActionOutcome::failed(e.to_string()),
    }
}
