//! Built-in feature modules.
//!
//! Each module contributes a grammar fragment and a handler table
//! through the [`CommandPlugin`](crate::plugin::CommandPlugin) contract:
//! `resources` (SECRET/CONFIGMAP/PARAMETER CRUD), `scripts` (script
//! lifecycle and job execution), and `projects` (project/environment
//! management and the session binding).

pub mod projects;
pub mod resources;
pub mod scripts;

pub use projects::ProjectsPlugin;
pub use resources::ResourcesPlugin;
pub use scripts::ScriptsPlugin;

use serde_json::{Map, Value};

use crate::command::Command;
use crate::error::{ClusterError, EngineError, NotFoundError};
use crate::gateway::GatewayError;

/// Map a gateway failure: a remote miss becomes the engine's own
/// `NotFoundError`; everything else is reported as a `ClusterError` with
/// the cause preserved.
pub(crate) fn map_gateway(err: GatewayError) -> EngineError {
    match err {
        GatewayError::NotFound {
            kind,
            namespace,
            name,
        } => NotFoundError::Resource {
            kind: kind.to_string(),
            name,
            namespace,
        }
        .into(),
        other => EngineError::Cluster(ClusterError { cause: other }),
    }
}

/// Wrap any gateway failure as a `ClusterError` (for mutations, where a
/// remote miss is not a lookup the user asked for).
pub(crate) fn cluster(cause: GatewayError) -> EngineError {
    EngineError::Cluster(ClusterError { cause })
}

/// Render a command's field list as a flat JSON object, preserving
/// source order semantics (the transformer already applied
/// last-write-wins).
pub(crate) fn fields_to_object(cmd: &Command) -> Map<String, Value> {
    cmd.fields
        .iter()
        .map(|f| (f.key.clone(), Value::String(f.value.as_str().to_string())))
        .collect()
}
