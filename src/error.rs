//! Error taxonomy for the kubesol command engine.
//!
//! Every failure class the engine can surface has its own type; the
//! umbrella [`EngineError`] carries them across component boundaries.
//! Syntax and semantic errors are detected before any context or remote
//! mutation occurs. The only startup-fatal class is a duplicate
//! grammar-rule or handler registration ([`ConflictError`]).

use thiserror::Error;

use crate::command::{ResourceKind, Verb};

/// Main error type for the command engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Malformed command text. `position` is a byte offset into the original
/// input so a caller can render a caret under the offending token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error at position {position}: expected {expected}, found {found}")]
pub struct SyntaxError {
    pub position: usize,
    pub expected: String,
    pub found: String,
}

impl SyntaxError {
    pub fn new(position: usize, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            position,
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Well-formed text that does not denote an executable command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("no handler registered for {verb} {kind}")]
    UnsupportedCommand { verb: Verb, kind: ResourceKind },

    #[error("{verb} {kind} requires a target name")]
    MissingTarget { verb: Verb, kind: ResourceKind },

    #[error("required field '{field}' missing for {verb} {kind}")]
    MissingField {
        verb: Verb,
        kind: ResourceKind,
        field: String,
    },

    #[error("invalid value '{value}' for {what}")]
    InvalidValue { what: String, value: String },

    #[error("clause {clause} is not valid for {verb} {kind}")]
    UnsupportedClause {
        verb: Verb,
        kind: ResourceKind,
        clause: String,
    },

    #[error("'THIS PROJECT' used with no project bound to the session")]
    NoProjectBound,
}

/// A named project, environment, or remote resource is absent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("project '{name}' not found")]
    Project { name: String },

    #[error("environment '{name}' not found in project '{project}'")]
    Environment { project: String, name: String },

    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    Resource {
        kind: String,
        name: String,
        namespace: String,
    },
}

/// A uniqueness invariant would be violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("project display name '{name}' already in use (project id '{existing_id}')")]
    DuplicateDisplayName { name: String, existing_id: String },

    #[error("environment '{name}' already exists in project '{project}'")]
    DuplicateEnvironment { project: String, name: String },

    #[error("grammar rule '{rule}' already registered by plugin '{existing_plugin}'")]
    DuplicateRule {
        rule: String,
        existing_plugin: String,
    },

    #[error("handler for {verb} {kind} already registered by plugin '{existing_plugin}'")]
    DuplicateHandler {
        verb: Verb,
        kind: ResourceKind,
        existing_plugin: String,
    },

    #[error("registry already compiled; registration is closed")]
    RegistryFrozen,
}

/// The environment depends-on relation would stop being a valid DAG.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    /// `chain` renders the walk that closes the cycle,
    /// e.g. `dev -> staging -> dev`.
    #[error("environment dependency cycle: {chain}")]
    Cycle { chain: String },

    /// Dropping the environment would leave dangling depends-on edges.
    #[error("environment '{name}' is depended on by: {dependents}")]
    InUse { name: String, dependents: String },
}

/// A failure surfaced by the ClusterGateway, cause preserved. The session
/// continues after reporting it.
#[derive(Error, Debug)]
#[error("cluster operation failed: {cause}")]
pub struct ClusterError {
    #[source]
    pub cause: crate::gateway::GatewayError,
}

impl From<crate::gateway::GatewayError> for ClusterError {
    fn from(cause: crate::gateway::GatewayError) -> Self {
        Self { cause }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
