//! Canonical command values.
//!
//! A [`Command`] is the immutable output of the transformer: one verb,
//! one resource kind, an optional target, an ordered field list and a
//! list of typed sub-clauses. It is consumed exactly once by the
//! executor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Action keyword of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Create,
    Delete,
    Update,
    Get,
    List,
    Execute,
    Use,
    Drop,
}

impl Verb {
    pub fn as_keyword(&self) -> &'static str {
        match self {
            Verb::Create => "CREATE",
            Verb::Delete => "DELETE",
            Verb::Update => "UPDATE",
            Verb::Get => "GET",
            Verb::List => "LIST",
            Verb::Execute => "EXECUTE",
            Verb::Use => "USE",
            Verb::Drop => "DROP",
        }
    }

    /// Mutating verbs must not be retried automatically: the gateway has
    /// no idempotency token, so a retry could duplicate a side effect.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Verb::Get | Verb::List)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_keyword())
    }
}

/// Object type a command acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Secret,
    ConfigMap,
    Parameter,
    Script,
    Project,
    Environment,
}

impl ResourceKind {
    pub fn as_keyword(&self) -> &'static str {
        match self {
            ResourceKind::Secret => "SECRET",
            ResourceKind::ConfigMap => "CONFIGMAP",
            ResourceKind::Parameter => "PARAMETER",
            ResourceKind::Script => "SCRIPT",
            ResourceKind::Project => "PROJECT",
            ResourceKind::Environment => "ENVIRONMENT",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_keyword())
    }
}

/// Value of a single field from a WITH/SET clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Literal string from the command text.
    Literal(String),

    /// A local file path marked for deferred resolution. The executor
    /// resolves it through the `FileLoader` collaborator before the
    /// command reaches a handler.
    FilePath(String),
}

impl FieldValue {
    pub fn as_str(&self) -> &str {
        match self {
            FieldValue::Literal(s) | FieldValue::FilePath(s) => s,
        }
    }
}

/// One `name = "value"` field. Fields preserve source order; within one
/// clause a later duplicate key overrides an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub value: FieldValue,
}

/// Project reference attached by a `FOR ...` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectRef {
    /// `FOR THIS PROJECT` — resolve against the session binding.
    This,
    /// `FOR PROJECT <name>`.
    Named(String),
}

/// Typed sub-clause of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clause {
    /// `WITH ARGS (k = "v", ...)` — explicit job arguments.
    ArgSet(Vec<Field>),

    /// `WITH PARAMS_FROM_CONFIGMAP <name> [KEY_PREFIX "p"]`.
    ParamsFromConfigMap {
        name: String,
        key_prefix: Option<String>,
    },

    /// `WITH SECRET <name> KEY "k" AS "/path"`.
    SecretMount {
        secret: String,
        key: String,
        mount_path: String,
    },

    /// `FOR THIS PROJECT` / `FOR PROJECT <name>`.
    ForProject(ProjectRef),

    /// `DEPENDS ON <env>`.
    DependsOn(String),

    /// `UPDATE PROJECT <old> TO <new>` — the new display name.
    RenameTo(String),
}

/// Canonical command, built once by the transformer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub verb: Verb,
    pub resource_kind: ResourceKind,
    pub target_name: Option<String>,
    pub fields: Vec<Field>,
    pub clauses: Vec<Clause>,
}

impl Command {
    /// Field lookup by key, case-insensitive (keys are canonicalized to
    /// lowercase by the transformer, but be lenient for callers).
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|f| f.key.eq_ignore_ascii_case(key))
            .map(|f| &f.value)
    }

    pub fn project_ref(&self) -> Option<&ProjectRef> {
        self.clauses.iter().find_map(|c| match c {
            Clause::ForProject(r) => Some(r),
            _ => None,
        })
    }

    pub fn depends_on(&self) -> Option<&str> {
        self.clauses.iter().find_map(|c| match c {
            Clause::DependsOn(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn rename_to(&self) -> Option<&str> {
        self.clauses.iter().find_map(|c| match c {
            Clause::RenameTo(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lookup_is_case_insensitive() {
        let cmd = Command {
            verb: Verb::Create,
            resource_kind: ResourceKind::Secret,
            target_name: Some("tok".into()),
            fields: vec![Field {
                key: "api_key".into(),
                value: FieldValue::Literal("s3cret".into()),
            }],
            clauses: vec![],
        };
        assert_eq!(cmd.field("API_KEY").unwrap().as_str(), "s3cret");
        assert!(cmd.field("missing").is_none());
    }

    #[test]
    fn read_verbs_are_not_mutating() {
        assert!(!Verb::Get.is_mutating());
        assert!(!Verb::List.is_mutating());
        assert!(Verb::Execute.is_mutating());
        assert!(Verb::Drop.is_mutating());
    }
}
