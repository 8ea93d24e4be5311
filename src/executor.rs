//! Command execution.
//!
//! The executor resolves the handler for a canonical command, resolves
//! the target namespace from the session context, resolves deferred file
//! fields through the `FileLoader`, gates destructive drops behind the
//! caller-supplied confirmation, and normalizes results. Side effects
//! are confined to gateway calls made by handlers and to session
//! mutations triggered by PROJECT/ENV verbs.

use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::command::{Command, Field, FieldValue, ResourceKind, Verb};
use crate::config::EngineConfig;
use crate::context::{ExecutionContext, ProjectStore};
use crate::error::{ClusterError, EngineError};
use crate::gateway::{ClusterGateway, FileLoader};
use crate::plugin::CompiledPlugins;

/// Normalized result of one executed command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The command ran; `data` carries a JSON payload for presentation.
    Done { message: String, data: Value },

    /// A destructive command was aborted before any state change.
    Cancelled { message: String },
}

impl Outcome {
    pub fn done(message: impl Into<String>, data: Value) -> Self {
        Outcome::Done {
            message: message.into(),
            data,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Outcome::Cancelled {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Done { message, .. } | Outcome::Cancelled { message } => message,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Outcome::Done { data, .. } => Some(data),
            Outcome::Cancelled { .. } => None,
        }
    }
}

/// Per-invocation options supplied by the caller (the interactive loop
/// or an embedding server).
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Confirmation phrase for destructive drops. DROP PROJECT requires
    /// the project's display name, case-sensitive; DROP ENV requires an
    /// affirmative "yes".
    pub confirmation: Option<String>,

    /// Answer to the "switch to the new project?" offer after
    /// CREATE PROJECT.
    pub switch_to_created: bool,
}

impl ExecOptions {
    pub fn confirmed_with(phrase: impl Into<String>) -> Self {
        Self {
            confirmation: Some(phrase.into()),
            ..Self::default()
        }
    }
}

/// Everything a handler may touch: the resolved namespace, the session
/// and project model, the gateway, and the invocation options.
pub struct HandlerCx<'a> {
    pub namespace: String,
    pub config: &'a EngineConfig,
    pub projects: &'a mut ProjectStore,
    pub session: &'a mut ExecutionContext,
    pub gateway: &'a mut dyn ClusterGateway,
    pub options: &'a ExecOptions,
}

pub struct Executor<'e> {
    plugins: &'e CompiledPlugins,
    config: &'e EngineConfig,
}

impl<'e> Executor<'e> {
    pub fn new(plugins: &'e CompiledPlugins, config: &'e EngineConfig) -> Self {
        Self { plugins, config }
    }

    /// Execute one command against the session. Consumes the command.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &self,
        mut command: Command,
        projects: &mut ProjectStore,
        session: &mut ExecutionContext,
        gateway: &mut dyn ClusterGateway,
        loader: &dyn FileLoader,
        options: &ExecOptions,
    ) -> Result<Outcome, EngineError> {
        let verb = command.verb;
        let kind = command.resource_kind;

        // The transformer validated against the same registry, so a miss
        // here is a programming error, not a user error.
        let Some(handler) = self.plugins.handler(verb, kind) else {
            panic!("no handler for {verb} {kind} after transformer validation");
        };

        if let Some(outcome) = self.confirm_destructive(&command, projects, options)? {
            return Ok(outcome);
        }

        command.fields = resolve_file_fields(command.fields, loader)?;

        let mut cx = HandlerCx {
            namespace: session.active_namespace().to_string(),
            config: self.config,
            projects,
            session,
            gateway,
            options,
        };

        info!(%verb, %kind, target = ?command.target_name, namespace = %cx.namespace, "executing");
        let outcome = handler.execute(&mut cx, &command)?;
        Ok(outcome)
    }

    /// Destructive drops require an explicit affirmative confirmation
    /// before the handler is invoked; anything else aborts with no state
    /// change.
    fn confirm_destructive(
        &self,
        command: &Command,
        projects: &ProjectStore,
        options: &ExecOptions,
    ) -> Result<Option<Outcome>, EngineError> {
        if command.verb != Verb::Drop {
            return Ok(None);
        }
        match command.resource_kind {
            ResourceKind::Project => {
                let name = command.target_name.as_deref().unwrap_or_default();
                let project = projects.resolve_display(name)?;
                // Case-sensitive match against the stored display name.
                if options.confirmation.as_deref() != Some(project.display_name.as_str()) {
                    warn!(project = %project.display_name, "project drop aborted: confirmation mismatch");
                    return Ok(Some(Outcome::cancelled(format!(
                        "drop of project '{}' cancelled: confirmation must equal the project name",
                        project.display_name
                    ))));
                }
            }
            ResourceKind::Environment => {
                let confirmed = options
                    .confirmation
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case("yes"));
                if !confirmed {
                    let name = command.target_name.as_deref().unwrap_or_default();
                    warn!(environment = name, "environment drop aborted: not confirmed");
                    return Ok(Some(Outcome::cancelled(format!(
                        "drop of environment '{name}' cancelled: confirm with 'yes'"
                    ))));
                }
            }
            _ => {}
        }
        Ok(None)
    }
}

/// Replace every deferred file field with its loaded content, renaming
/// `<key>_from_file` to `<key>`. Fields keep their positions; if the
/// plain key was also given, the resolved content wins.
fn resolve_file_fields(
    fields: Vec<Field>,
    loader: &dyn FileLoader,
) -> Result<Vec<Field>, EngineError> {
    let mut resolved: Vec<Field> = Vec::with_capacity(fields.len());
    for field in fields {
        let (key, value) = match field.value {
            FieldValue::FilePath(path) => {
                let bytes = loader
                    .load(Path::new(&path))
                    .map_err(|cause| EngineError::Cluster(ClusterError { cause }))?;
                let key = field
                    .key
                    .strip_suffix("_from_file")
                    .unwrap_or(&field.key)
                    .to_string();
                (key, FieldValue::Literal(String::from_utf8_lossy(&bytes).into_owned()))
            }
            other => (field.key, other),
        };
        match resolved.iter_mut().find(|f| f.key == key) {
            Some(existing) => existing.value = value,
            None => resolved.push(Field { key, value }),
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::MemoryFileLoader;

    #[test]
    fn file_fields_are_resolved_and_renamed() {
        let mut loader = MemoryFileLoader::new();
        loader.insert("jobs/etl.py", "print('etl')".as_bytes().to_vec());

        let fields = vec![
            Field {
                key: "description".into(),
                value: FieldValue::Literal("nightly".into()),
            },
            Field {
                key: "code_from_file".into(),
                value: FieldValue::FilePath("jobs/etl.py".into()),
            },
        ];
        let resolved = resolve_file_fields(fields, &loader).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].key, "code");
        assert_eq!(resolved[1].value, FieldValue::Literal("print('etl')".into()));
    }

    #[test]
    fn missing_file_is_a_cluster_error() {
        let loader = MemoryFileLoader::new();
        let fields = vec![Field {
            key: "code_from_file".into(),
            value: FieldValue::FilePath("absent.py".into()),
        }];
        let err = resolve_file_fields(fields, &loader).unwrap_err();
        assert!(matches!(err, EngineError::Cluster(_)));
    }
}
