//! Parse-tree to canonical-command transformation.
//!
//! One walk over the [`Statement`] produces exactly one [`Command`].
//! Combinations with no registered handler, misplaced clauses, and
//! missing targets are semantic errors here — before any context or
//! remote mutation can occur. Field lists preserve source order and a
//! later duplicate key within the statement overrides an earlier one.

use crate::command::{Clause, Command, Field, FieldValue, ProjectRef, ResourceKind, Verb};
use crate::error::{EngineError, SemanticError, SyntaxError};
use crate::grammar::{ClauseKind, CompiledGrammar, TargetRule};
use crate::parser::{RawClause, RawField, RawProjectRef, Statement};
use crate::plugin::CompiledPlugins;

/// Key suffix that marks a field value as a local file path to be
/// resolved by the FileLoader before execution.
const FROM_FILE_SUFFIX: &str = "_from_file";

pub fn transform(
    stmt: &Statement,
    grammar: &CompiledGrammar,
    plugins: &CompiledPlugins,
) -> Result<Command, EngineError> {
    let verb = stmt.verb.node;
    let kind = stmt.kind.node;

    let shape = grammar.shape(verb, kind).ok_or(SemanticError::UnsupportedCommand { verb, kind })?;

    match (&stmt.target, shape.target) {
        (None, TargetRule::Required) if !stmt.this_target => {
            return Err(SemanticError::MissingTarget { verb, kind }.into());
        }
        (Some(t), TargetRule::None) => {
            return Err(SyntaxError::new(
                t.offset,
                "no target name for this command",
                format!("'{}'", t.node),
            )
            .into());
        }
        _ => {}
    }

    // Project and environment names are canonicalized to lowercase; the
    // namespaces derived from them are lowercase-only anyway.
    let lowercase_names = matches!(kind, ResourceKind::Project | ResourceKind::Environment);
    let canonicalize = |name: &str| {
        if lowercase_names {
            name.to_ascii_lowercase()
        } else {
            name.to_string()
        }
    };

    let mut fields: Vec<Field> = Vec::new();
    let mut clauses: Vec<Clause> = Vec::new();
    let mut use_env: Option<String> = None;

    if stmt.this_target {
        clauses.push(Clause::ForProject(ProjectRef::This));
    }

    for spanned in &stmt.clauses {
        let check = |ck: ClauseKind| -> Result<(), EngineError> {
            if shape.allows(ck) {
                Ok(())
            } else {
                Err(SemanticError::UnsupportedClause {
                    verb,
                    kind,
                    clause: ck.describe().to_string(),
                }
                .into())
            }
        };

        match &spanned.node {
            RawClause::With(raw) => {
                check(ClauseKind::WithFields)?;
                merge_fields(&mut fields, raw);
            }
            RawClause::Set(raw) => {
                check(ClauseKind::SetFields)?;
                merge_fields(&mut fields, raw);
            }
            RawClause::TypeValue(value) => {
                check(ClauseKind::TypeValue)?;
                upsert(&mut fields, "type", FieldValue::Literal(value.to_ascii_lowercase()));
            }
            RawClause::EngineValue(value) => {
                check(ClauseKind::EngineValue)?;
                upsert(&mut fields, "engine", FieldValue::Literal(value.to_ascii_lowercase()));
            }
            RawClause::Args(raw) => {
                check(ClauseKind::Args)?;
                let mut args = Vec::new();
                merge_fields(&mut args, raw);
                clauses.push(Clause::ArgSet(args));
            }
            RawClause::ParamsFromConfigMap { name, key_prefix } => {
                check(ClauseKind::ParamsFromConfigMap)?;
                clauses.push(Clause::ParamsFromConfigMap {
                    name: name.clone(),
                    key_prefix: key_prefix.clone(),
                });
            }
            RawClause::SecretMount {
                secret,
                key,
                mount_path,
            } => {
                check(ClauseKind::SecretMount)?;
                clauses.push(Clause::SecretMount {
                    secret: secret.clone(),
                    key: key.clone(),
                    mount_path: mount_path.clone(),
                });
            }
            RawClause::For(raw) => {
                check(ClauseKind::ForProject)?;
                clauses.push(Clause::ForProject(match raw {
                    RawProjectRef::This => ProjectRef::This,
                    RawProjectRef::Named(name) => ProjectRef::Named(name.to_ascii_lowercase()),
                }));
            }
            RawClause::DependsOn(name) => {
                check(ClauseKind::DependsOn)?;
                clauses.push(Clause::DependsOn(name.to_ascii_lowercase()));
            }
            RawClause::To(name) => {
                check(ClauseKind::RenameTo)?;
                clauses.push(Clause::RenameTo(name.to_ascii_lowercase()));
            }
            RawClause::UseEnv(name) => {
                check(ClauseKind::UseEnv)?;
                use_env = Some(name.to_ascii_lowercase());
            }
        }
    }

    // USE PROJECT <p> ENV <e> parses under (USE, PROJECT) but denotes an
    // environment binding: the canonical command targets the environment
    // and carries the project as a clause.
    if verb == Verb::Use {
        let env = use_env.ok_or(SemanticError::MissingField {
            verb,
            kind,
            field: "ENV".to_string(),
        })?;
        let project = stmt
            .target
            .as_ref()
            .map(|t| t.node.to_ascii_lowercase())
            .ok_or(SemanticError::MissingTarget { verb, kind })?;
        let command = Command {
            verb: Verb::Use,
            resource_kind: ResourceKind::Environment,
            target_name: Some(env),
            fields,
            clauses: vec![Clause::ForProject(ProjectRef::Named(project))],
        };
        ensure_supported(&command, plugins)?;
        return Ok(command);
    }

    let command = Command {
        verb,
        resource_kind: kind,
        target_name: stmt.target.as_ref().map(|t| canonicalize(&t.node)),
        fields,
        clauses,
    };
    ensure_supported(&command, plugins)?;
    Ok(command)
}

fn ensure_supported(cmd: &Command, plugins: &CompiledPlugins) -> Result<(), EngineError> {
    if plugins.supports(cmd.verb, cmd.resource_kind) {
        Ok(())
    } else {
        Err(SemanticError::UnsupportedCommand {
            verb: cmd.verb,
            kind: cmd.resource_kind,
        }
        .into())
    }
}

/// Merge raw fields preserving first-occurrence order, later duplicate
/// keys overriding earlier values. Keys with the `_from_file` marker
/// become deferred file paths.
fn merge_fields(fields: &mut Vec<Field>, raw: &[RawField]) {
    for rf in raw {
        let value = if rf.key.ends_with(FROM_FILE_SUFFIX) {
            FieldValue::FilePath(rf.value.clone())
        } else {
            FieldValue::Literal(rf.value.clone())
        };
        upsert(fields, &rf.key, value);
    }
}

fn upsert(fields: &mut Vec<Field>, key: &str, value: FieldValue) {
    match fields.iter_mut().find(|f| f.key == key) {
        Some(existing) => existing.value = value,
        None => fields.push(Field {
            key: key.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::parser::statement::parse;

    fn compiled() -> (CompiledGrammar, CompiledPlugins) {
        Engine::compile_builtins().expect("built-in plugins compile")
    }

    fn xform(text: &str) -> Result<Command, EngineError> {
        let (grammar, plugins) = compiled();
        let stmt = parse(text).expect("statement parses");
        transform(&stmt, &grammar, &plugins)
    }

    #[test]
    fn duplicate_field_keys_last_write_wins() {
        let cmd = xform(r#"CREATE SECRET s WITH k = "first", other = "x", k = "second""#).unwrap();
        assert_eq!(cmd.fields.len(), 2);
        assert_eq!(cmd.fields[0].key, "k");
        assert_eq!(cmd.fields[0].value, FieldValue::Literal("second".into()));
        assert_eq!(cmd.fields[1].key, "other");
    }

    #[test]
    fn from_file_fields_are_deferred() {
        let cmd =
            xform(r#"CREATE SCRIPT etl TYPE python WITH code_from_file = "jobs/etl.py""#).unwrap();
        assert_eq!(
            cmd.field("code_from_file"),
            Some(&FieldValue::FilePath("jobs/etl.py".into()))
        );
        assert_eq!(cmd.field("type"), Some(&FieldValue::Literal("python".into())));
    }

    #[test]
    fn unknown_combination_is_semantic_not_syntax() {
        let err = xform("EXECUTE SECRET s").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Semantic(SemanticError::UnsupportedCommand { .. })
        ));
    }

    #[test]
    fn misplaced_clause_is_semantic() {
        let err = xform("CREATE SECRET s DEPENDS ON dev").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Semantic(SemanticError::UnsupportedClause { .. })
        ));
    }

    #[test]
    fn use_statement_targets_environment() {
        let cmd = xform("USE PROJECT Alpha ENV Dev").unwrap();
        assert_eq!(cmd.verb, Verb::Use);
        assert_eq!(cmd.resource_kind, ResourceKind::Environment);
        assert_eq!(cmd.target_name.as_deref(), Some("dev"));
        assert_eq!(
            cmd.project_ref(),
            Some(&ProjectRef::Named("alpha".to_string()))
        );
    }

    #[test]
    fn project_names_are_canonicalized_lowercase() {
        let cmd = xform("CREATE PROJECT Alpha").unwrap();
        assert_eq!(cmd.target_name.as_deref(), Some("alpha"));
    }

    #[test]
    fn parsing_twice_yields_equal_commands() {
        let text = r#"EXECUTE SCRIPT etl WITH ARGS (a = "1") WITH SECRET s KEY "k" AS "/p";"#;
        assert_eq!(xform(text).unwrap(), xform(text).unwrap());
    }

    #[test]
    fn missing_target_is_semantic() {
        let err = xform("CREATE SECRET WITH k = \"v\"").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Semantic(SemanticError::MissingTarget { .. })
        ));
    }
}
