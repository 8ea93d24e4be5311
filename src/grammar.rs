//! Grammar registry and composed grammar.
//!
//! Feature modules contribute a [`GrammarFragment`]: named syntax rules
//! plus the statement shapes those rules describe. The registry collects
//! fragments at startup, rejects rule-name collisions, and compiles one
//! read-only [`CompiledGrammar`] the parser and transformer share for
//! the rest of the process.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::command::{ResourceKind, Verb};
use crate::error::ConflictError;

/// Clause categories a statement shape may allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    WithFields,
    SetFields,
    TypeValue,
    EngineValue,
    Args,
    ParamsFromConfigMap,
    SecretMount,
    ForProject,
    DependsOn,
    RenameTo,
    UseEnv,
}

impl ClauseKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ClauseKind::WithFields => "WITH <fields>",
            ClauseKind::SetFields => "SET <fields>",
            ClauseKind::TypeValue => "TYPE <value>",
            ClauseKind::EngineValue => "ENGINE <value>",
            ClauseKind::Args => "WITH ARGS (...)",
            ClauseKind::ParamsFromConfigMap => "WITH PARAMS_FROM_CONFIGMAP",
            ClauseKind::SecretMount => "WITH SECRET ... KEY ... AS ...",
            ClauseKind::ForProject => "FOR PROJECT / FOR THIS PROJECT",
            ClauseKind::DependsOn => "DEPENDS ON",
            ClauseKind::RenameTo => "TO <name>",
            ClauseKind::UseEnv => "ENV <name>",
        }
    }
}

/// Whether a statement names a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRule {
    Required,
    Optional,
    None,
}

/// Shape of one statement form: which (verb, kind) it covers, whether a
/// target name is expected, and which clauses are grammatical.
#[derive(Debug, Clone)]
pub struct StatementShape {
    pub verb: Verb,
    pub kind: ResourceKind,
    pub target: TargetRule,
    pub clauses: Vec<ClauseKind>,
}

impl StatementShape {
    pub fn new(verb: Verb, kind: ResourceKind, target: TargetRule) -> Self {
        Self {
            verb,
            kind,
            target,
            clauses: Vec::new(),
        }
    }

    pub fn allow(mut self, clause: ClauseKind) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn allows(&self, clause: ClauseKind) -> bool {
        self.clauses.contains(&clause)
    }
}

/// One named syntax rule, kept in EBNF-ish text form for diagnostics and
/// for the global uniqueness check.
#[derive(Debug, Clone)]
pub struct GrammarRule {
    pub name: String,
    pub body: String,
}

/// Syntax rules contributed by one feature module.
#[derive(Debug, Clone, Default)]
pub struct GrammarFragment {
    pub rules: Vec<GrammarRule>,
    pub shapes: Vec<StatementShape>,
}

impl GrammarFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.rules.push(GrammarRule {
            name: name.into(),
            body: body.into(),
        });
        self
    }

    pub fn shape(mut self, shape: StatementShape) -> Self {
        self.shapes.push(shape);
        self
    }
}

/// Collects fragments until [`GrammarRegistry::compile`] freezes them.
#[derive(Debug, Default)]
pub struct GrammarRegistry {
    rules: Vec<GrammarRule>,
    rule_sources: HashMap<String, String>,
    shapes: HashMap<(Verb, ResourceKind), StatementShape>,
    shape_sources: HashMap<(Verb, ResourceKind), String>,
    compiled: bool,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment under the contributing plugin's name. A rule
    /// name or statement shape that is already taken is a startup-fatal
    /// conflict.
    pub fn register(
        &mut self,
        plugin: &str,
        fragment: GrammarFragment,
    ) -> Result<(), ConflictError> {
        if self.compiled {
            return Err(ConflictError::RegistryFrozen);
        }
        for rule in &fragment.rules {
            if let Some(existing) = self.rule_sources.get(&rule.name) {
                return Err(ConflictError::DuplicateRule {
                    rule: rule.name.clone(),
                    existing_plugin: existing.clone(),
                });
            }
        }
        for shape in &fragment.shapes {
            let key = (shape.verb, shape.kind);
            if let Some(existing) = self.shape_sources.get(&key) {
                return Err(ConflictError::DuplicateRule {
                    rule: format!("{} {}", shape.verb, shape.kind),
                    existing_plugin: existing.clone(),
                });
            }
        }
        debug!(
            plugin,
            rules = fragment.rules.len(),
            shapes = fragment.shapes.len(),
            "registering grammar fragment"
        );
        for rule in fragment.rules {
            self.rule_sources
                .insert(rule.name.clone(), plugin.to_string());
            self.rules.push(rule);
        }
        for shape in fragment.shapes {
            let key = (shape.verb, shape.kind);
            self.shape_sources.insert(key, plugin.to_string());
            self.shapes.insert(key, shape);
        }
        Ok(())
    }

    /// Freeze the registry into the unified grammar. Called exactly once
    /// before any parsing occurs.
    pub fn compile(&mut self) -> CompiledGrammar {
        self.compiled = true;
        info!(
            rules = self.rules.len(),
            shapes = self.shapes.len(),
            "grammar compiled"
        );
        CompiledGrammar {
            rules: self.rules.clone(),
            shapes: self.shapes.clone(),
        }
    }
}

/// Unified grammar, read-only after compilation and safely shareable
/// across sessions.
#[derive(Debug, Clone)]
pub struct CompiledGrammar {
    rules: Vec<GrammarRule>,
    shapes: HashMap<(Verb, ResourceKind), StatementShape>,
}

impl CompiledGrammar {
    pub fn shape(&self, verb: Verb, kind: ResourceKind) -> Option<&StatementShape> {
        self.shapes.get(&(verb, kind))
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    /// Rendered rule listing, one `name := body` per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            out.push_str(&rule.name);
            out.push_str(" := ");
            out.push_str(&rule.body);
            out.push('\n');
        }
        out
    }
}
