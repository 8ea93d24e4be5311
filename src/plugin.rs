//! Plugin registry: maps (verb, resource kind) pairs to handlers.
//!
//! A feature module implements [`CommandPlugin`] — the explicit
//! capability contract: it must supply its grammar fragment and its
//! handler table, both checked at registration time. Duplicate
//! (verb, kind) registration is a startup-fatal conflict. After
//! [`PluginRegistry::compile`] the handler table is read-only and can be
//! shared across sessions.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::command::{Command, ResourceKind, Verb};
use crate::error::{ConflictError, EngineError};
use crate::executor::{HandlerCx, Outcome};
use crate::grammar::GrammarFragment;

/// Executes one (verb, resource kind) command form.
pub trait Handler: Send + Sync {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError>;
}

impl<F> Handler for F
where
    F: Fn(&mut HandlerCx<'_>, &Command) -> Result<Outcome, EngineError> + Send + Sync,
{
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        self(cx, cmd)
    }
}

pub type HandlerTable = Vec<((Verb, ResourceKind), Arc<dyn Handler>)>;

/// Capability contract every feature module must satisfy.
pub trait CommandPlugin {
    fn name(&self) -> &'static str;
    fn fragment(&self) -> GrammarFragment;
    fn handlers(&self) -> HandlerTable;
}

/// Identifies one registered feature module.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub pairs: Vec<(Verb, ResourceKind)>,
}

/// Collects handler tables until [`PluginRegistry::compile`] freezes
/// them.
#[derive(Default)]
pub struct PluginRegistry {
    handlers: HashMap<(Verb, ResourceKind), Arc<dyn Handler>>,
    sources: HashMap<(Verb, ResourceKind), String>,
    descriptors: Vec<PluginDescriptor>,
    compiled: bool,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        plugin: &str,
        table: HandlerTable,
    ) -> Result<PluginDescriptor, ConflictError> {
        if self.compiled {
            return Err(ConflictError::RegistryFrozen);
        }
        for ((verb, kind), _) in &table {
            if let Some(existing) = self.sources.get(&(*verb, *kind)) {
                return Err(ConflictError::DuplicateHandler {
                    verb: *verb,
                    kind: *kind,
                    existing_plugin: existing.clone(),
                });
            }
        }
        let mut pairs = Vec::with_capacity(table.len());
        for ((verb, kind), handler) in table {
            debug!(plugin, %verb, %kind, "registering handler");
            self.sources.insert((verb, kind), plugin.to_string());
            self.handlers.insert((verb, kind), handler);
            pairs.push((verb, kind));
        }
        let descriptor = PluginDescriptor {
            name: plugin.to_string(),
            pairs,
        };
        self.descriptors.push(descriptor.clone());
        Ok(descriptor)
    }

    /// Freeze into the read-only handler table. Called exactly once at
    /// startup, after every plugin has registered.
    pub fn compile(&mut self) -> CompiledPlugins {
        self.compiled = true;
        info!(
            plugins = self.descriptors.len(),
            handlers = self.handlers.len(),
            "plugin registry compiled"
        );
        CompiledPlugins {
            handlers: self.handlers.clone(),
            descriptors: self.descriptors.clone(),
        }
    }
}

/// Read-only handler table shared across sessions.
#[derive(Clone)]
pub struct CompiledPlugins {
    handlers: HashMap<(Verb, ResourceKind), Arc<dyn Handler>>,
    descriptors: Vec<PluginDescriptor>,
}

impl CompiledPlugins {
    pub fn handler(&self, verb: Verb, kind: ResourceKind) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(&(verb, kind))
    }

    pub fn supports(&self, verb: Verb, kind: ResourceKind) -> bool {
        self.handlers.contains_key(&(verb, kind))
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }
}
