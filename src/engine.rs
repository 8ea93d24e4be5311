//! Engine assembly: registries, compilation, and the eval entry point.
//!
//! Startup is two-phase: plugins register their grammar fragments and
//! handler tables, then both registries compile into read-only tables.
//! A registration conflict is fatal before any command runs. After
//! compilation the engine evaluates one statement at a time:
//! parse, transform to the canonical command, execute.

use tracing::debug;

use crate::command::Command;
use crate::config::EngineConfig;
use crate::context::{ExecutionContext, ProjectStore};
use crate::error::{ConflictError, EngineError};
use crate::executor::{ExecOptions, Executor, Outcome};
use crate::gateway::{ClusterGateway, FileLoader};
use crate::grammar::{CompiledGrammar, GrammarRegistry};
use crate::parser::statement;
use crate::plugin::{CommandPlugin, CompiledPlugins, PluginRegistry};
use crate::plugins::{ProjectsPlugin, ResourcesPlugin, ScriptsPlugin};
use crate::transform::transform;

/// Collects plugins before compilation.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    grammar: GrammarRegistry,
    plugins: PluginRegistry,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            grammar: GrammarRegistry::new(),
            plugins: PluginRegistry::new(),
        }
    }

    /// Register one feature module: its grammar fragment and its handler
    /// table, each checked for conflicts.
    pub fn with_plugin(mut self, plugin: &dyn CommandPlugin) -> Result<Self, ConflictError> {
        let name = plugin.name();
        self.grammar.register(name, plugin.fragment())?;
        self.plugins.register(name, plugin.handlers())?;
        debug!(plugin = name, "plugin registered");
        Ok(self)
    }

    /// Freeze both registries and produce the engine.
    pub fn build(mut self) -> Engine {
        let grammar = self.grammar.compile();
        let plugins = self.plugins.compile();
        Engine {
            config: self.config,
            grammar,
            plugins,
            projects: ProjectStore::new(),
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    grammar: CompiledGrammar,
    plugins: CompiledPlugins,
    projects: ProjectStore,
}

impl Engine {
    /// Engine with the built-in feature modules registered.
    pub fn new(config: EngineConfig) -> Result<Self, ConflictError> {
        Ok(EngineBuilder::new(config)
            .with_plugin(&ResourcesPlugin)?
            .with_plugin(&ScriptsPlugin)?
            .with_plugin(&ProjectsPlugin)?
            .build())
    }

    /// Compile the built-in registries standalone (for tooling and
    /// tests that need the tables without a full engine).
    pub fn compile_builtins() -> Result<(CompiledGrammar, CompiledPlugins), ConflictError> {
        let engine = Engine::new(EngineConfig::default())?;
        Ok((engine.grammar, engine.plugins))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn grammar(&self) -> &CompiledGrammar {
        &self.grammar
    }

    pub fn plugins(&self) -> &CompiledPlugins {
        &self.plugins
    }

    pub fn projects(&self) -> &ProjectStore {
        &self.projects
    }

    /// Fresh session bound to nothing, targeting the default namespace.
    pub fn new_session(&self) -> ExecutionContext {
        ExecutionContext::new(&self.config)
    }

    /// Parse and transform one statement without executing it.
    pub fn parse_command(&self, text: &str) -> Result<Command, EngineError> {
        let stmt = statement::parse(text)?;
        transform(&stmt, &self.grammar, &self.plugins)
    }

    /// Evaluate one statement against a session: parse, transform,
    /// execute. Errors are reported to the caller and leave the engine
    /// usable for the next statement.
    pub fn eval(
        &mut self,
        text: &str,
        session: &mut ExecutionContext,
        gateway: &mut dyn ClusterGateway,
        loader: &dyn FileLoader,
        options: &ExecOptions,
    ) -> Result<Outcome, EngineError> {
        let command = {
            let stmt = statement::parse(text)?;
            transform(&stmt, &self.grammar, &self.plugins)?
        };
        let executor = Executor::new(&self.plugins, &self.config);
        executor.execute(
            command,
            &mut self.projects,
            session,
            gateway,
            loader,
            options,
        )
    }

    /// Prompt prefix reflecting the session's binding, e.g. `(alpha/dev)`.
    pub fn prompt(&self, session: &ExecutionContext) -> String {
        session.prompt_prefix(&self.projects)
    }
}
