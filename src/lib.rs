//! kubesol - SQL-like command language for cluster resources
//!
//! One statement in, one effect out: text is tokenized, parsed into a
//! statement tree, transformed into a canonical command, and dispatched
//! to the feature module registered for its (verb, resource kind) pair.
//!
//! ## Pipeline
//! Command text -> Lexer -> Statement -> Transform -> Command -> Handler -> ClusterGateway
//!
//! ## Quick Start
//!
//! ```rust
//! use kubesol::{Engine, EngineConfig, ExecOptions};
//! use kubesol::gateway::memory::{MemoryFileLoader, MemoryGateway};
//!
//! let mut engine = Engine::new(EngineConfig::default()).unwrap();
//! let mut session = engine.new_session();
//! let mut gateway = MemoryGateway::new();
//! let loader = MemoryFileLoader::new();
//! let outcome = engine
//!     .eval(
//!         r#"CREATE SECRET db-creds WITH user = "svc";"#,
//!         &mut session,
//!         &mut gateway,
//!         &loader,
//!         &ExecOptions::default(),
//!     )
//!     .unwrap();
//! assert!(outcome.message().contains("db-creds"));
//! ```

// Core error taxonomy
pub mod error;

// Canonical command model
pub mod command;

// Engine configuration
pub mod config;

// Session context and the project/environment model
pub mod context;

// Grammar and plugin registries (compile-once, read-only after)
pub mod grammar;
pub mod plugin;

// Tokenizer and statement parser
pub mod parser;

// Statement -> canonical command transformation
pub mod transform;

// Command execution
pub mod executor;

// Cluster access seam and the in-memory test double
pub mod gateway;

// Built-in feature modules: resources, scripts, projects
pub mod plugins;

// Engine assembly and the eval entry point
pub mod engine;

// Public re-exports for the common embedding path
pub use command::{Clause, Command, Field, FieldValue, ProjectRef, ResourceKind, Verb};
pub use config::EngineConfig;
pub use context::{ExecutionContext, Project, ProjectStore};
pub use engine::{Engine, EngineBuilder};
pub use error::{
    ClusterError, ConflictError, DependencyError, EngineError, NotFoundError, SemanticError,
    SyntaxError,
};
pub use executor::{ExecOptions, Outcome};
pub use gateway::{ClusterGateway, ClusterObject, FileLoader, GatewayError, JobSpec, ObjectKind};
pub use plugin::{CommandPlugin, Handler, HandlerTable};
