//! Project/environment model and session execution context.
//!
//! The engine keeps a local notion of projects and environments that
//! stays consistent as remote objects are created, renamed, and deleted.
//! Projects are identified by an immutable generated id — display names
//! are mutable and never embedded in namespaces, so renaming a project
//! never renames namespaces. Environments are stored as an arena keyed
//! by name, with `depends_on` held as a name reference and re-validated
//! by an explicit cycle walk on every mutation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{ConflictError, DependencyError, EngineError, NotFoundError};

/// Hard cap on namespace name length (DNS label limit).
const NAMESPACE_MAX_LEN: usize = 63;

/// Derive the physical namespace for a project environment:
/// `prefix + project_id + "-" + sanitized(environment)`. Display names
/// never appear here.
pub fn derive_namespace(prefix: &str, project_id: &str, environment: &str) -> String {
    let mut sanitized = String::with_capacity(environment.len());
    let mut last_dash = false;
    for c in environment.to_ascii_lowercase().chars() {
        let keep = c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';
        if keep {
            sanitized.push(c);
            last_dash = c == '-';
        } else if !last_dash {
            sanitized.push('-');
            last_dash = true;
        }
    }
    let sanitized = sanitized.trim_matches('-');
    let env = if sanitized.is_empty() { "env" } else { sanitized };

    let mut ns = format!("{prefix}{project_id}-{env}");
    ns.truncate(NAMESPACE_MAX_LEN);
    ns
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    /// Name of another environment in the same project this one depends
    /// on (promotion order), if any.
    pub depends_on: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Immutable, generated at creation, never reused.
    pub id: String,
    /// Mutable display name, canonical lowercase, unique across projects
    /// case-insensitively.
    pub display_name: String,
    environments: BTreeMap<String, Environment>,
}

fn generate_project_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("proj-{}", &hex[..12])
}

impl Project {
    /// New project with its default environment.
    pub fn new(display_name: &str, default_environment: &str) -> Self {
        let mut environments = BTreeMap::new();
        environments.insert(
            default_environment.to_string(),
            Environment {
                name: default_environment.to_string(),
                depends_on: None,
                created_at: Utc::now(),
            },
        );
        Self {
            id: generate_project_id(),
            display_name: display_name.to_ascii_lowercase(),
            environments,
        }
    }

    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.get(name)
    }

    pub fn environments(&self) -> impl Iterator<Item = &Environment> {
        self.environments.values()
    }

    pub fn environment_names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }

    pub fn environment_count(&self) -> usize {
        self.environments.len()
    }

    /// Walk `depends_on` edges from `from`; error if the walk reaches
    /// `origin`. Called before any dependency edge is written, so the
    /// stored graph is always acyclic.
    fn check_no_cycle(&self, origin: &str, from: &str) -> Result<(), DependencyError> {
        let mut chain = vec![origin.to_string(), from.to_string()];
        let mut current = from.to_string();
        loop {
            if current == origin {
                return Err(DependencyError::Cycle {
                    chain: chain.join(" -> "),
                });
            }
            match self.environments.get(&current).and_then(|e| e.depends_on.clone()) {
                Some(next) => {
                    chain.push(next.clone());
                    current = next;
                }
                None => return Ok(()),
            }
        }
    }

    fn dependents_of(&self, name: &str) -> Vec<String> {
        self.environments
            .values()
            .filter(|e| e.depends_on.as_deref() == Some(name))
            .map(|e| e.name.clone())
            .collect()
    }
}

/// Local model of all known projects, keyed by immutable id.
#[derive(Debug, Default)]
pub struct ProjectStore {
    projects: BTreeMap<String, Project>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.projects.get(id)
    }

    pub fn find_by_display(&self, name: &str) -> Option<&Project> {
        self.projects
            .values()
            .find(|p| p.display_name.eq_ignore_ascii_case(name))
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    /// Case-insensitive display-name uniqueness check, optionally
    /// excluding one project id (for renames).
    pub fn ensure_display_free(
        &self,
        name: &str,
        exclude_id: Option<&str>,
    ) -> Result<(), ConflictError> {
        if let Some(existing) = self
            .projects
            .values()
            .find(|p| p.display_name.eq_ignore_ascii_case(name) && Some(p.id.as_str()) != exclude_id)
        {
            return Err(ConflictError::DuplicateDisplayName {
                name: name.to_ascii_lowercase(),
                existing_id: existing.id.clone(),
            });
        }
        Ok(())
    }

    /// Commit a project record built by [`Project::new`]. The caller is
    /// expected to have performed remote creation first so a gateway
    /// failure leaves the store untouched.
    pub fn insert(&mut self, project: Project) {
        debug!(id = %project.id, name = %project.display_name, "project recorded");
        self.projects.insert(project.id.clone(), project);
    }

    pub fn resolve_display(&self, name: &str) -> Result<&Project, NotFoundError> {
        self.find_by_display(name).ok_or_else(|| NotFoundError::Project {
            name: name.to_ascii_lowercase(),
        })
    }

    /// Rename a project. The new display name must be unused by any
    /// *other* project id; the id (and thus every derived namespace and
    /// any session binding) is unaffected.
    pub fn rename(&mut self, old_display: &str, new_display: &str) -> Result<&Project, EngineError> {
        let id = self.resolve_display(old_display)?.id.clone();
        self.ensure_display_free(new_display, Some(&id))?;
        let project = self.projects.get_mut(&id).expect("resolved id present");
        project.display_name = new_display.to_ascii_lowercase();
        debug!(%id, from = old_display, to = %project.display_name, "project renamed");
        Ok(project)
    }

    /// Validate a new environment (uniqueness + dependency) without
    /// mutating. Returns the record ready to commit.
    pub fn validate_new_environment(
        &self,
        project_id: &str,
        name: &str,
        depends_on: Option<&str>,
    ) -> Result<Environment, EngineError> {
        let project = self.project_by_id(project_id)?;
        if project.environment(name).is_some() {
            return Err(ConflictError::DuplicateEnvironment {
                project: project.display_name.clone(),
                name: name.to_string(),
            }
            .into());
        }
        if let Some(dep) = depends_on {
            // The new environment has no incoming edges yet; the only
            // possible cycle is a self-dependency. Classify it as a
            // cycle, not an absence.
            if dep == name {
                return Err(DependencyError::Cycle {
                    chain: format!("{name} -> {dep}"),
                }
                .into());
            }
            if project.environment(dep).is_none() {
                return Err(NotFoundError::Environment {
                    project: project.display_name.clone(),
                    name: dep.to_string(),
                }
                .into());
            }
        }
        Ok(Environment {
            name: name.to_string(),
            depends_on: depends_on.map(str::to_string),
            created_at: Utc::now(),
        })
    }

    pub fn commit_environment(&mut self, project_id: &str, env: Environment) {
        if let Some(project) = self.projects.get_mut(project_id) {
            debug!(%project_id, env = %env.name, depends_on = ?env.depends_on, "environment recorded");
            project.environments.insert(env.name.clone(), env);
        }
    }

    /// Re-point an existing environment's `depends_on`, rejecting cycles
    /// before any state mutation.
    pub fn set_dependency(
        &mut self,
        project_id: &str,
        name: &str,
        depends_on: &str,
    ) -> Result<(), EngineError> {
        let project = self.project_by_id(project_id)?;
        if project.environment(name).is_none() {
            return Err(NotFoundError::Environment {
                project: project.display_name.clone(),
                name: name.to_string(),
            }
            .into());
        }
        if project.environment(depends_on).is_none() {
            return Err(NotFoundError::Environment {
                project: project.display_name.clone(),
                name: depends_on.to_string(),
            }
            .into());
        }
        project.check_no_cycle(name, depends_on)?;

        let project = self.projects.get_mut(project_id).expect("checked above");
        let env = project.environments.get_mut(name).expect("checked above");
        env.depends_on = Some(depends_on.to_string());
        debug!(%project_id, env = name, depends_on, "dependency updated");
        Ok(())
    }

    /// Validate dropping an environment: it must exist and nothing may
    /// depend on it.
    pub fn validate_drop_environment(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<(), EngineError> {
        let project = self.project_by_id(project_id)?;
        if project.environment(name).is_none() {
            return Err(NotFoundError::Environment {
                project: project.display_name.clone(),
                name: name.to_string(),
            }
            .into());
        }
        let dependents = project.dependents_of(name);
        if !dependents.is_empty() {
            return Err(DependencyError::InUse {
                name: name.to_string(),
                dependents: dependents.join(", "),
            }
            .into());
        }
        Ok(())
    }

    pub fn remove_environment(&mut self, project_id: &str, name: &str) -> Option<Environment> {
        self.projects
            .get_mut(project_id)
            .and_then(|p| p.environments.remove(name))
    }

    pub fn remove_project(&mut self, id: &str) -> Option<Project> {
        self.projects.remove(id)
    }

    fn project_by_id(&self, id: &str) -> Result<&Project, NotFoundError> {
        self.projects.get(id).ok_or_else(|| NotFoundError::Project {
            name: id.to_string(),
        })
    }
}

/// Session binding to one project environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Bound by immutable id, so the binding survives a rename.
    pub project_id: String,
    pub environment: String,
}

/// Process-wide, single-session execution state. Mutated only by
/// USE PROJECT/ENV commands and as a side effect of DROP hitting the
/// bound project or environment. Not persisted beyond the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    binding: Option<Binding>,
    active_namespace: String,
    default_namespace: String,
}

impl ExecutionContext {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            binding: None,
            active_namespace: config.default_namespace.clone(),
            default_namespace: config.default_namespace.clone(),
        }
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Namespace targeted by commands lacking an explicit qualifier.
    pub fn active_namespace(&self) -> &str {
        &self.active_namespace
    }

    pub fn bind(&mut self, project_id: &str, environment: &str, namespace: &str) {
        debug!(project_id, environment, namespace, "session bound");
        self.binding = Some(Binding {
            project_id: project_id.to_string(),
            environment: environment.to_string(),
        });
        self.active_namespace = namespace.to_string();
    }

    /// Back to the default: no project, default namespace.
    pub fn reset(&mut self) {
        debug!(namespace = %self.default_namespace, "session reset");
        self.binding = None;
        self.active_namespace = self.default_namespace.clone();
    }

    /// Dropping the bound project unbinds the session.
    pub fn on_project_dropped(&mut self, project_id: &str) {
        if self
            .binding
            .as_ref()
            .is_some_and(|b| b.project_id == project_id)
        {
            self.reset();
        }
    }

    /// Dropping the bound environment unbinds the session (deliberate
    /// policy: no auto-rebinding to an arbitrary sibling).
    pub fn on_environment_dropped(&mut self, project_id: &str, environment: &str) {
        if self
            .binding
            .as_ref()
            .is_some_and(|b| b.project_id == project_id && b.environment == environment)
        {
            self.reset();
        }
    }

    /// Prompt prefix for interactive callers, e.g. `(alpha/dev)`.
    pub fn prompt_prefix(&self, store: &ProjectStore) -> String {
        match &self.binding {
            Some(b) => match store.get(&b.project_id) {
                Some(p) => format!("({}/{})", p.display_name, b.environment),
                None => format!("({})", self.active_namespace),
            },
            None => format!("({})", self.active_namespace),
        }
    }
}
