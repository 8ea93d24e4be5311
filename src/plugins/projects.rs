//! Project and environment management, plus the session binding.
//!
//! Remote effects go through the gateway first and the local model is
//! committed only afterwards, so a gateway failure never leaves a
//! half-recorded project. Validation failures (conflicts, missing
//! referents, dependency cycles) are raised before any mutation at all.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::command::{Command, ProjectRef, ResourceKind, Verb};
use crate::context::{derive_namespace, Project};
use crate::error::{EngineError, NotFoundError, SemanticError};
use crate::executor::{HandlerCx, Outcome};
use crate::gateway::{GatewayError, ObjectKind};
use crate::grammar::{ClauseKind, GrammarFragment, StatementShape, TargetRule};
use crate::plugin::{CommandPlugin, Handler, HandlerTable};

use super::cluster;

/// Namespace labels recording which project/environment owns it.
pub const PROJECT_ID_LABEL: &str = "kubesol.io/project-id";
pub const ENVIRONMENT_LABEL: &str = "kubesol.io/environment";

fn target(cmd: &Command) -> &str {
    cmd.target_name.as_deref().unwrap_or_default()
}

/// Resolve the project a command addresses: `FOR PROJECT <name>` by
/// display name, `FOR THIS PROJECT` (or no clause at all) through the
/// session binding.
fn resolve_project_id(cx: &HandlerCx<'_>, cmd: &Command) -> Result<String, EngineError> {
    match cmd.project_ref() {
        Some(ProjectRef::Named(name)) => Ok(cx.projects.resolve_display(name)?.id.clone()),
        Some(ProjectRef::This) | None => cx
            .session
            .binding()
            .map(|b| b.project_id.clone())
            .ok_or_else(|| SemanticError::NoProjectBound.into()),
    }
}

fn namespace_labels(project_id: &str, environment: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(PROJECT_ID_LABEL.to_string(), project_id.to_string());
    labels.insert(ENVIRONMENT_LABEL.to_string(), environment.to_string());
    labels
}

fn project_json(cx: &HandlerCx<'_>, project: &Project) -> Value {
    let environments: Vec<Value> = project
        .environments()
        .map(|env| {
            json!({
                "name": env.name,
                "depends_on": env.depends_on,
                "namespace": derive_namespace(&cx.config.namespace_prefix, &project.id, &env.name),
                "created": env.created_at.to_rfc3339(),
            })
        })
        .collect();
    json!({
        "project_id": project.id,
        "display_name": project.display_name,
        "environment_count": project.environment_count(),
        "environments": environments,
    })
}

struct CreateProject;

impl Handler for CreateProject {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        cx.projects.ensure_display_free(name, None)?;

        let project = Project::new(name, &cx.config.default_environment);
        let default_env = cx.config.default_environment.clone();
        let namespace = derive_namespace(&cx.config.namespace_prefix, &project.id, &default_env);

        // Remote first; the local record is committed only on success.
        cx.gateway
            .create_object(
                ObjectKind::Namespace,
                "",
                &namespace,
                namespace_labels(&project.id, &default_env),
                json!({}),
            )
            .map_err(cluster)?;

        let id = project.id.clone();
        let display = project.display_name.clone();
        cx.projects.insert(project);

        let switched = cx.options.switch_to_created;
        if switched {
            cx.session.bind(&id, &default_env, &namespace);
        }
        Ok(Outcome::done(
            format!("project '{display}' (id {id}) created with environment '{default_env}'"),
            json!({
                "project_id": id,
                "display_name": display,
                "environment": default_env,
                "namespace": namespace,
                "switched": switched,
            }),
        ))
    }
}

struct CreateEnvironment;

impl Handler for CreateEnvironment {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        let project_id = resolve_project_id(cx, cmd)?;

        let env = cx
            .projects
            .validate_new_environment(&project_id, name, cmd.depends_on())?;
        let namespace = derive_namespace(&cx.config.namespace_prefix, &project_id, name);
        cx.gateway
            .create_object(
                ObjectKind::Namespace,
                "",
                &namespace,
                namespace_labels(&project_id, name),
                json!({}),
            )
            .map_err(cluster)?;
        let depends_on = env.depends_on.clone();
        cx.projects.commit_environment(&project_id, env);
        Ok(Outcome::done(
            format!("environment '{name}' created (namespace '{namespace}')"),
            json!({
                "project_id": project_id,
                "environment": name,
                "namespace": namespace,
                "depends_on": depends_on,
            }),
        ))
    }
}

struct UpdateEnvironment;

impl Handler for UpdateEnvironment {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        let project_id = resolve_project_id(cx, cmd)?;
        let depends_on = cmd.depends_on().ok_or(SemanticError::MissingField {
            verb: cmd.verb,
            kind: cmd.resource_kind,
            field: "DEPENDS ON".to_string(),
        })?;
        cx.projects.set_dependency(&project_id, name, depends_on)?;
        Ok(Outcome::done(
            format!("environment '{name}' now depends on '{depends_on}'"),
            json!({ "project_id": project_id, "environment": name, "depends_on": depends_on }),
        ))
    }
}

struct GetProject;

impl Handler for GetProject {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let project = match cmd.target_name.as_deref() {
            Some(name) => cx.projects.resolve_display(name)?,
            None => {
                let id = resolve_project_id(cx, cmd)?;
                cx.projects.get(&id).ok_or(NotFoundError::Project { name: id })?
            }
        };
        let data = project_json(cx, project);
        Ok(Outcome::done(
            format!("project '{}'", project.display_name),
            data,
        ))
    }
}

struct ListProjects;

impl Handler for ListProjects {
    fn execute(&self, cx: &mut HandlerCx<'_>, _cmd: &Command) -> Result<Outcome, EngineError> {
        let mut projects: Vec<&Project> = cx.projects.projects().collect();
        projects.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        let items: Vec<Value> = projects
            .iter()
            .map(|p| {
                json!({
                    "project_id": p.id,
                    "display_name": p.display_name,
                    "environment_count": p.environment_count(),
                    "environment_names": p.environment_names(),
                })
            })
            .collect();
        Ok(Outcome::done(
            format!("{} project(s)", items.len()),
            json!({ "items": items }),
        ))
    }
}

struct RenameProject;

impl Handler for RenameProject {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let old = target(cmd);
        let new = cmd.rename_to().ok_or(SemanticError::MissingField {
            verb: cmd.verb,
            kind: cmd.resource_kind,
            field: "TO <name>".to_string(),
        })?;
        // The session binds projects by id, so an active binding
        // survives the rename; only derived display text changes.
        let project = cx.projects.rename(old, new)?;
        Ok(Outcome::done(
            format!("project '{old}' renamed to '{}'", project.display_name),
            json!({ "project_id": project.id, "display_name": project.display_name }),
        ))
    }
}

struct DropProject;

impl Handler for DropProject {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        let project = cx.projects.resolve_display(name)?;
        let id = project.id.clone();
        let display = project.display_name.clone();
        let namespaces: Vec<String> = project
            .environments()
            .map(|env| derive_namespace(&cx.config.namespace_prefix, &id, &env.name))
            .collect();

        // An already-absent namespace is fine here: a previous drop
        // attempt may have deleted it before failing, and the retry must
        // still be able to finish the cleanup. Other gateway failures
        // stop the drop with the local record intact.
        for namespace in &namespaces {
            match cx.gateway.delete_object(ObjectKind::Namespace, "", namespace) {
                Ok(()) | Err(GatewayError::NotFound { .. }) => {}
                Err(other) => return Err(cluster(other)),
            }
        }
        cx.projects.remove_project(&id);
        cx.session.on_project_dropped(&id);
        Ok(Outcome::done(
            format!(
                "project '{display}' and its {} environment(s) deleted",
                namespaces.len()
            ),
            json!({ "project_id": id, "display_name": display, "namespaces": namespaces }),
        ))
    }
}

struct DropEnvironment;

impl Handler for DropEnvironment {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        let project_id = resolve_project_id(cx, cmd)?;
        cx.projects.validate_drop_environment(&project_id, name)?;

        let namespace = derive_namespace(&cx.config.namespace_prefix, &project_id, name);
        cx.gateway
            .delete_object(ObjectKind::Namespace, "", &namespace)
            .map_err(cluster)?;
        cx.projects.remove_environment(&project_id, name);
        cx.session.on_environment_dropped(&project_id, name);
        Ok(Outcome::done(
            format!("environment '{name}' (namespace '{namespace}') deleted"),
            json!({ "project_id": project_id, "environment": name, "namespace": namespace }),
        ))
    }
}

struct UseEnvironment;

impl Handler for UseEnvironment {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let env_name = target(cmd);
        let project_name = match cmd.project_ref() {
            Some(ProjectRef::Named(name)) => name.as_str(),
            _ => return Err(SemanticError::NoProjectBound.into()),
        };
        // Validate fully before touching the session: a miss leaves the
        // context unchanged.
        let project = cx.projects.resolve_display(project_name)?;
        if project.environment(env_name).is_none() {
            return Err(NotFoundError::Environment {
                project: project.display_name.clone(),
                name: env_name.to_string(),
            }
            .into());
        }
        let id = project.id.clone();
        let display = project.display_name.clone();
        let namespace = derive_namespace(&cx.config.namespace_prefix, &id, env_name);
        cx.session.bind(&id, env_name, &namespace);
        Ok(Outcome::done(
            format!("context set to project '{display}', environment '{env_name}'"),
            json!({ "project_id": id, "display_name": display, "environment": env_name, "namespace": namespace }),
        ))
    }
}

pub struct ProjectsPlugin;

impl CommandPlugin for ProjectsPlugin {
    fn name(&self) -> &'static str {
        "projects"
    }

    fn fragment(&self) -> GrammarFragment {
        GrammarFragment::new()
            .rule("create_project_command", "CREATE PROJECT NAME")
            .rule(
                "create_env_command",
                "CREATE ENV NAME [project_target] [DEPENDS ON NAME]",
            )
            .rule(
                "update_env_command",
                "UPDATE ENV NAME [project_target] DEPENDS ON NAME",
            )
            .rule("get_project_command", "GET (PROJECT NAME | THIS PROJECT)")
            .rule("list_projects_command", "LIST PROJECTS")
            .rule("update_project_command", "UPDATE PROJECT NAME TO NAME")
            .rule("drop_project_command", "DROP PROJECT NAME")
            .rule("drop_env_command", "DROP ENV NAME [project_target]")
            .rule("use_project_env_command", "USE PROJECT NAME ENV NAME")
            .shape(StatementShape::new(
                Verb::Create,
                ResourceKind::Project,
                TargetRule::Required,
            ))
            .shape(
                StatementShape::new(Verb::Create, ResourceKind::Environment, TargetRule::Required)
                    .allow(ClauseKind::ForProject)
                    .allow(ClauseKind::DependsOn),
            )
            .shape(
                StatementShape::new(Verb::Update, ResourceKind::Environment, TargetRule::Required)
                    .allow(ClauseKind::ForProject)
                    .allow(ClauseKind::DependsOn),
            )
            .shape(StatementShape::new(
                Verb::Get,
                ResourceKind::Project,
                TargetRule::Optional,
            ))
            .shape(StatementShape::new(
                Verb::List,
                ResourceKind::Project,
                TargetRule::None,
            ))
            .shape(
                StatementShape::new(Verb::Update, ResourceKind::Project, TargetRule::Required)
                    .allow(ClauseKind::RenameTo),
            )
            .shape(StatementShape::new(
                Verb::Drop,
                ResourceKind::Project,
                TargetRule::Required,
            ))
            .shape(
                StatementShape::new(Verb::Drop, ResourceKind::Environment, TargetRule::Required)
                    .allow(ClauseKind::ForProject),
            )
            .shape(
                StatementShape::new(Verb::Use, ResourceKind::Project, TargetRule::Required)
                    .allow(ClauseKind::UseEnv),
            )
    }

    fn handlers(&self) -> HandlerTable {
        vec![
            (
                (Verb::Create, ResourceKind::Project),
                Arc::new(CreateProject) as Arc<dyn Handler>,
            ),
            (
                (Verb::Create, ResourceKind::Environment),
                Arc::new(CreateEnvironment) as Arc<dyn Handler>,
            ),
            (
                (Verb::Update, ResourceKind::Environment),
                Arc::new(UpdateEnvironment) as Arc<dyn Handler>,
            ),
            (
                (Verb::Get, ResourceKind::Project),
                Arc::new(GetProject) as Arc<dyn Handler>,
            ),
            (
                (Verb::List, ResourceKind::Project),
                Arc::new(ListProjects) as Arc<dyn Handler>,
            ),
            (
                (Verb::Update, ResourceKind::Project),
                Arc::new(RenameProject) as Arc<dyn Handler>,
            ),
            (
                (Verb::Drop, ResourceKind::Project),
                Arc::new(DropProject) as Arc<dyn Handler>,
            ),
            (
                (Verb::Drop, ResourceKind::Environment),
                Arc::new(DropEnvironment) as Arc<dyn Handler>,
            ),
            (
                (Verb::Use, ResourceKind::Environment),
                Arc::new(UseEnvironment) as Arc<dyn Handler>,
            ),
        ]
    }
}
