//! Script lifecycle and execution.
//!
//! Scripts are stored as configmaps named `kubesol-script-<name>` with a
//! `kubesol-role: script` label. EXECUTE merges parameters from an
//! optional configmap clause (prefix-filtered, prefix stripped) with
//! explicit WITH ARGS values — explicit args win — and submits a
//! `JobSpec` through the gateway.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::command::{Clause, Command, ResourceKind, Verb};
use crate::error::{EngineError, NotFoundError, SemanticError};
use crate::executor::{HandlerCx, Outcome};
use crate::gateway::{JobSpec, ObjectKind};
use crate::grammar::{ClauseKind, GrammarFragment, StatementShape, TargetRule};
use crate::plugin::{CommandPlugin, Handler, HandlerTable};

use super::{cluster, map_gateway};

/// Configmap name prefix for stored scripts.
pub const SCRIPT_CM_PREFIX: &str = "kubesol-script-";
/// Role label marking script configmaps.
pub const SCRIPT_ROLE_LABEL: &str = "kubesol-role";
pub const SCRIPT_ROLE_VALUE: &str = "script";

// Payload keys of a script configmap.
const KEY_CODE: &str = "code";
const KEY_TYPE: &str = "scriptType";
const KEY_ENGINE: &str = "engine";
const KEY_PARAMS_SPEC: &str = "paramsSpec";
const KEY_DESCRIPTION: &str = "description";

const SCRIPT_TYPES: [&str; 3] = ["python", "pyspark", "sql_spark"];
const SCRIPT_ENGINES: [&str; 2] = ["k8s_job", "spark_operator"];
const DEFAULT_ENGINE: &str = "k8s_job";

fn cm_name(script: &str) -> String {
    format!("{SCRIPT_CM_PREFIX}{script}")
}

fn target(cmd: &Command) -> &str {
    cmd.target_name.as_deref().unwrap_or_default()
}

fn require_field<'c>(cmd: &'c Command, key: &str) -> Result<&'c str, EngineError> {
    cmd.field(key).map(|v| v.as_str()).ok_or_else(|| {
        SemanticError::MissingField {
            verb: cmd.verb,
            kind: cmd.resource_kind,
            field: key.to_string(),
        }
        .into()
    })
}

fn validate_one_of(what: &str, value: &str, allowed: &[&str]) -> Result<(), EngineError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(SemanticError::InvalidValue {
            what: what.to_string(),
            value: value.to_string(),
        }
        .into())
    }
}

/// Fetch a script configmap, reporting a missing script by its script
/// name rather than the configmap name.
fn fetch_script(cx: &HandlerCx<'_>, script: &str) -> Result<Map<String, Value>, EngineError> {
    let obj = cx
        .gateway
        .get_object(ObjectKind::ConfigMap, &cx.namespace, &cm_name(script))
        .map_err(|e| match e {
            crate::gateway::GatewayError::NotFound { .. } => NotFoundError::Resource {
                kind: "script".to_string(),
                name: script.to_string(),
                namespace: cx.namespace.clone(),
            }
            .into(),
            other => cluster(other),
        })?;
    Ok(obj.payload.as_object().cloned().unwrap_or_default())
}

struct CreateScript;

impl Handler for CreateScript {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        let code = require_field(cmd, KEY_CODE)?;
        let script_type = require_field(cmd, "type")?;
        validate_one_of("script type", script_type, &SCRIPT_TYPES)?;
        let engine = cmd
            .field(KEY_ENGINE)
            .map(|v| v.as_str())
            .unwrap_or(DEFAULT_ENGINE);
        validate_one_of("script engine", engine, &SCRIPT_ENGINES)?;

        let mut payload = Map::new();
        payload.insert(KEY_CODE.into(), json!(code));
        payload.insert(KEY_TYPE.into(), json!(script_type));
        payload.insert(KEY_ENGINE.into(), json!(engine));
        if let Some(spec) = cmd.field("params_spec") {
            payload.insert(KEY_PARAMS_SPEC.into(), json!(spec.as_str()));
        }
        if let Some(desc) = cmd.field(KEY_DESCRIPTION) {
            payload.insert(KEY_DESCRIPTION.into(), json!(desc.as_str()));
        }

        let mut labels = BTreeMap::new();
        labels.insert(SCRIPT_ROLE_LABEL.to_string(), SCRIPT_ROLE_VALUE.to_string());
        cx.gateway
            .create_object(
                ObjectKind::ConfigMap,
                &cx.namespace,
                &cm_name(name),
                labels,
                Value::Object(payload),
            )
            .map_err(cluster)?;
        Ok(Outcome::done(
            format!("script '{name}' created in namespace '{}'", cx.namespace),
            json!({ "name": name, "type": script_type, "engine": engine }),
        ))
    }
}

struct UpdateScript;

impl Handler for UpdateScript {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        let mut payload = fetch_script(cx, name)?;
        if cmd.fields.is_empty() {
            return Err(SemanticError::MissingField {
                verb: cmd.verb,
                kind: cmd.resource_kind,
                field: "SET <fields>".to_string(),
            }
            .into());
        }
        for field in &cmd.fields {
            let value = field.value.as_str();
            match field.key.as_str() {
                "code" => {
                    payload.insert(KEY_CODE.into(), json!(value));
                }
                "params_spec" => {
                    payload.insert(KEY_PARAMS_SPEC.into(), json!(value));
                }
                "description" => {
                    payload.insert(KEY_DESCRIPTION.into(), json!(value));
                }
                "engine" => {
                    validate_one_of("script engine", value, &SCRIPT_ENGINES)?;
                    payload.insert(KEY_ENGINE.into(), json!(value));
                }
                other => {
                    return Err(SemanticError::InvalidValue {
                        what: "SET field".to_string(),
                        value: other.to_string(),
                    }
                    .into())
                }
            }
        }
        cx.gateway
            .update_object(
                ObjectKind::ConfigMap,
                &cx.namespace,
                &cm_name(name),
                Value::Object(payload),
            )
            .map_err(cluster)?;
        Ok(Outcome::done(
            format!("script '{name}' updated"),
            json!({ "name": name }),
        ))
    }
}

struct DeleteScript;

impl Handler for DeleteScript {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        cx.gateway
            .delete_object(ObjectKind::ConfigMap, &cx.namespace, &cm_name(name))
            .map_err(|e| match e {
                crate::gateway::GatewayError::NotFound { .. } => NotFoundError::Resource {
                    kind: "script".to_string(),
                    name: name.to_string(),
                    namespace: cx.namespace.clone(),
                }
                .into(),
                other => cluster(other),
            })?;
        Ok(Outcome::done(
            format!("script '{name}' deleted"),
            json!({ "name": name }),
        ))
    }
}

struct GetScript;

impl Handler for GetScript {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        let payload = fetch_script(cx, name)?;
        Ok(Outcome::done(
            format!("script '{name}'"),
            json!({ "name": name, "spec": Value::Object(payload) }),
        ))
    }
}

struct ListScripts;

impl Handler for ListScripts {
    fn execute(&self, cx: &mut HandlerCx<'_>, _cmd: &Command) -> Result<Outcome, EngineError> {
        let objects = cx
            .gateway
            .list_objects(ObjectKind::ConfigMap, &cx.namespace)
            .map_err(cluster)?;
        let scripts: Vec<Value> = objects
            .iter()
            .filter(|o| o.labels.get(SCRIPT_ROLE_LABEL).map(String::as_str) == Some(SCRIPT_ROLE_VALUE))
            .filter_map(|o| o.name.strip_prefix(SCRIPT_CM_PREFIX))
            .map(|name| Value::String(name.to_string()))
            .collect();
        Ok(Outcome::done(
            format!("{} script(s) in namespace '{}'", scripts.len(), cx.namespace),
            json!({ "namespace": cx.namespace, "items": scripts }),
        ))
    }
}

struct ExecuteScript;

impl Handler for ExecuteScript {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        let script = fetch_script(cx, name)?;
        let str_of = |key: &str| {
            script
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        // Configmap-sourced params first, explicit args override.
        let mut params: BTreeMap<String, String> = BTreeMap::new();
        for clause in &cmd.clauses {
            if let Clause::ParamsFromConfigMap { name, key_prefix } = clause {
                let cm = cx
                    .gateway
                    .get_object(ObjectKind::ConfigMap, &cx.namespace, name)
                    .map_err(map_gateway)?;
                if let Some(entries) = cm.payload.as_object() {
                    for (key, value) in entries {
                        let key = match key_prefix {
                            Some(prefix) => match key.strip_prefix(prefix.as_str()) {
                                Some(stripped) => stripped,
                                None => continue,
                            },
                            None => key.as_str(),
                        };
                        if let Some(s) = value.as_str() {
                            params.insert(key.to_string(), s.to_string());
                        }
                    }
                }
            }
        }
        let mut secret_mounts = Vec::new();
        for clause in &cmd.clauses {
            match clause {
                Clause::ArgSet(args) => {
                    for field in args {
                        params.insert(field.key.clone(), field.value.as_str().to_string());
                    }
                }
                Clause::SecretMount {
                    secret,
                    key,
                    mount_path,
                } => secret_mounts.push((secret.clone(), key.clone(), mount_path.clone())),
                _ => {}
            }
        }

        let spec = JobSpec {
            script_name: name.to_string(),
            script_type: str_of(KEY_TYPE),
            engine: str_of(KEY_ENGINE),
            code: str_of(KEY_CODE),
            params,
            secret_mounts,
        };
        let job_id = cx.gateway.submit_job(&cx.namespace, spec).map_err(cluster)?;
        Ok(Outcome::done(
            format!("script '{name}' submitted as job '{job_id}'"),
            json!({ "script": name, "job_id": job_id, "namespace": cx.namespace }),
        ))
    }
}

pub struct ScriptsPlugin;

impl CommandPlugin for ScriptsPlugin {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn fragment(&self) -> GrammarFragment {
        GrammarFragment::new()
            .rule(
                "create_script_command",
                "CREATE SCRIPT NAME TYPE script_type [ENGINE script_engine] WITH fields",
            )
            .rule("update_script_command", "UPDATE SCRIPT NAME SET fields")
            .rule("delete_script_command", "DELETE SCRIPT NAME")
            .rule("get_script_command", "GET SCRIPT NAME")
            .rule("list_scripts_command", "LIST SCRIPTS")
            .rule(
                "execute_script_command",
                "EXECUTE SCRIPT NAME [with_args] [with_params_cm] (secret_mount)*",
            )
            .shape(
                StatementShape::new(Verb::Create, ResourceKind::Script, TargetRule::Required)
                    .allow(ClauseKind::WithFields)
                    .allow(ClauseKind::TypeValue)
                    .allow(ClauseKind::EngineValue),
            )
            .shape(
                StatementShape::new(Verb::Update, ResourceKind::Script, TargetRule::Required)
                    .allow(ClauseKind::SetFields),
            )
            .shape(StatementShape::new(
                Verb::Delete,
                ResourceKind::Script,
                TargetRule::Required,
            ))
            .shape(StatementShape::new(
                Verb::Get,
                ResourceKind::Script,
                TargetRule::Required,
            ))
            .shape(StatementShape::new(
                Verb::List,
                ResourceKind::Script,
                TargetRule::None,
            ))
            .shape(
                StatementShape::new(Verb::Execute, ResourceKind::Script, TargetRule::Required)
                    .allow(ClauseKind::Args)
                    .allow(ClauseKind::ParamsFromConfigMap)
                    .allow(ClauseKind::SecretMount),
            )
    }

    fn handlers(&self) -> HandlerTable {
        vec![
            (
                (Verb::Create, ResourceKind::Script),
                Arc::new(CreateScript) as Arc<dyn Handler>,
            ),
            (
                (Verb::Update, ResourceKind::Script),
                Arc::new(UpdateScript) as Arc<dyn Handler>,
            ),
            (
                (Verb::Delete, ResourceKind::Script),
                Arc::new(DeleteScript) as Arc<dyn Handler>,
            ),
            (
                (Verb::Get, ResourceKind::Script),
                Arc::new(GetScript) as Arc<dyn Handler>,
            ),
            (
                (Verb::List, ResourceKind::Script),
                Arc::new(ListScripts) as Arc<dyn Handler>,
            ),
            (
                (Verb::Execute, ResourceKind::Script),
                Arc::new(ExecuteScript) as Arc<dyn Handler>,
            ),
        ]
    }
}
