//! Standard resource commands: SECRET, CONFIGMAP, PARAMETER.
//!
//! CREATE/UPDATE take a WITH field list that becomes the object payload;
//! UPDATE merges over the existing payload; GET/LIST/DELETE are direct
//! gateway calls scoped to the active namespace.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::command::{Command, ResourceKind, Verb};
use crate::error::{EngineError, SemanticError};
use crate::executor::{HandlerCx, Outcome};
use crate::gateway::ObjectKind;
use crate::grammar::{ClauseKind, GrammarFragment, StatementShape, TargetRule};
use crate::plugin::{CommandPlugin, Handler, HandlerTable};

use super::{cluster, fields_to_object, map_gateway};

const RESOURCE_KINDS: [ResourceKind; 3] = [
    ResourceKind::Secret,
    ResourceKind::ConfigMap,
    ResourceKind::Parameter,
];

fn object_kind(kind: ResourceKind) -> ObjectKind {
    match kind {
        ResourceKind::Secret => ObjectKind::Secret,
        ResourceKind::ConfigMap => ObjectKind::ConfigMap,
        ResourceKind::Parameter => ObjectKind::Parameter,
        other => unreachable!("resources plugin invoked for {other}"),
    }
}

fn target(cmd: &Command) -> &str {
    cmd.target_name.as_deref().unwrap_or_default()
}

fn require_fields(cmd: &Command) -> Result<(), EngineError> {
    if cmd.fields.is_empty() {
        return Err(SemanticError::MissingField {
            verb: cmd.verb,
            kind: cmd.resource_kind,
            field: "WITH <fields>".to_string(),
        }
        .into());
    }
    Ok(())
}

struct CreateResource;

impl Handler for CreateResource {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        require_fields(cmd)?;
        let name = target(cmd);
        let payload = Value::Object(fields_to_object(cmd));
        let obj = cx
            .gateway
            .create_object(
                object_kind(cmd.resource_kind),
                &cx.namespace,
                name,
                BTreeMap::new(),
                payload,
            )
            .map_err(cluster)?;
        Ok(Outcome::done(
            format!(
                "{} '{}' created in namespace '{}'",
                cmd.resource_kind, obj.name, obj.namespace
            ),
            json!({ "name": obj.name, "namespace": obj.namespace }),
        ))
    }
}

struct UpdateResource;

impl Handler for UpdateResource {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        require_fields(cmd)?;
        let name = target(cmd);
        let kind = object_kind(cmd.resource_kind);
        let existing = cx
            .gateway
            .get_object(kind, &cx.namespace, name)
            .map_err(map_gateway)?;

        // Merge: updated fields overwrite, untouched keys survive.
        let mut merged = existing
            .payload
            .as_object()
            .cloned()
            .unwrap_or_default();
        for (key, value) in fields_to_object(cmd) {
            merged.insert(key, value);
        }
        let obj = cx
            .gateway
            .update_object(kind, &cx.namespace, name, Value::Object(merged))
            .map_err(cluster)?;
        Ok(Outcome::done(
            format!("{} '{}' updated", cmd.resource_kind, obj.name),
            json!({ "name": obj.name, "namespace": obj.namespace }),
        ))
    }
}

struct DeleteResource;

impl Handler for DeleteResource {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        cx.gateway
            .delete_object(object_kind(cmd.resource_kind), &cx.namespace, name)
            .map_err(map_gateway)?;
        Ok(Outcome::done(
            format!("{} '{}' deleted", cmd.resource_kind, name),
            json!({ "name": name }),
        ))
    }
}

struct GetResource;

impl Handler for GetResource {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let name = target(cmd);
        let obj = cx
            .gateway
            .get_object(object_kind(cmd.resource_kind), &cx.namespace, name)
            .map_err(map_gateway)?;
        Ok(Outcome::done(
            format!("{} '{}'", cmd.resource_kind, obj.name),
            json!({ "name": obj.name, "namespace": obj.namespace, "data": obj.payload }),
        ))
    }
}

struct ListResources;

impl Handler for ListResources {
    fn execute(&self, cx: &mut HandlerCx<'_>, cmd: &Command) -> Result<Outcome, EngineError> {
        let objects = cx
            .gateway
            .list_objects(object_kind(cmd.resource_kind), &cx.namespace)
            .map_err(cluster)?;
        let names: Vec<Value> = objects
            .iter()
            .map(|o| Value::String(o.name.clone()))
            .collect();
        Ok(Outcome::done(
            format!(
                "{} {}(s) in namespace '{}'",
                names.len(),
                cmd.resource_kind,
                cx.namespace
            ),
            json!({ "namespace": cx.namespace, "items": names }),
        ))
    }
}

pub struct ResourcesPlugin;

impl CommandPlugin for ResourcesPlugin {
    fn name(&self) -> &'static str {
        "resources"
    }

    fn fragment(&self) -> GrammarFragment {
        let mut fragment = GrammarFragment::new()
            .rule(
                "create_resource_command",
                "CREATE resource_kind NAME WITH fields",
            )
            .rule(
                "update_resource_command",
                "UPDATE resource_kind NAME WITH fields",
            )
            .rule("delete_resource_command", "DELETE resource_kind NAME")
            .rule("get_resource_command", "GET resource_kind NAME")
            .rule("list_resources_command", "LIST resource_kind");
        for kind in RESOURCE_KINDS {
            fragment = fragment
                .shape(
                    StatementShape::new(Verb::Create, kind, TargetRule::Required)
                        .allow(ClauseKind::WithFields),
                )
                .shape(
                    StatementShape::new(Verb::Update, kind, TargetRule::Required)
                        .allow(ClauseKind::WithFields),
                )
                .shape(StatementShape::new(Verb::Delete, kind, TargetRule::Required))
                .shape(StatementShape::new(Verb::Get, kind, TargetRule::Required))
                .shape(StatementShape::new(Verb::List, kind, TargetRule::None));
        }
        fragment
    }

    fn handlers(&self) -> HandlerTable {
        let mut table: HandlerTable = Vec::new();
        for kind in RESOURCE_KINDS {
            table.push(((Verb::Create, kind), Arc::new(CreateResource) as Arc<dyn Handler>));
            table.push(((Verb::Update, kind), Arc::new(UpdateResource) as Arc<dyn Handler>));
            table.push(((Verb::Delete, kind), Arc::new(DeleteResource) as Arc<dyn Handler>));
            table.push(((Verb::Get, kind), Arc::new(GetResource) as Arc<dyn Handler>));
            table.push(((Verb::List, kind), Arc::new(ListResources) as Arc<dyn Handler>));
        }
        table
    }
}
