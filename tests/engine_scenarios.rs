//! End-to-end scenarios: statements evaluated against a fresh engine and
//! the in-memory gateway, exercising the full parse/transform/execute
//! path including session binding side effects.

use kubesol::gateway::memory::{MemoryFileLoader, MemoryGateway};
use kubesol::{
    ClusterGateway, ConflictError, DependencyError, Engine, EngineConfig, EngineError, ExecOptions,
    NotFoundError, ObjectKind, Outcome,
};

struct Harness {
    engine: Engine,
    session: kubesol::ExecutionContext,
    gateway: MemoryGateway,
    loader: MemoryFileLoader,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

impl Harness {
    fn new() -> Self {
        init_tracing();
        let engine = Engine::new(EngineConfig::default()).expect("builtins compile");
        let session = engine.new_session();
        Self {
            engine,
            session,
            gateway: MemoryGateway::new(),
            loader: MemoryFileLoader::new(),
        }
    }

    fn eval(&mut self, text: &str) -> Result<Outcome, EngineError> {
        self.eval_opts(text, &ExecOptions::default())
    }

    fn eval_opts(&mut self, text: &str, options: &ExecOptions) -> Result<Outcome, EngineError> {
        self.engine.eval(
            text,
            &mut self.session,
            &mut self.gateway,
            &self.loader,
            options,
        )
    }

    fn eval_ok(&mut self, text: &str) -> Outcome {
        self.eval(text).unwrap_or_else(|e| panic!("{text}: {e}"))
    }

    fn switch_opts() -> ExecOptions {
        ExecOptions {
            switch_to_created: true,
            ..ExecOptions::default()
        }
    }

    fn create_and_use(&mut self, project: &str) {
        let opts = Self::switch_opts();
        self.eval_opts(&format!("CREATE PROJECT {project}"), &opts)
            .unwrap_or_else(|e| panic!("CREATE PROJECT {project}: {e}"));
    }

    fn prompt(&self) -> String {
        self.engine.prompt(&self.session)
    }
}

#[test]
fn create_project_switch_and_inspect() {
    let mut h = Harness::new();
    h.create_and_use("Alpha");

    // Display names canonicalize to lowercase; the default environment
    // comes from configuration.
    assert_eq!(h.prompt(), "(alpha/dev)");
    assert_eq!(h.gateway.object_count(ObjectKind::Namespace), 1);

    let outcome = h.eval_ok("GET THIS PROJECT");
    let data = outcome.data().unwrap();
    assert_eq!(data["display_name"], "alpha");
    assert_eq!(data["environment_count"], 1);
    assert_eq!(data["environments"][0]["name"], "dev");
}

#[test]
fn duplicate_project_name_is_case_insensitive_conflict() {
    let mut h = Harness::new();
    h.create_and_use("alpha");

    let err = h.eval("CREATE PROJECT ALPHA").unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictError::DuplicateDisplayName { .. })
    ));
    // Only the first project's namespace exists.
    assert_eq!(h.gateway.object_count(ObjectKind::Namespace), 1);
}

#[test]
fn environment_creation_and_promotion_chain() {
    let mut h = Harness::new();
    h.create_and_use("alpha");

    h.eval_ok("CREATE ENV staging FOR THIS PROJECT DEPENDS ON dev");
    h.eval_ok("CREATE ENV prod FOR THIS PROJECT DEPENDS ON staging");
    assert_eq!(h.gateway.object_count(ObjectKind::Namespace), 3);

    let outcome = h.eval_ok("GET THIS PROJECT");
    let data = outcome.data().unwrap();
    assert_eq!(data["environment_count"], 3);
    let envs = data["environments"].as_array().unwrap();
    let prod = envs.iter().find(|e| e["name"] == "prod").unwrap();
    assert_eq!(prod["depends_on"], "staging");
}

#[test]
fn dependency_cycle_is_rejected_with_edge_intact() {
    let mut h = Harness::new();
    h.create_and_use("alpha");
    h.eval_ok("CREATE ENV staging FOR THIS PROJECT DEPENDS ON dev");

    let err = h
        .eval("UPDATE ENV dev FOR THIS PROJECT DEPENDS ON staging")
        .unwrap_err();
    match err {
        EngineError::Dependency(DependencyError::Cycle { chain }) => {
            assert_eq!(chain, "dev -> staging -> dev");
        }
        other => panic!("expected cycle error, got {other}"),
    }

    // The pre-existing edge is untouched.
    let outcome = h.eval_ok("GET THIS PROJECT");
    let envs = outcome.data().unwrap()["environments"].clone();
    let staging = envs
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["name"] == "staging")
        .unwrap();
    assert_eq!(staging["depends_on"], "dev");
    let dev = envs
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["name"] == "dev")
        .unwrap();
    assert!(dev["depends_on"].is_null());
}

#[test]
fn duplicate_environment_name_is_a_conflict() {
    let mut h = Harness::new();
    h.create_and_use("alpha");
    h.eval_ok("CREATE ENV staging FOR THIS PROJECT");

    let err = h.eval("CREATE ENV staging FOR THIS PROJECT").unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictError::DuplicateEnvironment { .. })
    ));
    // Already-taken default name too: `dev` comes with the project.
    let err = h.eval("CREATE ENV dev FOR THIS PROJECT").unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    assert_eq!(h.gateway.object_count(ObjectKind::Namespace), 2);
}

#[test]
fn project_drop_completes_after_partial_namespace_cleanup() {
    let mut h = Harness::new();
    h.create_and_use("alpha");
    h.eval_ok("CREATE ENV staging FOR THIS PROJECT");

    // Simulate a drop attempt that deleted one namespace before failing:
    // the namespace is gone remotely but the project record remains.
    let dev_ns = h
        .gateway
        .list_objects(ObjectKind::Namespace, "")
        .unwrap()
        .into_iter()
        .find(|o| o.name.ends_with("-dev"))
        .expect("dev namespace exists")
        .name;
    h.gateway
        .delete_object(ObjectKind::Namespace, "", &dev_ns)
        .unwrap();

    // The retried drop tolerates the missing namespace and finishes.
    h.eval_opts("DROP PROJECT alpha", &ExecOptions::confirmed_with("alpha"))
        .unwrap();
    assert_eq!(h.gateway.object_count(ObjectKind::Namespace), 0);
    let err = h.eval("GET PROJECT alpha").unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[test]
fn depended_on_environment_cannot_be_dropped() {
    let mut h = Harness::new();
    h.create_and_use("alpha");
    h.eval_ok("CREATE ENV staging FOR THIS PROJECT DEPENDS ON dev");

    let err = h
        .eval_opts(
            "DROP ENV dev FOR THIS PROJECT",
            &ExecOptions::confirmed_with("yes"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Dependency(DependencyError::InUse { .. })
    ));
    assert_eq!(h.gateway.object_count(ObjectKind::Namespace), 2);
}

#[test]
fn unconfirmed_environment_drop_is_cancelled() {
    let mut h = Harness::new();
    h.create_and_use("alpha");
    h.eval_ok("CREATE ENV staging FOR THIS PROJECT");

    let outcome = h.eval("DROP ENV staging FOR THIS PROJECT").unwrap();
    assert!(matches!(outcome, Outcome::Cancelled { .. }));
    assert_eq!(h.gateway.object_count(ObjectKind::Namespace), 2);
}

#[test]
fn confirmed_drop_of_bound_environment_unbinds() {
    let mut h = Harness::new();
    h.create_and_use("alpha");
    // Bound to dev; drop it (nothing depends on it).
    h.eval_opts(
        "DROP ENV dev FOR PROJECT alpha",
        &ExecOptions::confirmed_with("YES"),
    )
    .unwrap();

    assert!(!h.session.is_bound());
    assert_eq!(h.prompt(), "(default)");
    assert_eq!(h.gateway.object_count(ObjectKind::Namespace), 0);
}

#[test]
fn rename_preserves_binding_and_namespaces() {
    let mut h = Harness::new();
    h.create_and_use("alpha");
    let ns_before: Vec<String> = h
        .gateway
        .list_objects(ObjectKind::Namespace, "")
        .map(|v| v.into_iter().map(|o| o.name).collect())
        .unwrap_or_default();

    h.eval_ok("UPDATE PROJECT alpha TO alpha-prime");

    // Still bound: the binding is by immutable id.
    assert!(h.session.is_bound());
    assert_eq!(h.prompt(), "(alpha-prime/dev)");

    let outcome = h.eval_ok("GET THIS PROJECT");
    assert_eq!(outcome.data().unwrap()["display_name"], "alpha-prime");

    // The old name no longer resolves.
    let err = h.eval("GET PROJECT alpha").unwrap_err();
    assert!(matches!(
        err,
        EngineError::NotFound(NotFoundError::Project { .. })
    ));

    // Namespaces derive from the id, not the display name.
    let ns_after: Vec<String> = h
        .gateway
        .list_objects(ObjectKind::Namespace, "")
        .map(|v| v.into_iter().map(|o| o.name).collect())
        .unwrap_or_default();
    assert_eq!(ns_before, ns_after);
}

#[test]
fn creating_without_switching_keeps_current_binding() {
    let mut h = Harness::new();
    h.create_and_use("alpha");

    h.eval_ok("CREATE PROJECT beta");
    assert_eq!(h.prompt(), "(alpha/dev)");

    let outcome = h.eval_ok("LIST PROJECTS");
    let items = outcome.data().unwrap()["items"].as_array().unwrap().clone();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["display_name"], "alpha");
    assert_eq!(items[1]["display_name"], "beta");
}

#[test]
fn use_unknown_project_leaves_context_unchanged() {
    let mut h = Harness::new();
    h.create_and_use("alpha");

    let err = h.eval("USE PROJECT ghost ENV dev").unwrap_err();
    assert!(matches!(
        err,
        EngineError::NotFound(NotFoundError::Project { .. })
    ));
    assert_eq!(h.prompt(), "(alpha/dev)");

    let err = h.eval("USE PROJECT alpha ENV missing").unwrap_err();
    assert!(matches!(
        err,
        EngineError::NotFound(NotFoundError::Environment { .. })
    ));
    assert_eq!(h.prompt(), "(alpha/dev)");
}

#[test]
fn use_switches_binding_between_projects() {
    let mut h = Harness::new();
    h.create_and_use("alpha");
    h.eval_ok("CREATE PROJECT beta");
    h.eval_ok("CREATE ENV staging FOR PROJECT beta");

    h.eval_ok("USE PROJECT beta ENV staging");
    assert_eq!(h.prompt(), "(beta/staging)");
}

#[test]
fn project_drop_requires_exact_display_name() {
    let mut h = Harness::new();
    h.create_and_use("alpha");
    h.eval_ok("CREATE ENV staging FOR THIS PROJECT");

    // Wrong or missing phrase: cancelled, nothing deleted.
    let outcome = h.eval("DROP PROJECT alpha").unwrap();
    assert!(matches!(outcome, Outcome::Cancelled { .. }));
    let outcome = h
        .eval_opts("DROP PROJECT alpha", &ExecOptions::confirmed_with("ALPHA"))
        .unwrap();
    assert!(matches!(outcome, Outcome::Cancelled { .. }));
    assert_eq!(h.gateway.object_count(ObjectKind::Namespace), 2);

    // Exact match deletes every environment namespace and unbinds.
    h.eval_opts("DROP PROJECT alpha", &ExecOptions::confirmed_with("alpha"))
        .unwrap();
    assert_eq!(h.gateway.object_count(ObjectKind::Namespace), 0);
    assert!(!h.session.is_bound());

    let err = h.eval("GET PROJECT alpha").unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[test]
fn resources_are_scoped_to_the_bound_namespace() {
    let mut h = Harness::new();
    h.create_and_use("alpha");
    h.eval_ok(r#"CREATE SECRET db-creds WITH user = "svc", password = "hunter2""#);
    h.eval_ok(r#"CREATE CONFIGMAP settings WITH retries = "3""#);

    h.create_and_use("beta");
    let outcome = h.eval_ok("LIST SECRETS");
    assert_eq!(
        outcome.data().unwrap()["items"].as_array().unwrap().len(),
        0
    );

    h.eval_ok("USE PROJECT alpha ENV dev");
    let outcome = h.eval_ok("LIST SECRETS");
    assert_eq!(
        outcome.data().unwrap()["items"].as_array().unwrap().len(),
        1
    );

    let outcome = h.eval_ok("GET CONFIGMAP settings");
    assert_eq!(outcome.data().unwrap()["data"]["retries"], "3");
}

#[test]
fn resource_update_merges_fields() {
    let mut h = Harness::new();
    h.eval_ok(r#"CREATE PARAMETER limits WITH cpu = "2", memory = "4Gi""#);
    h.eval_ok(r#"UPDATE PARAMETER limits WITH memory = "8Gi""#);

    let outcome = h.eval_ok("GET PARAMETER limits");
    let data = &outcome.data().unwrap()["data"];
    assert_eq!(data["cpu"], "2");
    assert_eq!(data["memory"], "8Gi");
}

#[test]
fn script_lifecycle_and_execution() {
    let mut h = Harness::new();
    h.loader
        .insert("jobs/etl.py", b"print('etl')".to_vec());
    h.create_and_use("alpha");

    h.eval_ok(r#"CREATE CONFIGMAP runtime-params WITH etl_mode = "full", other = "ignored""#);
    h.eval_ok(r#"CREATE SCRIPT etl TYPE python WITH code_from_file = "jobs/etl.py", description = "nightly""#);

    let outcome = h.eval_ok("LIST SCRIPTS");
    let items = outcome.data().unwrap()["items"].clone();
    assert_eq!(items.as_array().unwrap().len(), 1);
    assert_eq!(items[0], "etl");

    let outcome = h.eval_ok("GET SCRIPT etl");
    let spec = &outcome.data().unwrap()["spec"];
    assert_eq!(spec["code"], "print('etl')");
    assert_eq!(spec["scriptType"], "python");
    assert_eq!(spec["engine"], "k8s_job");

    h.eval_ok(
        r#"EXECUTE SCRIPT etl
           WITH PARAMS_FROM_CONFIGMAP runtime-params KEY_PREFIX "etl_"
           WITH ARGS (date = "2026-08-25", mode = "dry-run")
           WITH SECRET gcs-creds KEY "credentials.json" AS "/var/secrets/gcs.json""#,
    );

    let jobs = h.gateway.submitted_jobs();
    assert_eq!(jobs.len(), 1);
    let (_, spec) = &jobs[0];
    assert_eq!(spec.script_name, "etl");
    assert_eq!(spec.code, "print('etl')");
    // Prefix stripped, explicit args win, unprefixed keys dropped.
    assert_eq!(spec.params.get("mode").map(String::as_str), Some("dry-run"));
    assert_eq!(
        spec.params.get("date").map(String::as_str),
        Some("2026-08-25")
    );
    assert!(!spec.params.contains_key("other"));
    assert_eq!(
        spec.secret_mounts,
        vec![(
            "gcs-creds".to_string(),
            "credentials.json".to_string(),
            "/var/secrets/gcs.json".to_string()
        )]
    );
}

#[test]
fn script_validation_rejects_unknown_type_and_engine() {
    let mut h = Harness::new();
    let err = h
        .eval(r#"CREATE SCRIPT x TYPE cobol WITH code = "y""#)
        .unwrap_err();
    assert!(matches!(err, EngineError::Semantic(_)));

    let err = h
        .eval(r#"CREATE SCRIPT x TYPE python ENGINE warp WITH code = "y""#)
        .unwrap_err();
    assert!(matches!(err, EngineError::Semantic(_)));

    h.eval_ok(r#"CREATE SCRIPT x TYPE python WITH code = "y""#);
    let err = h
        .eval(r#"UPDATE SCRIPT x SET owner = "nobody""#)
        .unwrap_err();
    assert!(matches!(err, EngineError::Semantic(_)));
}

#[test]
fn script_update_via_set_fields() {
    let mut h = Harness::new();
    h.eval_ok(r#"CREATE SCRIPT etl TYPE python WITH code = "v1""#);
    h.eval_ok(r#"UPDATE SCRIPT etl SET code = "v2", engine = "spark_operator""#);

    let outcome = h.eval_ok("GET SCRIPT etl");
    let spec = &outcome.data().unwrap()["spec"];
    assert_eq!(spec["code"], "v2");
    assert_eq!(spec["engine"], "spark_operator");
    // Untouched keys survive the update.
    assert_eq!(spec["scriptType"], "python");
}

#[test]
fn missing_script_is_reported_by_script_name() {
    let mut h = Harness::new();
    let err = h.eval("EXECUTE SCRIPT ghost").unwrap_err();
    match err {
        EngineError::NotFound(NotFoundError::Resource { kind, name, .. }) => {
            assert_eq!(kind, "script");
            assert_eq!(name, "ghost");
        }
        other => panic!("expected script not-found, got {other}"),
    }
}

#[test]
fn this_project_without_binding_is_a_semantic_error() {
    let mut h = Harness::new();
    let err = h.eval("GET THIS PROJECT").unwrap_err();
    assert!(matches!(
        err,
        EngineError::Semantic(kubesol::SemanticError::NoProjectBound)
    ));

    let err = h.eval("CREATE ENV staging FOR THIS PROJECT").unwrap_err();
    assert!(matches!(err, EngineError::Semantic(_)));
}

#[test]
fn errors_leave_the_session_usable() {
    let mut h = Harness::new();
    h.create_and_use("alpha");

    assert!(h.eval("CREATE WIDGET w").is_err());
    assert!(h.eval("EXECUTE SECRET s").is_err());
    assert!(h.eval(r#"CREATE SECRET s WITH k = "unterminated"#).is_err());

    // The session and binding survive every failure class.
    assert_eq!(h.prompt(), "(alpha/dev)");
    h.eval_ok(r#"CREATE SECRET s WITH k = "v""#);
}
