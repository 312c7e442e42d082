//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "tests"
//! mig_type: "source"
//! mig_scope: "test"
//! mig_description: "Reconciliation behaviour against an in-memory store."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use rolemig_common::{MigrationConfig, ScopeKind};
use rolemig_core::{
    migrate, MigrationError, RoleOutcome, RunOptions, ScopeMigrator, ScopeSettings, SkipReason,
};
use rolemig_store::{
    MemoryStore, ResourcePath, ResourceStore, Role, RoleBinding, StoreOpKind, StoreResult,
    TypedStore,
};
use serde_json::{json, Value};

const AGG: &str = "iam.kubesphere.io/aggregation-roles";
const TEMPLATE: &str = "iam.kubesphere.io/role-template";
const WORKSPACE: &str = "kubesphere.io/workspace";
const CREATOR: &str = "kubesphere.io/creator";

fn template(name: &str, verbs: &[&str], resource: &str) -> Value {
    json!({
        "metadata": {"name": name, "labels": {TEMPLATE: "true"}},
        "rules": [{"verbs": verbs, "apiGroups": [""], "resources": [resource]}]
    })
}

fn custom(name: &str, refs: &str) -> Value {
    json!({
        "metadata": {"name": name, "annotations": {AGG: refs, CREATOR: "alice"}},
        "rules": [{"verbs": ["*"], "apiGroups": ["*"], "resources": ["*"]}]
    })
}

fn global_fixture(config: &MigrationConfig) -> (MemoryStore, ResourcePath) {
    let path = config.api.roles(ScopeKind::Global, None);
    let store = MemoryStore::new();
    store.insert(&path, template("t1", &["get"], "pods")).unwrap();
    store.insert(&path, template("t2", &["list"], "services")).unwrap();
    store
        .insert(&path, custom("r1", r#"["t1","role-template-manage-users","t2"]"#))
        .unwrap();
    store.insert(&path, custom("r2", r#"["t1"]"#)).unwrap();
    (store, path)
}

#[test]
fn r1_is_trimmed_and_r2_is_untouched() {
    let config = MigrationConfig::default();
    let (store, path) = global_fixture(&config);
    let report = migrate(&store, &config, RunOptions::default()).unwrap();

    let global = report.scope(ScopeKind::Global).unwrap();
    assert_eq!(
        global.record("r1", None).unwrap().outcome,
        RoleOutcome::Recreated {
            removed: 1,
            kept: vec!["t1".into(), "t2".into()],
            missing_templates: vec![],
        }
    );
    assert_eq!(
        global.record("r2", None).unwrap().outcome,
        RoleOutcome::Skipped {
            reason: SkipReason::Unchanged
        }
    );

    let r1: Role = store.get_as(&path, "r1").unwrap();
    assert_eq!(r1.metadata.annotation(AGG), Some(r#"["t1","t2"]"#));
    assert_eq!(r1.metadata.annotation(CREATOR), Some("alice"));
    assert_eq!(r1.rules.len(), 2);
    assert_eq!(r1.rules[0].verbs, vec!["get"]);
    assert_eq!(r1.rules[1].verbs, vec!["list"]);

    let r2: Role = store.get_as(&path, "r2").unwrap();
    assert_eq!(r2.rules[0].verbs, vec!["*"]);

    let touched: Vec<_> = store
        .journal()
        .into_iter()
        .filter(|op| op.path == path.to_string())
        .map(|op| (op.kind, op.name))
        .collect();
    assert_eq!(
        touched,
        vec![
            (StoreOpKind::Delete, "r1".to_owned()),
            (StoreOpKind::Create, "r1".to_owned()),
        ]
    );
}

#[test]
fn second_run_writes_nothing() {
    let config = MigrationConfig::default();
    let (store, _) = global_fixture(&config);
    migrate(&store, &config, RunOptions::default()).unwrap();
    store.clear_journal();

    let report = migrate(&store, &config, RunOptions::default()).unwrap();
    assert_eq!(report.recreated(), 0);
    assert_eq!(store.write_count(), 0);
}

#[test]
fn non_custom_roles_cause_no_writes() {
    let config = MigrationConfig::default();
    let store = MemoryStore::new();
    let global = config.api.roles(ScopeKind::Global, None);
    let workspace = config.api.roles(ScopeKind::Workspace, None);
    let dev = config.api.roles(ScopeKind::Namespaced, Some("dev"));

    // builtin, template, and unannotated roles all carry a deprecated reference
    let deprecated = r#"["role-template-manage-roles"]"#;
    store.insert(&global, custom("platform-admin", deprecated)).unwrap();
    let mut tpl = custom("role-template-x", deprecated);
    tpl["metadata"]["labels"] = json!({TEMPLATE: "true"});
    store.insert(&global, tpl).unwrap();
    store
        .insert(&global, json!({"metadata": {"name": "plain"}, "rules": []}))
        .unwrap();
    store.insert(&workspace, custom("team-a-admin", deprecated)).unwrap();
    store.insert(&dev, custom("viewer", deprecated)).unwrap();

    let report = migrate(&store, &config, RunOptions::default()).unwrap();
    assert_eq!(report.recreated(), 0);
    for scope in &report.scopes {
        assert_eq!(scope.skipped(SkipReason::NotCustom), scope.records.len());
    }
    assert_eq!(store.write_count(), 0);
}

#[test]
fn workspace_roles_keep_only_the_workspace_label() {
    let config = MigrationConfig::default();
    let store = MemoryStore::new();
    let path = config.api.roles(ScopeKind::Workspace, None);
    store
        .insert(&path, template("role-template-view-projects", &["get"], "namespaces"))
        .unwrap();
    let mut role = custom(
        "team-a-auditor",
        r#"["role-template-view-projects","role-template-manage-groups"]"#,
    );
    role["metadata"]["labels"] = json!({WORKSPACE: "team-a", "extra": "x"});
    store.insert(&path, role).unwrap();

    migrate(&store, &config, RunOptions::default()).unwrap();
    let rebuilt: Role = store.get_as(&path, "team-a-auditor").unwrap();
    assert_eq!(rebuilt.metadata.labels.len(), 1);
    assert_eq!(rebuilt.metadata.label(WORKSPACE), Some("team-a"));
    assert_eq!(rebuilt.kind, "WorkspaceRole");
    assert_eq!(rebuilt.api_version, "iam.kubesphere.io/v1alpha2");
}

#[test]
fn missing_template_degrades_to_fewer_rules() {
    let config = MigrationConfig::default();
    let store = MemoryStore::new();
    let dev = config.api.roles(ScopeKind::Namespaced, Some("dev"));
    store.insert(&dev, template("view-pods", &["get"], "pods")).unwrap();
    store
        .insert(
            &dev,
            custom("ops", r#"["view-pods","ghost","role-template-manage-members"]"#),
        )
        .unwrap();

    let report = migrate(&store, &config, RunOptions::default()).unwrap();
    let record = report
        .scope(ScopeKind::Namespaced)
        .and_then(|s| s.record("ops", Some("dev")))
        .unwrap();
    assert_eq!(
        record.outcome,
        RoleOutcome::Recreated {
            removed: 1,
            kept: vec!["view-pods".into(), "ghost".into()],
            missing_templates: vec!["ghost".into()],
        }
    );
    let rebuilt: Role = store.get_as(&dev, "ops").unwrap();
    assert_eq!(rebuilt.metadata.annotation(AGG), Some(r#"["view-pods","ghost"]"#));
    assert_eq!(rebuilt.rules.len(), 1);
}

#[test]
fn template_read_failure_aborts_before_any_role_write() {
    let config = MigrationConfig::default();
    let (store, path) = global_fixture(&config);
    store.fail_next(StoreOpKind::Get, Some("t2"), "etcd leader lost");

    let err = migrate(&store, &config, RunOptions::default()).unwrap_err();
    assert!(matches!(err, MigrationError::Store(_)));
    assert!(err.to_string().contains("etcd leader lost"));
    let r1: Role = store.get_as(&path, "r1").unwrap();
    assert_eq!(
        r1.metadata.annotation(AGG),
        Some(r#"["t1","role-template-manage-users","t2"]"#)
    );
}

#[test]
fn undecodable_annotation_aborts_the_scope() {
    let config = MigrationConfig::default();
    let store = MemoryStore::new();
    let path = config.api.roles(ScopeKind::Global, None);
    store.insert(&path, custom("broken", "{not-a-list}")).unwrap();
    store
        .insert(&path, custom("later", r#"["role-template-manage-users"]"#))
        .unwrap();

    let settings = ScopeSettings::from_config(&config, ScopeKind::Global);
    let err = ScopeMigrator::new(&store, settings, &config.keys)
        .run()
        .unwrap_err();
    assert!(matches!(err, MigrationError::Aggregation { .. }));
    let later: Role = store.get_as(&path, "later").unwrap();
    assert_eq!(later.metadata.annotation(AGG), Some(r#"["role-template-manage-users"]"#));
}

#[test]
fn cleanup_leaves_no_binding_on_users_manager() {
    let config = MigrationConfig::default();
    let store = MemoryStore::new();
    let bindings = config.api.global_role_bindings();
    for (name, role) in [
        ("alice", "users-manager"),
        ("bob", "users-manager"),
        ("carol", "platform-admin"),
    ] {
        store
            .insert(
                &bindings,
                json!({
                    "metadata": {"name": name},
                    "subjects": [{"kind": "User", "name": name}],
                    "roleRef": {"apiGroup": "iam.kubesphere.io", "kind": "GlobalRole", "name": role}
                }),
            )
            .unwrap();
    }
    store
        .insert(
            &config.api.roles(ScopeKind::Global, None),
            json!({"metadata": {"name": "users-manager"}}),
        )
        .unwrap();

    let report = migrate(&store, &config, RunOptions::default()).unwrap();
    let cleanup = report.cleanup.unwrap();
    assert_eq!(cleanup.repointed, vec!["alice", "bob"]);
    assert_eq!(cleanup.deleted, vec!["users-manager"]);

    let all: Vec<RoleBinding> = store.list_as(&bindings).unwrap();
    assert!(all.iter().all(|b| b.role_ref.name != "users-manager"));
    assert_eq!(
        all.iter()
            .filter(|b| b.role_ref.name == "platform-regular")
            .count(),
        2
    );
}

/// Store that acknowledges updates without applying them.
struct StaleUpdates(MemoryStore);

impl ResourceStore for StaleUpdates {
    fn list(&self, path: &ResourcePath) -> StoreResult<Vec<Value>> {
        self.0.list(path)
    }

    fn get(&self, path: &ResourcePath, name: &str) -> StoreResult<Value> {
        self.0.get(path, name)
    }

    fn create(&self, path: &ResourcePath, body: Value) -> StoreResult<()> {
        self.0.create(path, body)
    }

    fn update(&self, _path: &ResourcePath, _name: &str, _body: Value) -> StoreResult<()> {
        Ok(())
    }

    fn delete(&self, path: &ResourcePath, name: &str) -> StoreResult<()> {
        self.0.delete(path, name)
    }
}

#[test]
fn unrepointed_binding_blocks_role_deletion() {
    let config = MigrationConfig::default();
    let inner = MemoryStore::new();
    inner
        .insert(
            &config.api.global_role_bindings(),
            json!({"metadata": {"name": "alice"}, "roleRef": {"name": "workspaces-manager"}}),
        )
        .unwrap();
    inner
        .insert(
            &config.api.roles(ScopeKind::Global, None),
            json!({"metadata": {"name": "workspaces-manager"}}),
        )
        .unwrap();
    let store = StaleUpdates(inner);

    let err = migrate(&store, &config, RunOptions::default()).unwrap_err();
    match err {
        MigrationError::DanglingBindings { role, bindings } => {
            assert_eq!(role, "workspaces-manager");
            assert_eq!(bindings, vec!["alice"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store
        .get(&config.api.roles(ScopeKind::Global, None), "workspaces-manager")
        .is_ok());
}

#[test]
fn recreated_role_keeps_template_narrowing() {
    let config = MigrationConfig::default();
    let store = MemoryStore::new();
    let path = config.api.roles(ScopeKind::Global, None);
    let narrowed = json!([
        {"verbs": ["get"], "apiGroups": [""], "resources": ["secrets"], "resourceNames": ["db-password"]},
        {"verbs": ["get"], "nonResourceURLs": ["/healthz"]}
    ]);
    store
        .insert(
            &path,
            json!({
                "metadata": {"name": "view-one-secret", "labels": {TEMPLATE: "true"}},
                "rules": narrowed.clone()
            }),
        )
        .unwrap();
    store
        .insert(
            &path,
            custom("r1", r#"["view-one-secret","role-template-manage-users"]"#),
        )
        .unwrap();

    migrate(&store, &config, RunOptions::default()).unwrap();
    let rebuilt = store.get(&path, "r1").unwrap();
    assert_eq!(rebuilt["rules"], narrowed);
}

#[test]
fn converted_cluster_bindings_feed_builtin_cleanup() {
    let config = MigrationConfig::default();
    let store = MemoryStore::new();
    store
        .insert(
            &config.api.cluster_role_bindings(),
            json!({
                "metadata": {"name": "alice"},
                "subjects": [{"kind": "User", "name": "alice"}],
                "roleRef": {"kind": "ClusterRole", "name": "workspaces-manager"}
            }),
        )
        .unwrap();
    store
        .insert(
            &config.api.roles(ScopeKind::Global, None),
            json!({"metadata": {"name": "workspaces-manager"}}),
        )
        .unwrap();

    let options = RunOptions {
        with_bindings: true,
        dry_run: false,
    };
    let report = migrate(&store, &config, options).unwrap();
    assert_eq!(report.global_bindings.unwrap().converted, 1);
    let cleanup = report.cleanup.unwrap();
    assert_eq!(cleanup.repointed, vec!["alice-workspaces-manager"]);
    assert_eq!(cleanup.deleted, vec!["workspaces-manager"]);

    let binding: RoleBinding = store
        .get_as(&config.api.global_role_bindings(), "alice-workspaces-manager")
        .unwrap();
    assert_eq!(binding.role_ref.name, "platform-regular");
    assert!(store
        .list(&config.api.cluster_role_bindings())
        .unwrap()
        .is_empty());
}
