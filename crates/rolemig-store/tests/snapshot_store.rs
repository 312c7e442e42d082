//! ---
//! mig_section: "02-resource-access"
//! mig_subsection: "tests"
//! mig_type: "source"
//! mig_scope: "test"
//! mig_description: "Snapshot file and in-memory store integration tests."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use rolemig_store::{
    load_snapshot, save_snapshot, MemoryStore, ResourcePath, ResourceStore, Role,
    SnapshotDocument, TypedStore,
};
use serde_json::json;
use tempfile::tempdir;

fn seeded_document() -> SnapshotDocument {
    serde_json::from_value(json!({
        "collections": [
            {
                "path": "/apis/iam.example.io/v1alpha2/globalroles",
                "items": [
                    {"metadata": {"name": "platform-admin"}, "rules": []},
                    {
                        "metadata": {"name": "auditor", "annotations": {"creator": "root"}},
                        "rules": [{"verbs": ["get"], "resources": ["users"]}]
                    }
                ]
            },
            {
                "path": "/apis/rbac.example.io/v1/roles",
                "items": [
                    {"metadata": {"name": "dev-ops", "namespace": "dev"}, "rules": []}
                ]
            }
        ]
    }))
    .unwrap()
}

#[test]
fn snapshot_loads_into_memory_store() {
    let store = MemoryStore::from_snapshot(&seeded_document()).unwrap();
    assert_eq!(store.len(), 3);

    let global = ResourcePath::cluster("/apis/iam.example.io/v1alpha2", "globalroles");
    let auditor: Role = store.get_as(&global, "auditor").unwrap();
    assert_eq!(auditor.metadata.annotation("creator"), Some("root"));

    let dev = ResourcePath::namespaced("/apis/rbac.example.io/v1", "dev", "roles");
    assert_eq!(store.list(&dev).unwrap().len(), 1);
    assert_eq!(store.write_count(), 0);
}

#[test]
fn json_and_yaml_files_carry_the_same_document() {
    let dir = tempdir().unwrap();
    let document = seeded_document();

    let json_path = dir.path().join("cluster.json");
    save_snapshot(&document, &json_path).unwrap();
    assert_eq!(load_snapshot(&json_path).unwrap(), document);

    let yaml_path = dir.path().join("cluster.yaml");
    save_snapshot(&document, &yaml_path).unwrap();
    let raw = std::fs::read_to_string(&yaml_path).unwrap();
    assert!(raw.contains("globalroles"));
    assert_eq!(load_snapshot(&yaml_path).unwrap(), document);
}

#[test]
fn export_reflects_writes() {
    let store = MemoryStore::from_snapshot(&seeded_document()).unwrap();
    let global = ResourcePath::cluster("/apis/iam.example.io/v1alpha2", "globalroles");
    store.delete(&global, "auditor").unwrap();

    let exported = store.export();
    assert_eq!(exported.object_count(), 2);
    let names: Vec<_> = exported.collections[0]
        .items
        .iter()
        .map(|item| item["metadata"]["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("platform-admin")]);
}

#[test]
fn missing_snapshot_file_reports_path() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    let err = load_snapshot(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("absent.json"));
}
