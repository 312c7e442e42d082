//! ---
//! mig_section: "05-admin-interface"
//! mig_subsection: "tests"
//! mig_type: "source"
//! mig_scope: "test"
//! mig_description: "End-to-end checks of the rolemigctl binary."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use serde_json::{json, Value};
use tempfile::tempdir;

const GLOBAL_ROLES: &str = "/apis/iam.kubesphere.io/v1alpha2/globalroles";

fn write_snapshot(path: &Path) {
    let document = json!({
        "collections": [{
            "path": GLOBAL_ROLES,
            "items": [
                {
                    "metadata": {"name": "t1", "labels": {"iam.kubesphere.io/role-template": "true"}},
                    "rules": [{"verbs": ["get"], "apiGroups": [""], "resources": ["pods"]}]
                },
                {
                    "metadata": {
                        "name": "r1",
                        "annotations": {
                            "iam.kubesphere.io/aggregation-roles": "[\"t1\",\"role-template-manage-users\"]",
                            "kubesphere.io/creator": "alice"
                        }
                    },
                    "rules": []
                }
            ]
        }]
    });
    fs::write(path, serde_json::to_string_pretty(&document).unwrap()).unwrap();
}

fn rolemigctl() -> Command {
    let mut cmd = Command::cargo_bin("rolemigctl").unwrap();
    cmd.env_remove("ROLEMIG_CONFIG").env("ROLEMIG_LOG", "warn");
    cmd
}

fn role(document: &Value, name: &str) -> Value {
    document["collections"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|c| c["items"].as_array().unwrap())
        .find(|item| item["metadata"]["name"] == name)
        .cloned()
        .unwrap()
}

#[test]
fn version_flag_prints_package_version() {
    let output = rolemigctl().arg("-V").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn dry_run_leaves_snapshot_untouched() {
    let dir = tempdir().unwrap();
    let snapshot = dir.path().join("cluster.json");
    let report = dir.path().join("report.json");
    write_snapshot(&snapshot);
    let before = fs::read_to_string(&snapshot).unwrap();

    rolemigctl()
        .arg("migrate")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--report")
        .arg(&report)
        .arg("--dry-run")
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&snapshot).unwrap(), before);
    let report: Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["dry_run"], json!(true));
    assert_eq!(report["scopes"][0]["records"][1]["outcome"], json!("recreated"));
}

#[test]
fn migrated_snapshot_is_written_to_output() {
    let dir = tempdir().unwrap();
    let snapshot = dir.path().join("cluster.json");
    let output = dir.path().join("migrated.yaml");
    write_snapshot(&snapshot);

    let result = rolemigctl()
        .arg("migrate")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--output")
        .arg(&output)
        .output()
        .unwrap();
    assert!(result.status.success());
    assert!(String::from_utf8(result.stdout)
        .unwrap()
        .contains("recreated 1 role(s)"));

    let migrated: Value = serde_yaml::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let r1 = role(&migrated, "r1");
    assert_eq!(
        r1["metadata"]["annotations"]["iam.kubesphere.io/aggregation-roles"],
        json!("[\"t1\"]")
    );
    assert_eq!(r1["rules"][0]["verbs"], json!(["get"]));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("rolemig.toml");
    fs::write(&config, "[retry]\nmax_attempts = 0\n").unwrap();

    let output = rolemigctl()
        .args(["config", "validate", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8(output.stderr)
        .unwrap()
        .contains("max_attempts"));
}

#[test]
fn config_show_renders_defaults() {
    let dir = tempdir().unwrap();
    let output = rolemigctl()
        .current_dir(dir.path())
        .args(["config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("fallback_role = \"platform-regular\""));
}

#[test]
fn missing_snapshot_fails_with_context() {
    let dir = tempdir().unwrap();
    let output = rolemigctl()
        .arg("migrate")
        .arg("--snapshot")
        .arg(dir.path().join("absent.json"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8(output.stderr)
        .unwrap()
        .contains("unable to read snapshot"));
}
