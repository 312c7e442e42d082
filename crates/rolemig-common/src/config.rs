//! ---
//! mig_section: "01-core-functionality"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Migration configuration tables and validation."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use rolemig_store::{PolicyRule, ResourcePath};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::debug;

use crate::logging::LogFormat;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

fn default_iam_api() -> String {
    "/apis/iam.kubesphere.io/v1alpha2".to_owned()
}

fn default_rbac_api() -> String {
    "/apis/rbac.authorization.k8s.io/v1".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_max_attempts() -> u32 {
    20
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_fallback_role() -> String {
    "platform-regular".to_owned()
}

fn default_obsolete_global_roles() -> Vec<String> {
    strings(&["users-manager", "workspaces-manager"])
}

fn default_obsolete_bindings() -> Vec<String> {
    strings(&["admin", "viewer"])
}

fn default_binding_builtin_roles() -> Vec<String> {
    strings(&["admin", "operator", "viewer"])
}

/// Top-level configuration for a migration run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiPaths,
    #[serde(default)]
    pub keys: MetadataKeys,
    #[serde(default)]
    pub scopes: ScopeTables,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub bindings: BindingsConfig,
    #[serde(default)]
    pub global_bindings: GlobalBindingsConfig,
}

/// Configuration together with the file it came from (`None` for built-in defaults).
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: MigrationConfig,
    pub source: Option<PathBuf>,
}

impl MigrationConfig {
    pub const ENV_CONFIG_PATH: &'static str = "ROLEMIG_CONFIG";

    /// Load the first existing candidate, honouring `ROLEMIG_CONFIG`; fall back
    /// to the built-in tables when nothing is found.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!("no configuration file found, using built-in tables");
        Ok(LoadedConfig {
            config: Self::default(),
            source: None,
        })
    }

    /// Read, parse, and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<Self>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "failed to serialise configuration")
    }

    /// Settings for one scope.
    pub fn scope(&self, kind: ScopeKind) -> &ScopeConfig {
        match kind {
            ScopeKind::Global => &self.scopes.global,
            ScopeKind::Workspace => &self.scopes.workspace,
            ScopeKind::Namespaced => &self.scopes.namespaced,
        }
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.keys.validate()?;
        self.cleanup.validate()?;
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        for kind in ScopeKind::iter() {
            let scope = self.scope(kind);
            if scope
                .builtin_roles
                .iter()
                .chain(&scope.deprecated_templates)
                .any(|name| name.trim().is_empty())
            {
                return Err(anyhow!("scope '{}' lists an empty role name", kind));
            }
        }
        if self
            .bindings
            .template_rules
            .iter()
            .any(|(name, rules)| name.trim().is_empty() || rules.is_empty())
        {
            return Err(anyhow!(
                "bindings.template_rules entries need a name and at least one rule"
            ));
        }
        self.global_bindings.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for MigrationConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: MigrationConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Level at which a role is defined.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScopeKind {
    Global,
    Workspace,
    Namespaced,
}

impl ScopeKind {
    /// Kind string of role objects in this scope.
    pub fn role_kind(&self) -> &'static str {
        match self {
            ScopeKind::Global => "GlobalRole",
            ScopeKind::Workspace => "WorkspaceRole",
            ScopeKind::Namespaced => "Role",
        }
    }
}

/// How a role name is compared against the builtin set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinMatch {
    /// Name equals a builtin entry.
    #[default]
    Exact,
    /// Name ends with a builtin entry (workspace roles are `<workspace>-<builtin>`).
    Suffix,
}

impl BuiltinMatch {
    /// Whether `name` is a builtin under this strategy.
    pub fn matches(&self, name: &str, builtin: &[String]) -> bool {
        match self {
            BuiltinMatch::Exact => builtin.iter().any(|b| b == name),
            BuiltinMatch::Suffix => builtin.iter().any(|b| name.ends_with(b.as_str())),
        }
    }
}

/// Builtin and deprecated-template tables for one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeConfig {
    #[serde(default)]
    pub builtin_roles: Vec<String>,
    #[serde(default)]
    pub deprecated_templates: Vec<String>,
    #[serde(default)]
    pub builtin_match: BuiltinMatch,
}

/// Per-scope tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeTables {
    #[serde(default = "ScopeTables::default_global")]
    pub global: ScopeConfig,
    #[serde(default = "ScopeTables::default_workspace")]
    pub workspace: ScopeConfig,
    #[serde(default = "ScopeTables::default_namespaced")]
    pub namespaced: ScopeConfig,
}

impl ScopeTables {
    fn default_global() -> ScopeConfig {
        ScopeConfig {
            builtin_roles: strings(&[
                "platform-admin",
                "platform-regular",
                "platform-self-provisioner",
                "anonymous",
                "authenticated",
                "pre-registration",
            ]),
            deprecated_templates: strings(&[
                "role-template-manage-users",
                "role-template-manage-roles",
                "role-template-manage-workspaces",
            ]),
            builtin_match: BuiltinMatch::Exact,
        }
    }

    fn default_workspace() -> ScopeConfig {
        ScopeConfig {
            builtin_roles: strings(&["admin", "regular", "self-provisioner", "viewer"]),
            deprecated_templates: strings(&[
                "role-template-manage-members",
                "role-template-manage-roles",
                "role-template-manage-groups",
            ]),
            builtin_match: BuiltinMatch::Suffix,
        }
    }

    fn default_namespaced() -> ScopeConfig {
        ScopeConfig {
            builtin_roles: strings(&["admin", "operator", "viewer"]),
            deprecated_templates: strings(&[
                "role-template-manage-members",
                "role-template-manage-roles",
            ]),
            builtin_match: BuiltinMatch::Exact,
        }
    }
}

impl Default for ScopeTables {
    fn default() -> Self {
        Self {
            global: Self::default_global(),
            workspace: Self::default_workspace(),
            namespaced: Self::default_namespaced(),
        }
    }
}

/// API group prefixes under which collections live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiPaths {
    #[serde(default = "default_iam_api")]
    pub iam: String,
    #[serde(default = "default_rbac_api")]
    pub rbac: String,
}

impl Default for ApiPaths {
    fn default() -> Self {
        Self {
            iam: default_iam_api(),
            rbac: default_rbac_api(),
        }
    }
}

impl ApiPaths {
    /// Collection holding roles of `kind`, optionally narrowed to a namespace.
    pub fn roles(&self, kind: ScopeKind, namespace: Option<&str>) -> ResourcePath {
        match kind {
            ScopeKind::Global => ResourcePath::cluster(&self.iam, "globalroles"),
            ScopeKind::Workspace => ResourcePath::cluster(&self.iam, "workspaceroles"),
            ScopeKind::Namespaced => {
                ResourcePath::cluster(&self.rbac, "roles").in_namespace(namespace)
            }
        }
    }

    /// Global role binding collection.
    pub fn global_role_bindings(&self) -> ResourcePath {
        ResourcePath::cluster(&self.iam, "globalrolebindings")
    }

    /// Legacy cluster role collection.
    pub fn cluster_roles(&self) -> ResourcePath {
        ResourcePath::cluster(&self.rbac, "clusterroles")
    }

    /// Legacy cluster role binding collection.
    pub fn cluster_role_bindings(&self) -> ResourcePath {
        ResourcePath::cluster(&self.rbac, "clusterrolebindings")
    }

    /// Namespaced role binding collection.
    pub fn role_bindings(&self, namespace: Option<&str>) -> ResourcePath {
        ResourcePath::cluster(&self.rbac, "rolebindings").in_namespace(namespace)
    }

    /// `group/version` written into objects of `kind`.
    pub fn api_version(&self, kind: ScopeKind) -> String {
        let prefix = match kind {
            ScopeKind::Global | ScopeKind::Workspace => &self.iam,
            ScopeKind::Namespaced => &self.rbac,
        };
        group_version(prefix)
    }

    /// API group of the iam prefix (used in role references).
    pub fn iam_group(&self) -> String {
        api_group(&self.iam)
    }

    /// API group of the rbac prefix (used in role references and subjects).
    pub fn rbac_group(&self) -> String {
        api_group(&self.rbac)
    }

    fn validate(&self) -> Result<()> {
        for (name, prefix) in [("api.iam", &self.iam), ("api.rbac", &self.rbac)] {
            if !prefix.starts_with('/') || group_version(prefix).is_empty() {
                return Err(anyhow!("{} must be an absolute path, got '{}'", name, prefix));
            }
        }
        Ok(())
    }
}

fn group_version(prefix: &str) -> String {
    prefix
        .trim_matches('/')
        .trim_start_matches("apis/")
        .to_owned()
}

fn api_group(prefix: &str) -> String {
    let gv = group_version(prefix);
    gv.split('/').next().unwrap_or_default().to_owned()
}

/// Label and annotation keys the engine relies upon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetadataKeys {
    pub role_template_label: String,
    pub workspace_label: String,
    pub aggregation_annotation: String,
    pub creator_annotation: String,
    pub description_annotation: String,
    pub user_ref_label: String,
}

impl Default for MetadataKeys {
    fn default() -> Self {
        Self {
            role_template_label: "iam.kubesphere.io/role-template".to_owned(),
            workspace_label: "kubesphere.io/workspace".to_owned(),
            aggregation_annotation: "iam.kubesphere.io/aggregation-roles".to_owned(),
            creator_annotation: "kubesphere.io/creator".to_owned(),
            description_annotation: "kubesphere.io/description".to_owned(),
            user_ref_label: "iam.kubesphere.io/user-ref".to_owned(),
        }
    }
}

impl MetadataKeys {
    fn validate(&self) -> Result<()> {
        let keys = [
            &self.role_template_label,
            &self.workspace_label,
            &self.aggregation_annotation,
            &self.creator_annotation,
            &self.description_annotation,
            &self.user_ref_label,
        ];
        if keys.iter().any(|k| k.trim().is_empty()) {
            return Err(anyhow!("metadata keys cannot be empty"));
        }
        Ok(())
    }
}

/// Obsolete global builtins and the role their bindings move to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupConfig {
    #[serde(default = "default_obsolete_global_roles")]
    pub obsolete_global_roles: Vec<String>,
    #[serde(default = "default_fallback_role")]
    pub fallback_role: String,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            obsolete_global_roles: default_obsolete_global_roles(),
            fallback_role: default_fallback_role(),
        }
    }
}

impl CleanupConfig {
    fn validate(&self) -> Result<()> {
        if self.fallback_role.trim().is_empty() {
            return Err(anyhow!("cleanup.fallback_role cannot be empty"));
        }
        if self.obsolete_global_roles.contains(&self.fallback_role) {
            return Err(anyhow!(
                "cleanup.fallback_role '{}' is itself scheduled for deletion",
                self.fallback_role
            ));
        }
        Ok(())
    }
}

/// Bounded retry for template lookups that may lag behind role creation.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: default_retry_delay(),
        }
    }
}

/// Legacy namespaced role-binding conversion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindingsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Binding names deleted outright.
    #[serde(default = "default_obsolete_bindings")]
    pub obsolete_bindings: Vec<String>,
    /// Role names that keep their reference unchanged.
    #[serde(default = "default_binding_builtin_roles")]
    pub builtin_roles: Vec<String>,
    /// Template name to the rules a legacy role must cover to be granted it.
    #[serde(default = "default_template_rules")]
    pub template_rules: IndexMap<String, Vec<PolicyRule>>,
}

impl Default for BindingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            obsolete_bindings: default_obsolete_bindings(),
            builtin_roles: default_binding_builtin_roles(),
            template_rules: default_template_rules(),
        }
    }
}

fn default_template_rules() -> IndexMap<String, Vec<PolicyRule>> {
    const WORKLOADS: [(&str, &str); 10] = [
        ("apps", "deployments"),
        ("apps", "statefulsets"),
        ("apps", "daemonsets"),
        ("batch", "jobs"),
        ("batch", "cronjobs"),
        ("", "pods"),
        ("", "services"),
        ("", "secrets"),
        ("", "configmaps"),
        ("", "persistentvolumeclaims"),
    ];
    let view = &["get", "list"][..];
    let delete = &["delete"][..];
    let workloads = |verbs: &[&str]| {
        WORKLOADS
            .iter()
            .map(|&(group, resource)| PolicyRule::new(verbs, &[group], &[resource]))
            .collect::<Vec<_>>()
    };
    let single = |verbs: &[&str], group: &str, resource: &str| {
        vec![PolicyRule::new(verbs, &[group], &[resource])]
    };

    let mut table = IndexMap::new();
    table.insert("role-template-view-app-workloads".to_owned(), workloads(view));
    table.insert("role-template-manage-app-workloads".to_owned(), workloads(delete));
    for (suffix, resource) in [
        ("configmaps", "configmaps"),
        ("secrets", "secrets"),
        ("volumes", "persistentvolumeclaims"),
    ] {
        table.insert(
            format!("role-template-view-{suffix}"),
            single(view, "", resource),
        );
        table.insert(
            format!("role-template-manage-{suffix}"),
            single(delete, "", resource),
        );
    }
    for (suffix, resource) in [("members", "rolebindings"), ("roles", "roles")] {
        table.insert(
            format!("role-template-view-{suffix}"),
            single(view, "rbac.authorization.k8s.io", resource),
        );
        table.insert(
            format!("role-template-manage-{suffix}"),
            single(delete, "rbac.authorization.k8s.io", resource),
        );
    }
    table.insert(
        "role-template-manage-project-settings".to_owned(),
        single(delete, "", "namespaces"),
    );
    table
}

/// Legacy cluster role binding conversion into global role bindings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalBindingsConfig {
    /// Builtin cluster role to the global role that replaces it.
    #[serde(default = "default_global_role_mapping")]
    pub role_mapping: IndexMap<String, String>,
    /// Global template name to the rules a custom cluster role must cover.
    #[serde(default = "default_global_template_rules")]
    pub template_rules: IndexMap<String, Vec<PolicyRule>>,
}

impl Default for GlobalBindingsConfig {
    fn default() -> Self {
        Self {
            role_mapping: default_global_role_mapping(),
            template_rules: default_global_template_rules(),
        }
    }
}

impl GlobalBindingsConfig {
    fn validate(&self) -> Result<()> {
        if self
            .role_mapping
            .iter()
            .any(|(from, to)| from.trim().is_empty() || to.trim().is_empty())
        {
            return Err(anyhow!("global_bindings.role_mapping cannot map empty names"));
        }
        if self
            .template_rules
            .iter()
            .any(|(name, rules)| name.trim().is_empty() || rules.is_empty())
        {
            return Err(anyhow!(
                "global_bindings.template_rules entries need a name and at least one rule"
            ));
        }
        Ok(())
    }
}

fn default_global_role_mapping() -> IndexMap<String, String> {
    [
        ("cluster-admin", "platform-admin"),
        ("cluster-regular", "platform-regular"),
        ("workspaces-manager", "workspaces-manager"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_owned(), to.to_owned()))
    .collect()
}

fn default_global_template_rules() -> IndexMap<String, Vec<PolicyRule>> {
    const TARGETS: [(&str, &str, &str); 4] = [
        ("users", "iam.kubesphere.io", "users"),
        ("workspaces", "tenant.kubesphere.io", "workspaces"),
        ("roles", "rbac.authorization.k8s.io", "clusterroles"),
        ("app-templates", "openpitrix.io", "apps"),
    ];
    let mut table = IndexMap::new();
    for (suffix, group, resource) in TARGETS {
        table.insert(
            format!("role-template-view-{suffix}"),
            vec![PolicyRule::new(&["get", "list"], &[group], &[resource])],
        );
    }
    let verb_sets: [&[&str]; 4] = [&["get", "list"], &["create"], &["delete"], &["update"]];
    for (suffix, group, resource) in TARGETS {
        let rules = verb_sets
            .into_iter()
            .map(|verbs| PolicyRule::new(verbs, &[group], &[resource]))
            .collect();
        table.insert(format!("role-template-manage-{suffix}"), rules);
    }
    table
}

/// Tracing output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Also write a daily rolling JSON log file under `directory`.
    #[serde(default)]
    pub file_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            file_enabled: false,
        }
    }
}
