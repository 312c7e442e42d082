//! ---
//! mig_section: "02-resource-access"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Resource store abstraction and backends."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys the typed model does not name. Kept so that read-modify-write cycles
/// do not drop fields such as `uid` or `ownerReferences`.
pub type Extra = Map<String, Value>;

/// Object metadata shared by roles, templates, and bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name, unique within its collection (and namespace).
    pub name: String,
    /// Namespace for namespaced objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Label set.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,
    /// Annotation map.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub annotations: IndexMap<String, String>,
    /// Opaque version token carried through on update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    /// Every other metadata field, passed through untouched.
    #[serde(flatten)]
    pub extra: Extra,
}

impl ObjectMeta {
    /// Metadata carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Label value, treating an empty value the same as an absent label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Annotation value, treating an empty value the same as an absent annotation.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// One permission rule. Opaque to the engine apart from concatenation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// Allowed verbs.
    #[serde(default)]
    pub verbs: Vec<String>,
    /// API groups the rule applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_groups: Vec<String>,
    /// Resource kinds the rule applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    /// Object names the rule is narrowed to; empty means every object.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_names: Vec<String>,
    /// Non-resource URL paths.
    #[serde(
        default,
        rename = "nonResourceURLs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub non_resource_urls: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl PolicyRule {
    /// Build a rule from string slices.
    pub fn new(verbs: &[&str], api_groups: &[&str], resources: &[&str]) -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect();
        Self {
            verbs: owned(verbs),
            api_groups: owned(api_groups),
            resources: owned(resources),
            ..Self::default()
        }
    }
}

/// A role or role template at any scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// API version string written on create.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    /// Kind string written on create.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Ordered rule list.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// Subject of a binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Subject kind (`User`, `Group`, `ServiceAccount`).
    pub kind: String,
    /// Subject name.
    pub name: String,
    /// API group of the subject kind.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_group: String,
    /// Namespace of a `ServiceAccount` subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Subject {
    /// A `User` subject.
    pub fn user(name: impl Into<String>, api_group: impl Into<String>) -> Self {
        Self {
            kind: "User".to_owned(),
            name: name.into(),
            api_group: api_group.into(),
            ..Self::default()
        }
    }

    /// Whether the subject is a user.
    pub fn is_user(&self) -> bool {
        self.kind == "User"
    }
}

/// Reference from a binding to the role it grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    /// API group of the referenced role kind.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_group: String,
    /// Referenced role kind.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Referenced role name.
    pub name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Binding of subjects to a role at any scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    /// API version string written on create.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    /// Kind string written on create.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Bound subjects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<Subject>,
    /// Granted role.
    pub role_ref: RoleRef,
    #[serde(flatten)]
    pub extra: Extra,
}
