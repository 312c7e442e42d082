//! ---
//! mig_section: "02-resource-access"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Resource store abstraction and backends."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const NAMESPACES_SEGMENT: &str = "/namespaces/";

/// Address of a resource collection, e.g. `/apis/rbac.example.io/v1/namespaces/dev/roles`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourcePath {
    api: String,
    namespace: Option<String>,
    collection: String,
}

impl ResourcePath {
    /// A cluster-wide collection (or a namespaced collection listed across namespaces).
    pub fn cluster(api: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            api: trim_api(api.into()),
            namespace: None,
            collection: collection.into(),
        }
    }

    /// A collection inside one namespace.
    pub fn namespaced(
        api: impl Into<String>,
        namespace: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            api: trim_api(api.into()),
            namespace: Some(namespace.into()),
            collection: collection.into(),
        }
    }

    /// Same collection narrowed to `namespace`; `None` widens it back to cluster scope.
    pub fn in_namespace(&self, namespace: Option<&str>) -> Self {
        Self {
            api: self.api.clone(),
            namespace: namespace.map(str::to_owned),
            collection: self.collection.clone(),
        }
    }

    /// API group/version prefix.
    pub fn api(&self) -> &str {
        &self.api
    }

    /// Namespace segment, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Collection name (`roles`, `globalrolebindings`, ...).
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

fn trim_api(api: String) -> String {
    api.trim_end_matches('/').to_owned()
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}{}{}/{}", self.api, NAMESPACES_SEGMENT, ns, self.collection),
            None => write!(f, "{}/{}", self.api, self.collection),
        }
    }
}

/// Error returned when a textual path cannot be split into its segments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resource path '{0}'")]
pub struct InvalidPath(pub String);

impl FromStr for ResourcePath {
    type Err = InvalidPath;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim().trim_end_matches('/');
        let invalid = || InvalidPath(raw.to_owned());
        if !trimmed.starts_with('/') {
            return Err(invalid());
        }
        if let Some((api, rest)) = trimmed.split_once(NAMESPACES_SEGMENT) {
            let (ns, collection) = rest.split_once('/').ok_or_else(invalid)?;
            if api.is_empty() || ns.is_empty() || collection.is_empty() || collection.contains('/')
            {
                return Err(invalid());
            }
            return Ok(Self::namespaced(api, ns, collection));
        }
        let (api, collection) = trimmed.rsplit_once('/').ok_or_else(invalid)?;
        if api.is_empty() || collection.is_empty() {
            return Err(invalid());
        }
        Ok(Self::cluster(api, collection))
    }
}

impl Serialize for ResourcePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourcePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
