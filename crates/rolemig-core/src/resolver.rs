//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Template rule resolution."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use rolemig_store::{PolicyRule, ResourcePath, ResourceStore, Role, TypedStore};
use tracing::{debug, warn};

use crate::Result;

/// Rules gathered from a reference list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Concatenated rules in reference order.
    pub rules: Vec<PolicyRule>,
    /// References whose template does not exist.
    pub missing: Vec<String>,
}

/// Fetches role templates and concatenates their rules.
pub struct RuleResolver<'a> {
    store: &'a dyn ResourceStore,
}

impl<'a> RuleResolver<'a> {
    pub fn new(store: &'a dyn ResourceStore) -> Self {
        Self { store }
    }

    /// Resolve `refs` against the templates stored under `templates`.
    ///
    /// A missing template is logged and contributes no rules. Any other store
    /// failure is returned. No deduplication or merging happens.
    pub fn resolve(&self, templates: &ResourcePath, refs: &[String]) -> Result<Resolution> {
        let mut resolution = Resolution::default();
        for name in refs {
            match self.store.get_as::<Role>(templates, name) {
                Ok(template) => {
                    debug!(template = %name, rules = template.rules.len(), "template resolved");
                    resolution.rules.extend(template.rules);
                }
                Err(err) if err.is_not_found() => {
                    warn!(template = %name, path = %templates, "role template not found, its rules are omitted");
                    resolution.missing.push(name.clone());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(resolution)
    }
}
