//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Deprecated template filter."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use std::collections::HashSet;

/// Drop deprecated references, keeping the relative order of the rest.
///
/// Returns whether anything was removed together with the surviving list.
/// Duplicates are not collapsed.
pub fn filter_deprecated(deprecated: &HashSet<String>, refs: &[String]) -> (bool, Vec<String>) {
    let surviving: Vec<String> = refs
        .iter()
        .filter(|name| !deprecated.contains(name.as_str()))
        .cloned()
        .collect();
    (surviving.len() != refs.len(), surviving)
}
