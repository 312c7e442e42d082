//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Custom role predicate."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use rolemig_common::{BuiltinMatch, MetadataKeys};
use rolemig_store::ObjectMeta;

/// A role is custom when it is not a template, not a builtin, and carries a
/// non-empty aggregation annotation.
pub fn is_custom_role(
    meta: &ObjectMeta,
    builtin: &[String],
    strategy: BuiltinMatch,
    keys: &MetadataKeys,
) -> bool {
    meta.label(&keys.role_template_label).is_none()
        && !strategy.matches(&meta.name, builtin)
        && meta.annotation(&keys.aggregation_annotation).is_some()
}
