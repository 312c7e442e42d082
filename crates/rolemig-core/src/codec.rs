//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Aggregation reference codec."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
//! The aggregation annotation stores template names as a JSON array of
//! strings. Order and duplicates are significant and preserved.

/// Failure to read or write the aggregation annotation.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The annotation is not a JSON array of strings.
    #[error("annotation is not a JSON list of template names: {0}")]
    Decode(#[source] serde_json::Error),
    /// The list could not be serialized.
    #[error("unable to encode template names: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Parse an annotation value into the ordered reference list.
pub fn decode_aggregation(value: &str) -> Result<Vec<String>, CodecError> {
    serde_json::from_str(value).map_err(CodecError::Decode)
}

/// Serialize a reference list into an annotation value.
pub fn encode_aggregation(refs: &[String]) -> Result<String, CodecError> {
    serde_json::to_string(refs).map_err(CodecError::Encode)
}
