use serde::{Deserialize, Serialize};

/// Outcome of one import batch.
///
/// `errors` is omitted from the wire shape when empty; the transport
/// layer maps `is_success` to its status code.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportResult {
    pub inserted: u64,
    pub updated: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ImportResult {
    pub fn from_errors(errors: Vec<String>) -> Self {
        ImportResult {
            inserted: 0,
            updated: 0,
            errors,
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
