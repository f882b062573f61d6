//! The fatal error document
//!
//! Every unrecoverable request or response processing failure is reported
//! with the same single-entry `errors` document so callers always get JSON
//! back.

use serde::Serialize;
use std::fmt;

/// A request-attributable failure that is returned, not thrown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalError {
    message: String,
}

#[derive(Serialize)]
struct FatalDocument<'a> {
    errors: [FatalEntry<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FatalEntry<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    component: &'static str,
    severity: &'static str,
    message: &'a str,
    formatted_message: String,
}

impl FatalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Render the fatal error document
    pub fn to_json(&self) -> String {
        let document = FatalDocument {
            errors: [FatalEntry {
                kind: "JSONError",
                component: "solcjs",
                severity: "error",
                message: &self.message,
                formatted_message: format!("Error: {}", self.message),
            }],
        };
        // Only string fields, serialization cannot fail.
        serde_json::to_string(&document).unwrap_or_default()
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Shorthand for `FatalError::new(message).to_json()`
pub fn format_fatal_error(message: impl Into<String>) -> String {
    FatalError::new(message).to_json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_fatal_document_shape() {
        let doc: serde_json::Value =
            serde_json::from_str(&format_fatal_error("No input sources specified.")).unwrap();
        assert_eq!(
            doc,
            json!({
                "errors": [{
                    "type": "JSONError",
                    "component": "solcjs",
                    "severity": "error",
                    "message": "No input sources specified.",
                    "formattedMessage": "Error: No input sources specified."
                }]
            })
        );
    }
}
