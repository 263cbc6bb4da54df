//! Argument completion types.

use serde::{Deserialize, Serialize};

/// What the completion is for: a prompt argument or a resource template
/// variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionReference {
    /// Completing an argument of a prompt
    #[serde(rename = "ref/prompt")]
    Prompt {
        /// Prompt name
        name: String,
    },
    /// Completing a variable of a resource template
    #[serde(rename = "ref/resource")]
    Resource {
        /// Template URI
        uri: String,
    },
}

/// Parameters of `completion/complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteParams {
    /// What is being completed
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    /// The argument and the partial value typed so far
    pub argument: CompletionArgument,
}

/// The argument under completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionArgument {
    /// Argument name
    pub name: String,
    /// Partial value typed so far
    pub value: String,
}

/// Result of `completion/complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteResult {
    /// The completion values
    pub completion: Completion,
}

/// Completion values and paging hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// Candidate values (at most 100 per the protocol)
    pub values: Vec<String>,
    /// Total candidates available, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    /// Whether more candidates exist beyond `values`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn reference_tags_follow_the_wire() {
        let p = CompleteParams {
            reference: CompletionReference::Prompt { name: "greet".into() },
            argument: CompletionArgument {
                name: "who".into(),
                value: "wo".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({
                "ref": {"type": "ref/prompt", "name": "greet"},
                "argument": {"name": "who", "value": "wo"}
            })
        );
    }
}
