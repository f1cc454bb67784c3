use thiserror::Error;

/// Core error type for the Chatflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No flow graph is available for the project
    #[error("Flow graph not found: {0}")]
    MissingFlowGraph(String),

    /// A stored position or edge target points at a node that does not exist
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// The node type is not supported by this engine
    #[error("Unsupported node type: {0}")]
    UnsupportedNodeType(String),

    /// A question answer failed validation
    #[error("Validation failure: {0}")]
    ValidationFailure(String),

    /// A button reply did not match any awaited button
    #[error("Invalid button reply: {0}")]
    InvalidButtonReply(String),

    /// An external API call failed
    #[error("External API failure: {0}")]
    ExternalApiFailure(String),

    /// A URL template references a variable with no stored binding
    #[error("Missing template variable: {0}")]
    MissingTemplateVariable(String),

    /// The conversation state store failed
    #[error("State store failure: {0}")]
    StateStoreFailure(String),

    /// The messaging gateway failed to deliver
    #[error("Gateway send failure: {0}")]
    GatewaySend(String),

    /// The flow graph is structurally unusable (e.g. zero or multiple start nodes)
    #[error("Invalid flow graph: {0}")]
    InvalidFlowGraph(String),

    /// An auto-advancing chain exceeded the per-event step budget
    #[error("Step budget exhausted after {0} steps")]
    StepBudgetExhausted(usize),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<String> for EngineError {
    fn from(err: String) -> Self {
        EngineError::Other(err)
    }
}

impl From<&str> for EngineError {
    fn from(err: &str) -> Self {
        EngineError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (EngineError::MissingFlowGraph("proj1".to_string()), "Flow graph not found: proj1"),
            (EngineError::NodeNotFound("node7".to_string()), "Node not found: node7"),
            (EngineError::UnsupportedNodeType("webhook".to_string()), "Unsupported node type: webhook"),
            (EngineError::ValidationFailure("bad email".to_string()), "Validation failure: bad email"),
            (EngineError::InvalidButtonReply("nope".to_string()), "Invalid button reply: nope"),
            (EngineError::ExternalApiFailure("timeout".to_string()), "External API failure: timeout"),
            (EngineError::MissingTemplateVariable("city".to_string()), "Missing template variable: city"),
            (EngineError::StateStoreFailure("down".to_string()), "State store failure: down"),
            (EngineError::GatewaySend("rejected".to_string()), "Gateway send failure: rejected"),
            (EngineError::InvalidFlowGraph("no start".to_string()), "Invalid flow graph: no start"),
            (EngineError::StepBudgetExhausted(25), "Step budget exhausted after 25 steps"),
            (EngineError::Serialization("bad json".to_string()), "Serialization error: bad json"),
            (EngineError::Other("other_err".to_string()), "other_err"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: EngineError = json_error.into();

        match error {
            EngineError::Serialization(msg) => {
                assert!(msg.contains("expected value"));
            }
            _ => panic!("Expected Serialization variant"),
        }
    }

    #[test]
    fn test_from_string_and_str() {
        let error: EngineError = "boom".into();
        assert_eq!(error, EngineError::Other("boom".to_string()));

        let error: EngineError = String::from("boom").into();
        assert_eq!(error, EngineError::Other("boom".to_string()));
    }
}
