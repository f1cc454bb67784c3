//! Flow graph domain model
//!
//! A flow graph is the immutable, per-project conversation definition: typed
//! nodes joined by optionally labeled edges. It is supplied by an external
//! store, read once per execution, and never mutated by the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::http::{ApiRequestSpec, ResponseMapping};
use crate::EngineError;

/// Canonical form of a user-entered token or button label: trimmed,
/// lowercased, internal whitespace runs collapsed to underscores.
///
/// All label/reply comparisons in the engine go through this so that
/// equivalent spellings resolve to the same transition.
pub fn normalize_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// The closed set of node types the engine dispatches on.
///
/// Author-side types the engine does not know deserialize as `Unknown`
/// rather than failing the whole graph; executing one terminates the
/// session with a generic failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Entry point; a graph must have exactly one
    Start,
    /// Send a text message and continue
    Message,
    /// Branch on a keyword match against the inbound text
    Condition,
    /// Send an interactive button prompt and suspend
    Buttons,
    /// Ask for input, validate the answer, store it as a variable
    Question,
    /// Send media by URL and continue
    Media,
    /// Perform an external HTTP call and send the mapped result
    Api,
    /// Terminate the session
    End,
    /// Any node type this engine does not implement
    #[serde(other)]
    Unknown,
}

/// Answer validation applied by question nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnswerValidation {
    /// Accept any answer
    #[default]
    None,
    /// Require an email address
    Email,
    /// Require a phone number
    #[serde(rename = "phonenumber")]
    PhoneNumber,
    /// Require an http(s) URL
    Url,
}

/// A button attached to a buttons node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ButtonSpec {
    /// Authored reply identifier, if any
    pub id: Option<String>,

    /// Button label shown to the user
    pub title: String,

    /// Self-contained action payload; presence makes this a "smart" button
    pub action: Option<ButtonAction>,
}

impl Default for ButtonSpec {
    fn default() -> Self {
        Self {
            id: None,
            title: String::new(),
            action: None,
        }
    }
}

impl ButtonSpec {
    /// Reply identifier synthesized for buttons authored without one:
    /// `btn_<index>_<normalizedLabel>`.
    pub fn synthesized_id(&self, index: usize) -> String {
        format!("btn_{}_{}", index, normalize_token(&self.title))
    }

    /// Effective reply identifier sent to the provider
    pub fn reply_id(&self, index: usize) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => self.synthesized_id(index),
        }
    }
}

/// A smart-button action, independent of graph position
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonAction {
    /// Action discriminator, e.g. `FETCH_AND_SEND_MEDIA`
    #[serde(rename = "type")]
    pub kind: String,

    /// The external request to perform
    pub request: ApiRequestSpec,

    /// How the response maps to an outbound message
    #[serde(default)]
    pub response_mapping: ResponseMapping,
}

/// Media payload configured on a media node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSpec {
    /// Media URL
    pub url: String,

    /// Provider media type, e.g. `image` or `video`
    #[serde(rename = "type", default = "MediaSpec::default_kind")]
    pub kind: String,

    /// Optional caption
    #[serde(default)]
    pub caption: Option<String>,
}

impl MediaSpec {
    fn default_kind() -> String {
        "image".to_string()
    }
}

/// External call configured on an API node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallSpec {
    /// The request, with a URL template that may embed `{{variable}}` placeholders
    pub request: ApiRequestSpec,

    /// How the response maps to an outbound message
    #[serde(default)]
    pub response_mapping: ResponseMapping,
}

/// Type-specific node configuration.
///
/// All fields are optional on the wire; each node kind reads only the fields
/// it cares about and treats the rest as absent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeProperties {
    /// Text sent by message, buttons, question and end nodes
    pub message: Option<String>,

    /// Comma-separated keyword list for condition nodes
    pub keywords: Option<String>,

    /// Buttons for buttons nodes
    pub buttons: Vec<ButtonSpec>,

    /// Answer validation for question nodes
    pub validation: AnswerValidation,

    /// Variable name a question node stores its answer under
    pub save_as: Option<String>,

    /// Media payload for media nodes
    pub media: Option<MediaSpec>,

    /// External call for api nodes
    pub api: Option<ApiCallSpec>,

    /// Stop synchronous advancement after this node and wait for the next event
    pub wait_for_user_reply: bool,
}

/// Wire wrapper around node properties (`{id, type, data: {properties}}`)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeData {
    /// Type-specific configuration
    #[serde(default)]
    pub properties: NodeProperties,
}

/// One node of a flow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    /// Node identifier, unique within the graph
    pub id: String,

    /// Node type the engine dispatches on
    #[serde(rename = "type")]
    pub kind: NodeKind,

    /// Authoring-tool payload carrying the properties
    #[serde(default)]
    pub data: NodeData,
}

impl FlowNode {
    /// Type-specific configuration for this node
    pub fn properties(&self) -> &NodeProperties {
        &self.data.properties
    }
}

/// One directed edge of a flow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEdge {
    /// Source node id
    pub source: String,

    /// Target node id
    pub target: String,

    /// Branch label; `None` marks the default transition
    #[serde(default)]
    pub label: Option<String>,
}

/// An immutable conversation flow definition for one project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraph {
    /// All nodes
    pub nodes: Vec<FlowNode>,

    /// All edges
    pub edges: Vec<FlowEdge>,
}

impl FlowGraph {
    /// The unique start node.
    ///
    /// Zero or multiple start nodes are a fatal configuration error detected
    /// deterministically before any side effect.
    pub fn start_node(&self) -> Result<&FlowNode, EngineError> {
        let mut starts = self.nodes.iter().filter(|n| n.kind == NodeKind::Start);
        match (starts.next(), starts.next()) {
            (Some(node), None) => Ok(node),
            (None, _) => Err(EngineError::InvalidFlowGraph(
                "flow graph has no start node".to_string(),
            )),
            (Some(_), Some(_)) => Err(EngineError::InvalidFlowGraph(
                "flow graph has multiple start nodes".to_string(),
            )),
        }
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The first end node defined in the graph, if any
    pub fn end_node(&self) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.kind == NodeKind::End)
    }

    /// Target of the default (unlabeled) edge out of `source`
    pub fn default_target(&self, source: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.source == source && e.label.as_deref().map_or(true, str::is_empty))
            .map(|e| e.target.as_str())
    }

    /// Target of the edge out of `source` whose normalized label matches
    /// `label`, falling back to the default edge when no label matches.
    pub fn labeled_target(&self, source: &str, label: &str) -> Option<&str> {
        let wanted = normalize_token(label);
        self.edges
            .iter()
            .find(|e| {
                e.source == source
                    && e.label
                        .as_deref()
                        .map_or(false, |l| normalize_token(l) == wanted)
            })
            .map(|e| e.target.as_str())
            .or_else(|| self.default_target(source))
    }

    /// Find the button (and its owning node) matching a provider reply id or
    /// a normalized title, anywhere in the graph.
    ///
    /// Used for smart-action dispatch, which is independent of position.
    pub fn find_button(
        &self,
        reply_id: Option<&str>,
        title: Option<&str>,
    ) -> Option<(&FlowNode, &ButtonSpec)> {
        let wanted_title = title.map(normalize_token);
        for node in &self.nodes {
            for (index, button) in node.properties().buttons.iter().enumerate() {
                let id_match = reply_id
                    .map(|id| button.reply_id(index) == id)
                    .unwrap_or(false);
                let title_match = wanted_title
                    .as_deref()
                    .map(|t| normalize_token(&button.title) == t)
                    .unwrap_or(false);
                if id_match || title_match {
                    return Some((node, button));
                }
            }
        }
        None
    }

    /// Scan every buttons node in the graph for a button whose normalized
    /// label or synthesized id matches the normalized token.
    pub fn scan_buttons(&self, token: &str) -> Option<(&FlowNode, &ButtonSpec)> {
        for node in self.nodes.iter().filter(|n| n.kind == NodeKind::Buttons) {
            for (index, button) in node.properties().buttons.iter().enumerate() {
                if normalize_token(&button.title) == token || button.synthesized_id(index) == token
                {
                    return Some((node, button));
                }
            }
        }
        None
    }

    /// Defensive structural checks: unique node ids and edges that reference
    /// existing nodes. This is not full authoring-time validation.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(EngineError::InvalidFlowGraph(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }

        for edge in &self.edges {
            if !ids.contains(edge.source.as_str()) {
                return Err(EngineError::InvalidFlowGraph(format!(
                    "edge references missing source node: {}",
                    edge.source
                )));
            }
            if !ids.contains(edge.target.as_str()) {
                return Err(EngineError::InvalidFlowGraph(format!(
                    "edge references missing target node: {}",
                    edge.target
                )));
            }
        }

        self.start_node().map(|_| ())
    }
}
