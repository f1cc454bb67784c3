//!
//! Chatflow Core - the conversation flow engine for the Chatflow platform
//!
//! This crate interprets a directed graph of typed nodes (a "flow") in
//! response to inbound chat events, one event at a time, persisting the
//! user's position and collected variables in an expiring key-value store
//! between stateless webhook invocations. Transport, graph authoring, and
//! provider clients live outside this crate behind capability traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - flow graph model, session state, capability contracts
pub mod domain;

/// Application services - classification, execution, action resolution
pub mod application;

/// Engine configuration
pub mod settings;

/// Error types
pub mod error;

// Re-export key types
pub use error::EngineError;
pub use settings::EngineSettings;

pub use domain::event::InboundEvent;
pub use domain::flow_graph::{
    normalize_token, AnswerValidation, ButtonAction, ButtonSpec, FlowEdge, FlowGraph, FlowNode,
    NodeKind, NodeProperties,
};
pub use domain::gateway::{MessagingGateway, OutboundButton, MAX_BUTTONS_PER_MESSAGE};
pub use domain::http::{ApiRequest, ApiRequestSpec, ApiResponseKind, HttpFetcher, ResponseMapping};
pub use domain::session::{AwaitingButtons, ButtonChoice, SessionScope, SessionStore};
pub use domain::store::ConversationStateStore;

pub use application::actions::ActionResolver;
pub use application::classifier::{classify, Classification};
pub use application::engine::ConversationEngine;
