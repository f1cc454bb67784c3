//! Domain layer - flow graph model, session state, and capability contracts

/// Inbound event contract
pub mod event;

/// Flow graph model
pub mod flow_graph;

/// Messaging gateway capability
pub mod gateway;

/// Outbound HTTP capability and API mapping types
pub mod http;

/// Session state and store keying
pub mod session;

/// Conversation state store capability
pub mod store;
