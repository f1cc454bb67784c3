//! Application services - classification, execution, and action resolution

/// Smart-button action resolution
pub mod actions;

/// Input classification
pub mod classifier;

/// The conversation execution engine
pub mod engine;

/// URL templating against variable bindings
pub mod templating;

/// Question answer validation
pub mod validation;
