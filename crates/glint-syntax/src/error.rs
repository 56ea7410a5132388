//! Error types for grammar compilation and document analysis.

use glint_core::DocumentError;

use crate::rule::StateId;

/// Raised while compiling a syntax rule from its JSON definition.
///
/// No partial rule is retained on failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// The input was not valid JSON.
    #[error("invalid syntax rule json: {0}")]
    JsonInvalid(String),
    /// A required property is missing.
    #[error("missing required property `{0}`")]
    PropertyExpected(String),
    /// A property has the wrong shape or value.
    #[error("invalid property `{0}`")]
    PropertyInvalid(String),
    /// A state's merged pattern failed to compile.
    #[error("invalid pattern `{0}`")]
    PatternInvalid(String),
    /// A rule transitions to a state the grammar never defines.
    #[error("unknown state `{0}`")]
    StateInvalid(String),
    /// A rule file could not be read.
    #[error("failed to read syntax rule file: {0}")]
    Io(String),
}

/// Raised by the analyzer at runtime; bad input here is a caller bug, not a
/// recoverable condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzeError {
    #[error("no rules registered for state id {0}")]
    UnknownState(StateId),
    #[error(transparent)]
    Document(#[from] DocumentError),
}
