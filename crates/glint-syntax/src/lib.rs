//! Grammar-driven incremental syntax highlighting.
//!
//! This crate provides three layers:
//! - [`SyntaxRule`]: a declarative grammar (JSON states of regex token
//!   rules) compiled into one merged, capture-group-indexed regex per state.
//! - [`DocumentAnalyzer`]: the stateful tokenizer producing per-line
//!   [`TokenSpan`] lists and keeping them up to date across edits by
//!   re-tokenizing only until the per-line states stabilize.
//! - [`HighlightEngine`]: a facade that registers rules and binds them to
//!   documents by file extension.
//!
//! ```
//! use glint_core::Document;
//! use glint_syntax::HighlightEngine;
//!
//! let mut engine = HighlightEngine::new();
//! engine
//!     .compile_syntax_from_json(
//!         r#"{
//!             "name": "digits",
//!             "fileExtension": ".d",
//!             "states": { "default": [ { "pattern": "[0-9]+", "style": "number" } ] }
//!         }"#,
//!     )
//!     .unwrap();
//! let analyzer = engine
//!     .load_document(Document::new("file.d", "a 42"))
//!     .unwrap()
//!     .expect("rule registered for .d");
//! let spans = &analyzer.highlight().lines[0].spans;
//! assert_eq!(spans[1].style.as_deref(), Some("number"));
//! ```

mod analyzer;
mod engine;
mod error;
mod registry;
mod rule;

pub use analyzer::{DocumentAnalyzer, DocumentHighlight, LineHighlight, TokenSpan};
pub use engine::HighlightEngine;
pub use error::{AnalyzeError, RuleError};
pub use registry::SyntaxRegistry;
pub use rule::{StateId, StateRule, SyntaxRule, TokenRule, DEFAULT_STATE, DEFAULT_STATE_NAME};
