//! The engine facade: compiled rules on one side, analyzed documents on the
//! other.

use std::collections::HashMap;
use std::path::Path;

use glint_core::Document;
use tracing::debug;

use crate::analyzer::DocumentAnalyzer;
use crate::error::{AnalyzeError, RuleError};
use crate::registry::SyntaxRegistry;

/// Binds syntax rules to documents: rules are selected by the document
/// URI's file extension and each loaded document gets its own analyzer.
#[derive(Default)]
pub struct HighlightEngine {
    registry: SyntaxRegistry,
    analyzers: HashMap<String, DocumentAnalyzer>,
}

impl HighlightEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile_syntax_from_json(&mut self, json: &str) -> Result<(), RuleError> {
        self.registry.compile_from_json(json)?;
        Ok(())
    }

    pub fn compile_syntax_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), RuleError> {
        self.registry.compile_from_file(path)?;
        Ok(())
    }

    pub fn registry(&self) -> &SyntaxRegistry {
        &self.registry
    }

    /// Loads a document and runs its first full analysis.
    ///
    /// Returns `None` when no registered rule matches the extension of the
    /// document's URI; that is a miss, not an error.
    pub fn load_document(
        &mut self,
        document: Document,
    ) -> Result<Option<&mut DocumentAnalyzer>, AnalyzeError> {
        let Some(rule) = extension_of(document.uri())
            .and_then(|ext| self.registry.rule_by_extension(ext))
        else {
            return Ok(None);
        };
        debug!(
            uri = document.uri(),
            rule = rule.name.as_str(),
            lines = document.line_count(),
            "loading document"
        );
        let uri = document.uri().to_string();
        let mut analyzer = DocumentAnalyzer::new(document, rule);
        analyzer.analyze_fully()?;
        self.analyzers.insert(uri.clone(), analyzer);
        Ok(self.analyzers.get_mut(&uri))
    }

    /// The analyzer of a previously loaded document.
    pub fn analyzer_mut(&mut self, uri: &str) -> Option<&mut DocumentAnalyzer> {
        self.analyzers.get_mut(uri)
    }

    pub fn analyzer(&self, uri: &str) -> Option<&DocumentAnalyzer> {
        self.analyzers.get(uri)
    }
}

/// The extension of a URI, including its leading dot.
fn extension_of(uri: &str) -> Option<&str> {
    uri.rfind('.').map(|idx| &uri[idx..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RULE: &str = r#"{
        "name": "digits",
        "fileExtension": ".d",
        "states": { "default": [ { "pattern": "[0-9]+", "style": "number" } ] }
    }"#;

    #[test]
    fn loads_documents_by_uri_extension() {
        let mut engine = HighlightEngine::new();
        engine.compile_syntax_from_json(RULE).unwrap();

        let analyzer = engine
            .load_document(Document::new("file.d", "a1"))
            .unwrap()
            .expect("extension is registered");
        assert_eq!(analyzer.highlight().lines.len(), 1);
        assert_eq!(analyzer.highlight().lines[0].spans.len(), 2);

        assert!(engine.analyzer("file.d").is_some());
        assert!(engine.analyzer_mut("other.d").is_none());
    }

    #[test]
    fn unknown_extension_is_a_miss_not_an_error() {
        let mut engine = HighlightEngine::new();
        engine.compile_syntax_from_json(RULE).unwrap();
        assert!(engine
            .load_document(Document::new("file.txt", "a"))
            .unwrap()
            .is_none());
        assert!(engine
            .load_document(Document::new("no-extension", "a"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn extension_includes_the_last_dot() {
        assert_eq!(extension_of("a/b/file.tar.gz"), Some(".gz"));
        assert_eq!(extension_of("file"), None);
    }
}
