//! A registry of compiled syntax rules, looked up by name or file extension.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::RuleError;
use crate::rule::SyntaxRule;

/// Owns every compiled [`SyntaxRule`]; rules are shared read-only with the
/// analyzers that use them. Compiling a rule under an existing name replaces
/// the previous one.
#[derive(Debug, Default)]
pub struct SyntaxRegistry {
    rules: HashMap<String, Arc<SyntaxRule>>,
}

impl SyntaxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles a rule definition and registers it under its own name.
    pub fn compile_from_json(&mut self, json: &str) -> Result<Arc<SyntaxRule>, RuleError> {
        let rule = Arc::new(SyntaxRule::from_json(json)?);
        debug!(name = rule.name.as_str(), "registered syntax rule");
        self.rules.insert(rule.name.clone(), Arc::clone(&rule));
        Ok(rule)
    }

    /// Reads a rule definition file and registers it.
    pub fn compile_from_file(&mut self, path: impl AsRef<Path>) -> Result<Arc<SyntaxRule>, RuleError> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|err| RuleError::Io(err.to_string()))?;
        self.compile_from_json(&json)
    }

    /// Looks a rule up by grammar name, e.g. `java`.
    pub fn rule_by_name(&self, name: &str) -> Option<Arc<SyntaxRule>> {
        self.rules.get(name).cloned()
    }

    /// Looks a rule up by file extension, with or without the leading dot.
    /// Unknown extensions are a miss, not an error.
    pub fn rule_by_extension(&self, extension: &str) -> Option<Arc<SyntaxRule>> {
        self.rules
            .values()
            .find(|rule| rule.matches_extension(extension))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
