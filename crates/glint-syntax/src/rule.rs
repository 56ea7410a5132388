//! The syntax rule data model and its compiler.
//!
//! A syntax rule is defined as JSON: named tokenizer states, each an ordered
//! list of token rules (a regex pattern, a style mapping, an optional state
//! transition). Compilation resolves `${variable}` substitutions, assigns
//! integer state IDs, merges each state's patterns into one alternation of
//! wrapping capture groups, and compiles that alternation once. At match
//! time the winning rule is identified by which wrapping group participated,
//! which is what the per-rule group offsets recorded here are for.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::RuleError;

/// Integer handle for a tokenizer state.
pub type StateId = u32;

/// The state every document starts in.
pub const DEFAULT_STATE: StateId = 0;
pub const DEFAULT_STATE_NAME: &str = "default";

/// One tokenizing rule inside a state.
#[derive(Debug, Clone)]
pub struct TokenRule {
    /// Regex source after variable substitution.
    pub pattern: String,
    /// Whether a match may extend onto following lines. Explicit `multiLine`
    /// attribute, else inferred: the rule transitions to a non-default state.
    pub multi_line: bool,
    /// Transition target as written in the definition.
    pub goto_state_name: Option<String>,
    /// Resolved transition target.
    pub goto_state: Option<StateId>,
    /// Capture groups inside `pattern`, not counting the wrapping group.
    pub group_count: u32,
    /// Index of this rule's wrapping group in the state's merged pattern.
    pub group_offset: u32,
    styles: HashMap<u32, String>,
}

impl TokenRule {
    /// Style for a capture group; group 0 is the whole match.
    pub fn group_style(&self, group: u32) -> Option<&str> {
        self.styles.get(&group).map(String::as_str)
    }
}

/// A tokenizer state: its rules and their merged, compiled pattern.
#[derive(Debug, Clone)]
pub struct StateRule {
    pub name: String,
    pub token_rules: Vec<TokenRule>,
    /// `(R₀)|(R₁)|…` over the state's token rule patterns.
    pub merged_pattern: String,
    pub regex: Regex,
    /// Total capture groups in `merged_pattern`.
    pub group_count: u32,
}

/// A compiled grammar: named states reachable by integer ID, plus the file
/// extensions it applies to.
#[derive(Debug, Clone)]
pub struct SyntaxRule {
    pub name: String,
    file_extensions: Vec<String>,
    variables: HashMap<String, String>,
    state_ids: HashMap<String, StateId>,
    states: HashMap<StateId, StateRule>,
}

impl SyntaxRule {
    /// Compiles a syntax rule from its JSON definition.
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let root: Value =
            serde_json::from_str(json).map_err(|err| RuleError::JsonInvalid(err.to_string()))?;
        Self::from_value(&root)
    }

    /// Compiles a syntax rule from an already-parsed JSON tree.
    pub fn from_value(root: &Value) -> Result<Self, RuleError> {
        let root = root
            .as_object()
            .ok_or_else(|| RuleError::JsonInvalid("definition must be an object".to_string()))?;

        let name = parse_name(root)?;
        let file_extensions = parse_file_extensions(root)?;
        let variables = parse_variables(root)?;
        let (state_ids, states) = parse_states(root, &variables)?;

        debug!(
            name = name.as_str(),
            states = states.len(),
            extensions = file_extensions.len(),
            "compiled syntax rule"
        );

        Ok(Self {
            name,
            file_extensions,
            variables,
            state_ids,
            states,
        })
    }

    pub fn state(&self, id: StateId) -> Option<&StateRule> {
        self.states.get(&id)
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.state_ids.get(name).copied()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn extensions(&self) -> &[String] {
        &self.file_extensions
    }

    /// Whether this rule applies to files with the given extension; the
    /// probe may be given with or without its leading dot.
    pub fn matches_extension(&self, extension: &str) -> bool {
        let normalized = normalize_extension(extension);
        self.file_extensions.iter().any(|ext| *ext == normalized)
    }
}

/// Extensions are stored and compared with a leading dot.
pub(crate) fn normalize_extension(extension: &str) -> String {
    if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{extension}")
    }
}

fn parse_name(root: &serde_json::Map<String, Value>) -> Result<String, RuleError> {
    match root.get("name") {
        Some(Value::String(name)) => Ok(name.clone()),
        Some(_) => Err(RuleError::PropertyInvalid("name".to_string())),
        None => Err(RuleError::PropertyExpected("name".to_string())),
    }
}

fn parse_file_extensions(root: &serde_json::Map<String, Value>) -> Result<Vec<String>, RuleError> {
    if let Some(value) = root.get("fileExtensions") {
        let items = value
            .as_array()
            .ok_or_else(|| RuleError::PropertyInvalid("fileExtensions".to_string()))?;
        let mut extensions = Vec::with_capacity(items.len());
        for item in items {
            let ext = item
                .as_str()
                .ok_or_else(|| RuleError::PropertyInvalid("fileExtensions".to_string()))?;
            extensions.push(normalize_extension(ext));
        }
        return Ok(extensions);
    }
    match root.get("fileExtension") {
        Some(Value::String(ext)) => Ok(vec![normalize_extension(ext)]),
        Some(_) => Err(RuleError::PropertyInvalid("fileExtension".to_string())),
        None => Err(RuleError::PropertyExpected(
            "fileExtensions or fileExtension".to_string(),
        )),
    }
}

fn parse_variables(
    root: &serde_json::Map<String, Value>,
) -> Result<HashMap<String, String>, RuleError> {
    let Some(value) = root.get("variables") else {
        return Ok(HashMap::new());
    };
    let object = value
        .as_object()
        .ok_or_else(|| RuleError::PropertyInvalid("variables".to_string()))?;

    let mut variables = HashMap::with_capacity(object.len());
    for (key, value) in object {
        let value = value
            .as_str()
            .ok_or_else(|| RuleError::PropertyInvalid(key.clone()))?;
        variables.insert(key.clone(), value.to_string());
    }

    // Variables may reference each other in either direction; iterate the
    // substitution to a fixed point, bounded by the variable count.
    for _ in 0..variables.len() {
        let snapshot = variables.clone();
        let mut changed = false;
        for value in variables.values_mut() {
            let substituted = substitute_variables(value, &snapshot);
            if substituted != *value {
                *value = substituted;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    Ok(variables)
}

/// Replaces `${name}` references; unknown names stay literal.
fn substitute_variables(text: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find("${") {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 2..];
        match after.find('}').map(|close| &after[..close]) {
            Some(key) if variables.contains_key(key) => {
                out.push_str(&variables[key]);
                rest = &after[key.len() + 1..];
            }
            _ => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

struct ParsedRule {
    pattern: String,
    styles: HashMap<u32, String>,
    goto_state_name: Option<String>,
    explicit_multi_line: Option<bool>,
}

type StateTables = (HashMap<String, StateId>, HashMap<StateId, StateRule>);

fn parse_states(
    root: &serde_json::Map<String, Value>,
    variables: &HashMap<String, String>,
) -> Result<StateTables, RuleError> {
    let states_json = root
        .get("states")
        .ok_or_else(|| RuleError::PropertyExpected("states".to_string()))?
        .as_object()
        .ok_or_else(|| RuleError::PropertyInvalid("states".to_string()))?;
    if !states_json.contains_key(DEFAULT_STATE_NAME) {
        return Err(RuleError::PropertyExpected("states.default".to_string()));
    }

    // `serde_json`'s preserve_order feature keeps the map in declaration
    // order, so IDs beyond `default` are handed out 1, 2, … as states are
    // first encountered in the definition.
    let mut state_ids = HashMap::new();
    state_ids.insert(DEFAULT_STATE_NAME.to_string(), DEFAULT_STATE);
    let mut next_id: StateId = 1;
    let mut parsed: Vec<(StateId, String, Vec<ParsedRule>)> = Vec::new();

    for (state_name, rules_json) in states_json {
        let id = *state_ids.entry(state_name.clone()).or_insert_with(|| {
            let id = next_id;
            next_id += 1;
            id
        });
        let rules = parse_state_rules(state_name, rules_json, variables)?;
        parsed.push((id, state_name.clone(), rules));
    }

    let mut states = HashMap::with_capacity(parsed.len());
    for (id, name, rules) in parsed {
        let state = build_state_rule(name, rules, &state_ids)?;
        trace!(
            state = state.name.as_str(),
            pattern = state.merged_pattern.as_str(),
            "merged state pattern"
        );
        states.insert(id, state);
    }
    Ok((state_ids, states))
}

fn parse_state_rules(
    state_name: &str,
    rules_json: &Value,
    variables: &HashMap<String, String>,
) -> Result<Vec<ParsedRule>, RuleError> {
    let items = rules_json
        .as_array()
        .ok_or_else(|| RuleError::PropertyInvalid(state_name.to_string()))?;

    let mut rules = Vec::with_capacity(items.len());
    for item in items {
        let object = item
            .as_object()
            .ok_or_else(|| RuleError::PropertyInvalid(state_name.to_string()))?;

        let pattern = match object.get("pattern") {
            Some(Value::String(pattern)) => substitute_variables(pattern, variables),
            Some(_) => return Err(RuleError::PropertyInvalid("pattern".to_string())),
            None => return Err(RuleError::PropertyExpected("pattern".to_string())),
        };

        let styles = parse_styles(object)?;

        let goto_state_name = match object.get("state") {
            Some(Value::String(name)) => Some(name.clone()),
            Some(_) => return Err(RuleError::PropertyInvalid("state".to_string())),
            None => None,
        };

        let explicit_multi_line = match object.get("multiLine") {
            Some(Value::Bool(flag)) => Some(*flag),
            Some(_) => return Err(RuleError::PropertyInvalid("multiLine".to_string())),
            None => None,
        };

        rules.push(ParsedRule {
            pattern,
            styles,
            goto_state_name,
            explicit_multi_line,
        });
    }
    Ok(rules)
}

fn parse_styles(object: &serde_json::Map<String, Value>) -> Result<HashMap<u32, String>, RuleError> {
    match (object.get("style"), object.get("styles")) {
        (Some(Value::String(style)), None) => {
            Ok(HashMap::from([(0, style.clone())]))
        }
        (Some(_), None) => Err(RuleError::PropertyInvalid("style".to_string())),
        (None, Some(Value::Array(items))) => {
            if items.is_empty() || items.len() % 2 != 0 {
                return Err(RuleError::PropertyInvalid("styles".to_string()));
            }
            let mut styles = HashMap::with_capacity(items.len() / 2);
            for pair in items.chunks(2) {
                let group = pair[0]
                    .as_u64()
                    .ok_or_else(|| RuleError::PropertyInvalid("styles".to_string()))?;
                let style = pair[1]
                    .as_str()
                    .ok_or_else(|| RuleError::PropertyInvalid("styles".to_string()))?;
                styles.insert(group as u32, style.to_string());
            }
            Ok(styles)
        }
        (None, Some(_)) => Err(RuleError::PropertyInvalid("styles".to_string())),
        // exactly one of the two spellings must be present
        _ => Err(RuleError::PropertyInvalid("style or styles".to_string())),
    }
}

fn build_state_rule(
    name: String,
    rules: Vec<ParsedRule>,
    state_ids: &HashMap<String, StateId>,
) -> Result<StateRule, RuleError> {
    let mut token_rules = Vec::with_capacity(rules.len());
    let mut offset: u32 = 1;
    for rule in rules {
        let goto_state = match &rule.goto_state_name {
            Some(target) => Some(
                state_ids
                    .get(target)
                    .copied()
                    .ok_or_else(|| RuleError::StateInvalid(target.clone()))?,
            ),
            None => None,
        };
        let multi_line = rule
            .explicit_multi_line
            .unwrap_or_else(|| goto_state.is_some_and(|state| state != DEFAULT_STATE));
        let group_count = count_capture_groups(&rule.pattern);
        token_rules.push(TokenRule {
            pattern: rule.pattern,
            multi_line,
            goto_state_name: rule.goto_state_name,
            goto_state,
            group_count,
            group_offset: offset,
            styles: rule.styles,
        });
        offset += 1 + group_count;
    }

    let merged_pattern = token_rules
        .iter()
        .map(|rule| format!("({})", rule.pattern))
        .collect::<Vec<_>>()
        .join("|");
    let regex = Regex::new(&merged_pattern)
        .map_err(|_| RuleError::PatternInvalid(merged_pattern.clone()))?;

    Ok(StateRule {
        name,
        token_rules,
        merged_pattern,
        regex,
        group_count: offset - 1,
    })
}

/// Counts capture groups in a pattern source: `(` that is not escaped, does
/// not open a `(?…` construct, and does not sit inside a character class.
fn count_capture_groups(pattern: &str) -> u32 {
    let bytes = pattern.as_bytes();
    let mut count = 0;
    let mut in_class = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'(' if !in_class && bytes.get(i + 1) != Some(&b'?') => count += 1,
            _ => {}
        }
        i += 1;
    }
    count
}
