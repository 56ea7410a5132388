//! The stateful, line-by-line incremental tokenizer.
//!
//! Every line is tokenized under the state left behind by the previous line;
//! the per-line end states are recorded so an edit only re-tokenizes the
//! lines whose entering state could have changed. Matches that carry their
//! region onto following lines (block comments, here-docs) are tracked as
//! multi-line contexts keyed by the state they switch into.

use std::collections::HashMap;
use std::sync::Arc;

use glint_core::{utf8, Document, TextPosition, TextRange};
use serde::Serialize;
use tracing::trace;

use crate::error::AnalyzeError;
use crate::rule::{StateId, SyntaxRule, DEFAULT_STATE};

/// One styled region of a line.
///
/// Spans on a line are contiguous, non-overlapping and cover every
/// character; a span that closes a multi-line region starts at the opening
/// position on an earlier line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSpan {
    pub range: TextRange,
    pub matched_text: String,
    /// `None` marks text no rule classified.
    pub style: Option<String>,
    /// State in effect when the span started.
    pub state: StateId,
    /// State entered after the span, if the matched rule transitions.
    pub goto_state: Option<StateId>,
}

/// The ordered spans of one line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineHighlight {
    pub spans: Vec<TokenSpan>,
}

/// Highlights for every line of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentHighlight {
    pub lines: Vec<LineHighlight>,
}

/// Outcome of running a state's merged regex at a position.
///
/// `start`/`length` describe the styled span, which is the capture group
/// that provided the style when a rule styles a sub-capture; `whole_start`
/// is where the full match began.
#[derive(Debug)]
struct MatchResult {
    /// Character offset of the styled span.
    start: usize,
    /// Styled span length in characters.
    length: usize,
    start_byte: usize,
    end_byte: usize,
    /// Character offset of the full match.
    whole_start: usize,
    whole_start_byte: usize,
    /// Index of the owning rule within its state.
    rule_index: usize,
    multi_line_rule: bool,
    style: Option<String>,
    goto_state: Option<StateId>,
    matched_text: String,
}

/// A multi-line region opened on an earlier line and not yet closed.
#[derive(Debug, Clone)]
struct MultiLineContext {
    /// The state whose rules can close the region (also this context's key).
    state: StateId,
    style: Option<String>,
    start: TextPosition,
    accumulated_text: String,
}

/// A match that closes an open multi-line region.
struct RegionExit {
    end_char: usize,
    end_byte: usize,
    goto_state: StateId,
}

/// Tokenizes one document against one compiled syntax rule and keeps the
/// result up to date across edits.
pub struct DocumentAnalyzer {
    document: Document,
    rule: Arc<SyntaxRule>,
    highlight: DocumentHighlight,
    /// State in effect after each line.
    line_states: Vec<StateId>,
    contexts: HashMap<StateId, MultiLineContext>,
}

impl DocumentAnalyzer {
    pub fn new(document: Document, rule: Arc<SyntaxRule>) -> Self {
        let count = document.line_count();
        Self {
            document,
            rule,
            highlight: DocumentHighlight {
                lines: vec![LineHighlight::default(); count],
            },
            line_states: vec![DEFAULT_STATE; count],
            contexts: HashMap::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn syntax_rule(&self) -> &Arc<SyntaxRule> {
        &self.rule
    }

    pub fn highlight(&self) -> &DocumentHighlight {
        &self.highlight
    }

    /// State in effect after `line`.
    pub fn line_state(&self, line: usize) -> Option<StateId> {
        self.line_states.get(line).copied()
    }

    /// Tokenizes the whole document from scratch.
    pub fn analyze_fully(&mut self) -> Result<&DocumentHighlight, AnalyzeError> {
        let count = self.document.line_count();
        self.contexts.clear();
        self.line_states = vec![DEFAULT_STATE; count];
        let mut lines = Vec::with_capacity(count);
        let mut state = DEFAULT_STATE;
        for line in 0..count {
            lines.push(self.analyze_line_with_state(line, state)?);
            state = self.line_states[line];
        }
        self.highlight = DocumentHighlight { lines };
        Ok(&self.highlight)
    }

    /// Re-tokenizes a single line under the state its predecessor left
    /// behind and refreshes the stored highlight for it.
    pub fn analyze_line(&mut self, line: usize) -> Result<&LineHighlight, AnalyzeError> {
        self.document.line(line)?;
        let start_state = if line == 0 {
            DEFAULT_STATE
        } else {
            self.line_states[line - 1]
        };
        let refreshed = self.analyze_line_with_state(line, start_state)?;
        self.highlight.lines[line] = refreshed;
        Ok(&self.highlight.lines[line])
    }

    /// Applies an edit to the document and re-tokenizes the affected suffix
    /// until the per-line states stabilize.
    pub fn update_highlight(
        &mut self,
        range: TextRange,
        new_text: &str,
    ) -> Result<&DocumentHighlight, AnalyzeError> {
        let old_count = self.document.line_count();
        self.document.patch(range, new_text)?;
        let new_count = self.document.line_count();

        let start_line = range.start.line.min(old_count - 1);
        let end_line_old = range.end.line.min(old_count - 1);

        // Realign the per-line records with the patched line vector: the
        // replaced slots are respliced to the new number of lines so the
        // untouched suffix keeps lining up with its (shifted) lines.
        let suffix = old_count - end_line_old - 1;
        let refreshed = new_count - start_line - suffix;
        self.line_states.splice(
            start_line..old_count - suffix,
            std::iter::repeat(DEFAULT_STATE).take(refreshed),
        );
        self.highlight.lines.splice(
            start_line..old_count - suffix,
            std::iter::repeat(LineHighlight::default()).take(refreshed),
        );

        // Regions opened at or after the edited line are re-discovered by
        // the rescan below.
        self.contexts.retain(|_, ctx| ctx.start.line < start_line);

        let new_newlines = new_text.matches('\n').count();
        let line_delta = new_count as isize - old_count as isize;
        let end_bound = (start_line + new_newlines)
            .max((end_line_old as isize + line_delta).max(0) as usize);

        // An open region whose accumulator was dropped (its closing match
        // was consumed by an earlier pass) must be re-entered from its
        // opening line, or the resume step would tokenize the continuation
        // under the wrong rules.
        let mut first = start_line;
        while first > 0 {
            let entering = self.line_states[first - 1];
            if entering == DEFAULT_STATE || self.contexts.contains_key(&entering) {
                break;
            }
            first -= 1;
        }

        let mut state = if first > 0 {
            self.line_states[first - 1]
        } else {
            DEFAULT_STATE
        };
        let mut line = first;
        while line < new_count {
            let old_state = self.line_states[line];
            let refreshed_line = self.analyze_line_with_state(line, state)?;
            self.highlight.lines[line] = refreshed_line;
            state = self.line_states[line];

            // Past the edited region and the end state is unchanged: the
            // cached tail is still valid, unless an open region that began
            // inside the edit could have moved its start position.
            let stable = line >= end_bound
                && old_state == state
                && self.contexts.values().all(|ctx| ctx.start.line < start_line);
            line += 1;
            if stable && self.tail_consistent(line) {
                break;
            }
        }
        trace!(
            first,
            stopped = line,
            total = new_count,
            "incremental update settled"
        );
        Ok(&self.highlight)
    }

    /// Verifies that every cached line past `from` was tokenized under the
    /// state its predecessor now ends in.
    fn tail_consistent(&self, from: usize) -> bool {
        (from..self.line_states.len()).all(|line| {
            let entering = if line == 0 {
                DEFAULT_STATE
            } else {
                self.line_states[line - 1]
            };
            // Empty lines record no spans; their end state doubles as the
            // entering state since nothing changes it.
            let recorded = self.highlight.lines[line]
                .spans
                .first()
                .map(|span| span.state)
                .unwrap_or(self.line_states[line]);
            recorded == entering
        })
    }

    fn analyze_line_with_state(
        &mut self,
        line: usize,
        start_state: StateId,
    ) -> Result<LineHighlight, AnalyzeError> {
        let text = self.document.line(line)?.to_string();
        let char_len = utf8::char_count(&text);
        let mut spans = Vec::new();
        let mut state = start_state;

        if char_len == 0 {
            self.line_states[line] = state;
            return Ok(LineHighlight { spans });
        }

        // Character and byte cursors advance together so no per-character
        // offset conversions happen in the loop below.
        let mut pos = 0usize;
        let mut byte_pos = 0usize;

        if self.contexts.contains_key(&state) {
            match self.find_region_exit(&text, state)? {
                Some(exit) => {
                    let ctx = self.contexts.remove(&state).expect("context present");
                    trace!(
                        line,
                        opened = %ctx.start,
                        pending = ctx.accumulated_text.len(),
                        "closed multi-line region"
                    );
                    // The closing span runs one character past the closing
                    // match; scanning resumes there in the new state.
                    let end_col = (exit.end_char + 1).min(char_len);
                    let end_byte = if exit.end_byte < text.len() {
                        exit.end_byte + char_width(&text, exit.end_byte)
                    } else {
                        text.len()
                    };
                    spans.push(TokenSpan {
                        range: span_range(ctx.start, TextPosition::new(line, end_col)),
                        matched_text: text[..end_byte].to_string(),
                        style: ctx.style,
                        state: ctx.state,
                        goto_state: Some(exit.goto_state),
                    });
                    state = exit.goto_state;
                    pos = end_col;
                    byte_pos = end_byte;
                }
                None => {
                    let ctx = self.contexts.get_mut(&state).expect("context present");
                    ctx.accumulated_text.push('\n');
                    ctx.accumulated_text.push_str(&text);
                    let style = ctx.style.clone();
                    spans.push(TokenSpan {
                        range: span_range(
                            TextPosition::new(line, 0),
                            TextPosition::new(line, char_len),
                        ),
                        matched_text: text,
                        style,
                        state,
                        goto_state: None,
                    });
                    self.line_states[line] = state;
                    return Ok(LineHighlight { spans });
                }
            }
        }

        while pos < char_len {
            let Some(m) = self.match_at(&text, pos, byte_pos, state)? else {
                spans.push(unclassified(line, pos, char_len, &text[byte_pos..], state));
                break;
            };

            if m.start > pos {
                spans.push(unclassified(
                    line,
                    pos,
                    m.start,
                    &text[byte_pos..m.start_byte],
                    state,
                ));
                pos = m.start;
                byte_pos = m.start_byte;
            }

            if m.length == 0 {
                // A zero-width match must not stall the scan: classify one
                // character as plain text and move on.
                let step = char_width(&text, byte_pos);
                spans.push(unclassified(
                    line,
                    pos,
                    pos + 1,
                    &text[byte_pos..byte_pos + step],
                    state,
                ));
                pos += 1;
                byte_pos += step;
                continue;
            }

            let reaches_eol = m.start + m.length == char_len;
            let crosses_lines = m.multi_line_rule
                || (reaches_eol && m.goto_state.is_some_and(|s| s != DEFAULT_STATE));
            if crosses_lines {
                if let Some(goto) = m.goto_state {
                    // Open a region: the rest of the line takes the match's
                    // style and the region carries into the next line.
                    trace!(line, rule = m.rule_index, goto, "opened multi-line region");
                    self.contexts.insert(
                        goto,
                        MultiLineContext {
                            state: goto,
                            style: m.style.clone(),
                            start: TextPosition::new(line, m.start),
                            accumulated_text: text[m.start_byte..].to_string(),
                        },
                    );
                    spans.push(TokenSpan {
                        range: span_range(
                            TextPosition::new(line, m.start),
                            TextPosition::new(line, char_len),
                        ),
                        matched_text: text[m.start_byte..].to_string(),
                        style: m.style,
                        state,
                        goto_state: Some(goto),
                    });
                    state = goto;
                    break;
                }
            }

            spans.push(TokenSpan {
                range: span_range(
                    TextPosition::new(line, m.start),
                    TextPosition::new(line, m.start + m.length),
                ),
                matched_text: m.matched_text,
                style: m.style,
                state,
                goto_state: m.goto_state,
            });
            pos = m.start + m.length;
            byte_pos = m.end_byte;
            if let Some(goto) = m.goto_state {
                if goto != DEFAULT_STATE {
                    state = goto;
                }
            }
        }

        self.line_states[line] = state;
        Ok(LineHighlight { spans })
    }

    /// Searches an open region's line for the first match that transitions
    /// out of the region's state.
    ///
    /// Interior rules can overlap the closing rule (a catch-all like `\s\S`
    /// matches across the `*/` of a block comment), so each non-transitioning
    /// match is skipped by stepping one character past its start rather than
    /// past its end.
    fn find_region_exit(
        &self,
        text: &str,
        state: StateId,
    ) -> Result<Option<RegionExit>, AnalyzeError> {
        let mut from_char = 0;
        let mut from_byte = 0;
        while let Some(m) = self.match_at(text, from_char, from_byte, state)? {
            if let Some(goto) = m.goto_state {
                return Ok(Some(RegionExit {
                    end_char: m.start + m.length,
                    end_byte: m.end_byte,
                    goto_state: goto,
                }));
            }
            from_char = m.whole_start + 1;
            from_byte = m.whole_start_byte + char_width(text, m.whole_start_byte);
            if from_byte > text.len() {
                break;
            }
        }
        Ok(None)
    }

    /// Runs the state's merged regex from a byte offset and maps the result
    /// back to the owning token rule.
    fn match_at(
        &self,
        text: &str,
        from_char: usize,
        from_byte: usize,
        state: StateId,
    ) -> Result<Option<MatchResult>, AnalyzeError> {
        let state_rule = self
            .rule
            .state(state)
            .ok_or(AnalyzeError::UnknownState(state))?;
        let Some(caps) = state_rule.regex.captures_at(text, from_byte) else {
            return Ok(None);
        };
        let whole = caps.get(0).expect("group 0 always participates");

        // The merged pattern is an alternation of one wrapping group per
        // rule; the owner is the first rule whose wrapping group covers the
        // whole match. Earlier rules win ties by alternation preference.
        let owner = state_rule.token_rules.iter().enumerate().find(|(_, rule)| {
            caps.get(rule.group_offset as usize)
                .is_some_and(|g| g.start() == whole.start() && g.end() == whole.end())
        });
        let Some((rule_index, rule)) = owner else {
            return Ok(None);
        };

        // An explicitly styled capture inside the rule narrows the span to
        // that capture; otherwise the whole match takes the rule's default
        // style.
        let mut selected = whole;
        let mut style = rule.group_style(0);
        for local in 1..=rule.group_count {
            let merged_index = (rule.group_offset + local) as usize;
            if let (Some(group), Some(group_style)) =
                (caps.get(merged_index), rule.group_style(local))
            {
                selected = group;
                style = Some(group_style);
                break;
            }
        }

        let whole_start = from_char + utf8::char_count(&text[from_byte..whole.start()]);
        let start = whole_start + utf8::char_count(&text[whole.start()..selected.start()]);
        Ok(Some(MatchResult {
            start,
            length: utf8::char_count(selected.as_str()),
            start_byte: selected.start(),
            end_byte: selected.end(),
            whole_start,
            whole_start_byte: whole.start(),
            rule_index,
            multi_line_rule: rule.multi_line,
            style: style.map(str::to_string),
            goto_state: rule.goto_state,
            matched_text: selected.as_str().to_string(),
        }))
    }
}

fn unclassified(line: usize, start: usize, end: usize, text: &str, state: StateId) -> TokenSpan {
    TokenSpan {
        range: span_range(TextPosition::new(line, start), TextPosition::new(line, end)),
        matched_text: text.to_string(),
        style: None,
        state,
        goto_state: None,
    }
}

fn span_range(start: TextPosition, end: TextPosition) -> TextRange {
    TextRange::new(start, end).expect("span endpoints are ordered")
}

/// Byte width of the character at `byte_pos` (1 at or past the end).
fn char_width(text: &str, byte_pos: usize) -> usize {
    text[byte_pos.min(text.len())..]
        .chars()
        .next()
        .map_or(1, char::len_utf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn simple_rule() -> Arc<SyntaxRule> {
        Arc::new(
            SyntaxRule::from_json(
                r#"{
                    "name": "simple",
                    "fileExtension": ".s",
                    "states": {
                        "default": [ { "pattern": "[0-9]+", "style": "number" } ]
                    }
                }"#,
            )
            .unwrap(),
        )
    }

    fn spans_of(analyzer: &DocumentAnalyzer, line: usize) -> Vec<(usize, usize, Option<&str>)> {
        analyzer.highlight().lines[line]
            .spans
            .iter()
            .map(|span| {
                (
                    span.range.start.column,
                    span.range.end.column,
                    span.style.as_deref(),
                )
            })
            .collect()
    }

    #[test]
    fn spans_cover_every_character_without_overlap() {
        let mut analyzer =
            DocumentAnalyzer::new(Document::new("t.s", "ab12cd34\n56ef"), simple_rule());
        analyzer.analyze_fully().unwrap();

        assert_eq!(
            spans_of(&analyzer, 0),
            vec![
                (0, 2, None),
                (2, 4, Some("number")),
                (4, 6, None),
                (6, 8, Some("number")),
            ]
        );
        assert_eq!(spans_of(&analyzer, 1), vec![(0, 2, Some("number")), (2, 4, None)]);
    }

    #[test]
    fn empty_lines_carry_the_state_through() {
        let mut analyzer = DocumentAnalyzer::new(Document::new("t.s", "1\n\n2"), simple_rule());
        analyzer.analyze_fully().unwrap();
        assert_eq!(analyzer.highlight().lines[1].spans, Vec::new());
        assert_eq!(analyzer.line_state(1), Some(DEFAULT_STATE));
    }

    #[test]
    fn unmatched_text_is_a_single_unclassified_span() {
        let mut analyzer = DocumentAnalyzer::new(Document::new("t.s", "no digits"), simple_rule());
        analyzer.analyze_fully().unwrap();
        assert_eq!(spans_of(&analyzer, 0), vec![(0, 9, None)]);
    }

    #[test]
    fn analyze_line_refreshes_one_line() {
        let mut analyzer = DocumentAnalyzer::new(Document::new("t.s", "1\n2"), simple_rule());
        analyzer.analyze_fully().unwrap();
        let refreshed = analyzer.analyze_line(1).unwrap().clone();
        assert_eq!(refreshed, analyzer.highlight().lines[1]);
        assert!(analyzer.analyze_line(5).is_err());
    }

    #[test]
    fn matched_text_is_recorded_per_span() {
        let mut analyzer = DocumentAnalyzer::new(Document::new("t.s", "画12像"), simple_rule());
        analyzer.analyze_fully().unwrap();
        let texts: Vec<&str> = analyzer.highlight().lines[0]
            .spans
            .iter()
            .map(|span| span.matched_text.as_str())
            .collect();
        assert_eq!(texts, vec!["画", "12", "像"]);
    }
}
