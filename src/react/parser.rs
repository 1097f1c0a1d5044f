//! Three-tier response parser: strict header matching, then a
//! flexible tier tolerant of casing/punctuation variation, then a heuristic
//! last-line-is-final fallback. Generalizes the strict-prefix/Think-default
//! fallback chain of a `parse_action`-style ReAct controller into an explicit
//! tier ladder that can also emit structured `Action`/`Observation` steps.

use serde_json::Value;

use crate::error::{Error, Result};
use super::step::ReActStep;

/// Which tier successfully parsed a response; informational, callers
/// generally only care about the resulting steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTier {
    Strict,
    Flexible,
    Heuristic,
}

/// Parse one iteration's raw LLM text into an ordered list of steps.
///
/// `strict_mode` controls failure behavior when no tier recognizes headers:
/// if true, the caller receives `Err(ErrorKind::ParseFailure)`; if false
/// (the default), the heuristic tier always succeeds by treating the whole
/// response as a thought, or the final non-empty line as the answer.
pub fn parse(text: &str, iteration: u32, strict_mode: bool) -> Result<(Vec<ReActStep>, ParseTier)> {
    if let Some(steps) = parse_strict(text, iteration) {
        return Ok((steps, ParseTier::Strict));
    }
    if let Some(steps) = parse_flexible(text, iteration) {
        return Ok((steps, ParseTier::Flexible));
    }
    if strict_mode {
        return Err(Error::parse_failure(format!(
            "could not parse ReAct response in strict mode: {text}"
        )));
    }
    Ok((parse_heuristic(text, iteration), ParseTier::Heuristic))
}

/// Strict tier: exact header tokens (`Thought:`, `Action:`, `Observation:`,
/// `Final:`/`Answer:`), each spanning to the next header line.
fn parse_strict(text: &str, iteration: u32) -> Option<Vec<ReActStep>> {
    const HEADERS: &[&str] = &["Thought:", "Action:", "Observation:", "Final:", "Answer:"];
    let blocks = split_on_headers(text, HEADERS)?;
    Some(blocks_to_steps(blocks, iteration))
}

/// Flexible tier: case-insensitive headers plus common synonyms
/// (`Tool:`/`Execute:` as Action, `Result:`/`Response:` as Observation),
/// tolerating `=` in place of `:` and leading Markdown bullets.
fn parse_flexible(text: &str, iteration: u32) -> Option<Vec<ReActStep>> {
    let normalized = normalize_flexible(text);
    const HEADERS: &[&str] = &["Thought:", "Action:", "Observation:", "Final:", "Answer:"];
    let blocks = split_on_headers(&normalized, HEADERS)?;
    Some(blocks_to_steps(blocks, iteration))
}

/// Heuristic tier: never fails. Treats the last non-empty line as the final
/// answer and any preceding prose as a thought.
fn parse_heuristic(text: &str, iteration: u32) -> Vec<ReActStep> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return vec![ReActStep::Thought {
            text: String::new(),
            iteration,
        }];
    }

    let (last, rest) = lines.split_last().unwrap();
    let mut steps = Vec::new();
    if !rest.is_empty() {
        steps.push(ReActStep::Thought {
            text: rest.join("\n"),
            iteration,
        });
    }
    steps.push(ReActStep::Final {
        answer: (*last).to_string(),
        iteration,
    });
    steps
}

/// Lowercase header/synonym name to its canonical `split_on_headers` token.
/// Order doesn't matter: none of these names is a prefix of another.
const HEADER_SYNONYMS: &[(&str, &str)] = &[
    ("thought", "Thought:"),
    ("action", "Action:"),
    ("observation", "Observation:"),
    ("final", "Final:"),
    ("answer", "Answer:"),
    ("tool", "Action:"),
    ("execute", "Action:"),
    ("result", "Observation:"),
    ("response", "Observation:"),
];

fn normalize_flexible(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start_matches(['-', '*', ' ']);
        out.push_str(&canonicalize_header_line(trimmed));
        out.push('\n');
    }
    out
}

/// Rewrites a line's leading header token to its canonical casing,
/// regardless of how the model capitalized it (`THOUGHT:`, `action:`,
/// `Tool:`, `result=` all become `Thought:`/`Action:`/`Observation:`).
/// `to_ascii_lowercase` is byte-length-preserving for ASCII input, so the
/// matched prefix length lines up between the lowercased probe and the
/// original line.
fn canonicalize_header_line(line: &str) -> String {
    let lower = line.to_ascii_lowercase();
    for (name, canonical) in HEADER_SYNONYMS {
        let Some(after_name) = lower.strip_prefix(name) else {
            continue;
        };
        if let Some(rest) = after_name.strip_prefix(':').or_else(|| after_name.strip_prefix('=')) {
            let original_rest = &line[line.len() - rest.len()..];
            return format!("{canonical}{original_rest}");
        }
    }
    line.to_string()
}

/// Split `text` into `(header, body)` pairs at each occurrence of a known
/// header token, preserving order. Returns `None` if no header is found.
fn split_on_headers<'a>(text: &'a str, headers: &[&str]) -> Option<Vec<(&'a str, String)>> {
    let mut matches: Vec<(usize, &str)> = Vec::new();
    for header in headers {
        let mut start = 0;
        while let Some(pos) = text[start..].find(header) {
            let absolute = start + pos;
            let at_line_start = absolute == 0 || text.as_bytes()[absolute - 1] == b'\n';
            if at_line_start {
                matches.push((absolute, header));
            }
            start = absolute + header.len();
        }
    }
    if matches.is_empty() {
        return None;
    }
    matches.sort_by_key(|(pos, _)| *pos);

    let mut blocks = Vec::with_capacity(matches.len());
    for (i, (pos, header)) in matches.iter().enumerate() {
        let body_start = pos + header.len();
        let body_end = matches.get(i + 1).map(|(p, _)| *p).unwrap_or(text.len());
        let body = text[body_start..body_end].trim().to_string();
        blocks.push((*header, body));
    }
    Some(blocks)
}

fn blocks_to_steps(blocks: Vec<(&str, String)>, iteration: u32) -> Vec<ReActStep> {
    let mut steps = Vec::with_capacity(blocks.len());
    let mut pending_action: Option<(String, Option<Value>)> = None;

    for (header, body) in blocks {
        match header {
            "Thought:" => steps.push(ReActStep::Thought { text: body, iteration }),
            "Action:" => {
                let (tool, args) = parse_action_line(&body);
                pending_action = Some((tool, args));
            }
            "Observation:" => {
                if let Some((tool, args)) = pending_action.take() {
                    steps.push(ReActStep::Action {
                        tool,
                        args: args.unwrap_or(Value::Null),
                        iteration,
                    });
                }
                steps.push(ReActStep::Observation {
                    text: body,
                    error: None,
                    iteration,
                });
            }
            "Final:" | "Answer:" => {
                if let Some((tool, args)) = pending_action.take() {
                    steps.push(ReActStep::Action {
                        tool,
                        args: args.unwrap_or(Value::Null),
                        iteration,
                    });
                }
                steps.push(ReActStep::Final { answer: body, iteration });
            }
            _ => {}
        }
    }

    if let Some((tool, args)) = pending_action {
        steps.push(ReActStep::Action {
            tool,
            args: args.unwrap_or(Value::Null),
            iteration,
        });
    }

    steps
}

/// Extract `(tool_name, args)` from an `Action:` body. `args` is either a
/// JSON object literal written as `tool(args)` / on an `Args:` sub-line, or
/// a single scalar wrapped as `{"input": scalar}`.
fn parse_action_line(body: &str) -> (String, Option<Value>) {
    let body = body.trim();

    if let Some(open) = body.find('(') {
        if let Some(close) = body.rfind(')') {
            if close > open {
                let name = body[..open].trim().to_string();
                let raw_args = body[open + 1..close].trim();
                return (name, Some(parse_args_literal(raw_args)));
            }
        }
    }

    let mut lines = body.lines();
    let name = lines.next().unwrap_or("").trim().to_string();
    for line in lines {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Args:").or_else(|| line.strip_prefix("args:")) {
            return (name, Some(parse_args_literal(rest.trim())));
        }
    }
    (name, None)
}

fn parse_args_literal(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Object(Default::default());
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        if parsed.is_object() {
            return parsed;
        }
        return serde_json::json!({ "input": parsed });
    }
    serde_json::json!({ "input": raw.trim_matches('"') })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_tier_parses_thought_action_final() {
        let text = "Thought: I should add numbers\nAction: add({\"a\":1,\"b\":2})\nObservation: 3\nFinal: The sum is 3";
        let (steps, tier) = parse(text, 1, true).unwrap();
        assert_eq!(tier, ParseTier::Strict);
        assert!(matches!(steps[0], ReActStep::Thought { .. }));
        assert!(matches!(steps[1], ReActStep::Action { .. }));
        assert!(matches!(steps[2], ReActStep::Observation { .. }));
        assert!(matches!(steps[3], ReActStep::Final { .. }));
    }

    #[test]
    fn flexible_tier_accepts_synonyms() {
        let text = "thought: thinking\nTool: search\nArgs: {\"q\":\"paris\"}";
        let (steps, tier) = parse(text, 1, true).unwrap();
        assert_eq!(tier, ParseTier::Flexible);
        assert!(steps.iter().any(|s| matches!(s, ReActStep::Action { tool, .. } if tool == "search")));
    }

    #[test]
    fn heuristic_tier_treats_last_line_as_final() {
        let text = "Some rambling thoughts.\nMore reasoning.\nThe answer is 42.";
        let (steps, tier) = parse(text, 3, false).unwrap();
        assert_eq!(tier, ParseTier::Heuristic);
        assert!(steps.last().unwrap().is_final());
    }

    #[test]
    fn flexible_tier_is_case_insensitive_on_primary_headers() {
        let text = "THOUGHT: checking the weather\naction: lookup(\"paris\")\nobservation: sunny\nfinal: It's sunny in Paris.";
        let (steps, tier) = parse(text, 1, true).unwrap();
        assert_eq!(tier, ParseTier::Flexible);
        assert!(matches!(&steps[0], ReActStep::Thought { text, .. } if text == "checking the weather"));
        assert!(matches!(&steps[1], ReActStep::Action { tool, .. } if tool == "lookup"));
        assert!(matches!(&steps[2], ReActStep::Observation { text, .. } if text == "sunny"));
        assert!(steps.last().unwrap().is_final());
    }

    #[test]
    fn strict_mode_errors_when_nothing_matches() {
        let err = parse("no headers at all, just prose", 1, true).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ParseFailure);
    }

    #[test]
    fn scalar_action_args_are_wrapped() {
        let (tool, args) = parse_action_line("calculator(42)");
        assert_eq!(tool, "calculator");
        assert_eq!(args.unwrap(), serde_json::json!({"input": 42}));
    }
}
