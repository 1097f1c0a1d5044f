//! Stuck-loop detection: when the model keeps calling the same tool with the
//! same result, inject a hint instead of burning the remaining tool rounds.

use std::collections::VecDeque;

/// Tracks recent tool calls and detects stuck loops.
pub struct LoopGuard {
    recent: VecDeque<(String, String)>,
    threshold: usize,
}

impl LoopGuard {
    /// `threshold` is how many consecutive identical results from the same
    /// tool trigger a hint.
    pub fn new(threshold: usize) -> Self {
        LoopGuard {
            recent: VecDeque::with_capacity(threshold + 1),
            threshold,
        }
    }

    /// Record a tool call's result. Returns `Some(hint)` if the model
    /// appears stuck and should be told to stop retrying.
    pub fn record(&mut self, tool_name: &str, result: &str) -> Option<String> {
        let snippet = Self::snippet(result);
        self.recent.push_back((tool_name.to_string(), snippet.clone()));

        while self.recent.len() > self.threshold {
            self.recent.pop_front();
        }

        if self.recent.len() >= self.threshold {
            let all_same = self
                .recent
                .iter()
                .all(|(name, snip)| name == tool_name && *snip == snippet);

            if all_same {
                self.recent.clear();
                return Some(format!(
                    "The tool '{tool_name}' has returned the same result {} times in a row. \
                     Do not call it again with a similar query; respond with what you already \
                     know or try a different approach.",
                    self.threshold
                ));
            }
        }

        None
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }

    fn snippet(s: &str) -> String {
        match s.char_indices().nth(200) {
            Some((byte_idx, _)) => s[..byte_idx].to_string(),
            None => s.to_string(),
        }
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        LoopGuard::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_trigger_on_different_results() {
        let mut guard = LoopGuard::new(3);
        assert!(guard.record("search", "result 1").is_none());
        assert!(guard.record("search", "result 2").is_none());
        assert!(guard.record("search", "result 3").is_none());
    }

    #[test]
    fn triggers_on_repeated_same_result() {
        let mut guard = LoopGuard::new(3);
        assert!(guard.record("search", "no results").is_none());
        assert!(guard.record("search", "no results").is_none());
        assert!(guard.record("search", "no results").is_some());
    }

    #[test]
    fn resets_after_trigger() {
        let mut guard = LoopGuard::new(2);
        assert!(guard.record("t", "same").is_none());
        assert!(guard.record("t", "same").is_some());
        assert!(guard.record("t", "same").is_none());
    }
}
