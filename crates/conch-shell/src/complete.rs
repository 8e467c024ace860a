//! Tab autocompletion: in-place expansion of the token at the cursor.

use crate::interpreter::CommandRegistry;
use crate::line::LineBuffer;

/// Result of a completion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Nothing applicable matched; the buffer is untouched.
    None,
    /// A single match was expanded in place, with a trailing space.
    Full(String),
    /// Several matches; the buffer grew to their longest common prefix and
    /// the candidates are returned for listing.
    Partial(Vec<String>),
}

/// Prefix completion over command and alias names.
pub struct Completer {
    candidates: Vec<String>,
}

/// Commands whose first argument is itself a command name.
const TAKES_COMMAND_ARG: &[&str] = &["help", "which", "unalias"];

impl Completer {
    /// Build a completer from an explicit candidate list.
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let mut candidates: Vec<String> = names.into_iter().collect();
        candidates.sort();
        candidates.dedup();
        Self { candidates }
    }

    /// Build a completer from a registry's commands and current aliases.
    pub fn for_registry(reg: &CommandRegistry) -> Self {
        let mut names = reg.command_names();
        names.extend(reg.aliases().into_keys());
        Self::new(names)
    }

    /// Complete the token at the cursor in place.
    ///
    /// Only the characters between the token start and the cursor take part;
    /// anything right of the cursor is preserved. Completion applies in
    /// command position (the first token, or the argument of `help`, `which`,
    /// and `unalias`); elsewhere the buffer is left untouched.
    pub fn complete(&self, line: &mut LineBuffer) -> Completion {
        let byte_cursor = line.byte_cursor();
        let before = &line.text()[..byte_cursor];

        // The partial token is everything from the last whitespace to the cursor.
        let token = before
            .rsplit(|c: char| c.is_whitespace())
            .next()
            .unwrap_or("");
        let token_chars = token.chars().count();
        let token_start = before.chars().count() - token_chars;

        // Words before the token decide whether a command name fits here.
        let leading: Vec<&str> = before[..before.len() - token.len()]
            .split_whitespace()
            .collect();
        let applicable = match leading.as_slice() {
            [] => true,
            [first] => TAKES_COMMAND_ARG.contains(&first.to_ascii_lowercase().as_str()),
            _ => false,
        };
        if !applicable {
            return Completion::None;
        }

        let prefix = token.to_ascii_lowercase();
        let matches: Vec<&String> = self
            .candidates
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .collect();

        match matches.as_slice() {
            [] => Completion::None,
            [single] => {
                let name = (*single).clone();
                line.replace_span(token_start, token_start + token_chars, &format!("{name} "));
                Completion::Full(name)
            },
            several => {
                let lcp = longest_common_prefix(several);
                if lcp.chars().count() > token_chars {
                    line.replace_span(token_start, token_start + token_chars, &lcp);
                }
                Completion::Partial(several.iter().map(|s| (*s).clone()).collect())
            },
        }
    }
}

/// Longest common prefix of a non-empty candidate set.
fn longest_common_prefix(candidates: &[&String]) -> String {
    let first = candidates[0];
    let mut len = first.chars().count();
    for other in &candidates[1..] {
        let common = first
            .chars()
            .zip(other.chars())
            .take_while(|(a, b)| a == b)
            .count();
        len = len.min(common);
    }
    first.chars().take(len).collect()
}
