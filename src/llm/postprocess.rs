//! Cleanup of raw model replies before they reach the game.

use serde::Deserialize;

/// How the action is cut out of a cleaned reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionFormat {
    /// The whole reply, trimmed.
    #[default]
    Raw,
    /// The last `[...]` group, brackets included. Falls back to the whole reply.
    LastBracket,
    /// The first non-empty line.
    FirstLine,
}

/// Remove every `<think>...</think>` block. An unterminated block swallows the rest.
pub fn strip_thinking(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Strip reasoning blocks then apply `format`.
pub fn extract_action(reply: &str, format: ActionFormat) -> String {
    let cleaned = strip_thinking(reply);
    let cleaned = cleaned.trim();
    match format {
        ActionFormat::Raw => cleaned.to_string(),
        ActionFormat::LastBracket => {
            let bracket = cleaned
                .rfind(']')
                .and_then(|end| cleaned[..end].rfind('[').map(|start| &cleaned[start..=end]));
            bracket.unwrap_or(cleaned).to_string()
        }
        ActionFormat::FirstLine => cleaned
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_blocks_are_removed() {
        assert_eq!(strip_thinking("<think>hmm</think>[A1]"), "[A1]");
        assert_eq!(strip_thinking("a<think>x</think>b<think>y</think>c"), "abc");
        assert_eq!(strip_thinking("answer <think>never closed"), "answer ");
        assert_eq!(strip_thinking("plain"), "plain");
    }

    #[test]
    fn formats() {
        let reply = "<think>A10 maybe</think>\n I'll go with [A7 B7 C6] \n";
        assert_eq!(extract_action(reply, ActionFormat::Raw), "I'll go with [A7 B7 C6]");
        assert_eq!(extract_action(reply, ActionFormat::LastBracket), "[A7 B7 C6]");
        assert_eq!(extract_action("\n\nfirst\nsecond", ActionFormat::FirstLine), "first");
        assert_eq!(extract_action("no brackets", ActionFormat::LastBracket), "no brackets");
        assert_eq!(extract_action("", ActionFormat::FirstLine), "");
    }
}
