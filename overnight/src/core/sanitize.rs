//! Strip presentation wrappers from raw completion text.
//!
//! Completion services tend to wrap code in Markdown fences and surround it
//! with prose even when told not to. The toolchain that consumes the artifact
//! needs the bare code body, so this module removes exactly those wrappers and
//! nothing else: no import fixing, no brace balancing.

const FENCE: &str = "```";
const INLINE_QUOTE: char = '`';

/// Return the canonical artifact text for a raw completion.
///
/// When the trimmed text opens with a fence, only lines inside fences are kept
/// and every fence line toggles the inside state. Otherwise a single pair of
/// surrounding backticks is removed. An empty result is valid.
pub fn sanitize(raw: &str) -> String {
    let trimmed = raw.trim();

    if trimmed.starts_with(FENCE) {
        let mut inside = false;
        let mut kept: Vec<&str> = Vec::new();
        for line in trimmed.lines() {
            if line.trim().starts_with(FENCE) {
                inside = !inside;
                continue;
            }
            if inside {
                kept.push(line);
            }
        }
        return kept.join("\n").trim().to_string();
    }

    if trimmed.starts_with(INLINE_QUOTE) && trimmed.ends_with(INLINE_QUOTE) {
        let inner = trimmed.strip_prefix(INLINE_QUOTE).unwrap_or(trimmed);
        return inner.strip_suffix(INLINE_QUOTE).unwrap_or(inner).to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_with_language_tag_and_prose() {
        let raw = "```go\npackage demo\n\nfunc A() {}\n```\n\nThis code defines A.";
        assert_eq!(sanitize(raw), "package demo\n\nfunc A() {}");
    }

    #[test]
    fn fenced_block_surrounded_by_whitespace() {
        let raw = "\n\n   ```\n  package demo  \n```   \n";
        assert_eq!(sanitize(raw), "package demo");
    }

    #[test]
    fn prose_before_fence_is_not_sanitized_as_fenced() {
        // Only text that opens with a fence goes through line filtering.
        let raw = "Here you go:\n```go\npackage demo\n```";
        assert_eq!(sanitize(raw), raw);
    }

    #[test]
    fn second_fenced_region_is_absorbed() {
        let raw = "```go\npackage a\n```\nprose between\n```go\nfunc B() {}\n```\ntrailing";
        assert_eq!(sanitize(raw), "package a\nfunc B() {}");
    }

    #[test]
    fn unterminated_fence_keeps_remaining_lines() {
        let raw = "```rust\nfn main() {}\n";
        assert_eq!(sanitize(raw), "fn main() {}");
    }

    #[test]
    fn inline_backticks_are_stripped_once() {
        assert_eq!(sanitize("`x := 1`"), "x := 1");
        assert_eq!(sanitize("  `package demo`\n"), "package demo");
        assert_eq!(sanitize("`"), "");
    }

    #[test]
    fn backtick_on_one_side_only_is_kept() {
        assert_eq!(sanitize("`unbalanced"), "`unbalanced");
        assert_eq!(sanitize("unbalanced`"), "unbalanced`");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   \n\t"), "");
        assert_eq!(sanitize("```\n```"), "");
    }

    #[test]
    fn fence_free_input_is_idempotent() {
        let inputs = [
            "package demo",
            "  package demo\n\nfunc main() {}\n",
            "`x := 1`",
            "plain prose with a ` tick inside",
            "",
            "\tindented\n",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input: {input:?}");
        }
    }
}
