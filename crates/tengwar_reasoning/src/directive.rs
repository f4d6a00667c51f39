//! Tool directives embedded in model output.
//!
//! Recognized forms:
//! - `[READ:path]`, `[LIST:path]`
//! - `[WRITE:path]content[/WRITE]`
//! - `[GIT_STATUS]`, `[GIT_COMMIT:message]`, `[GIT_PUSH]`
//! - `[EXEC:code]` / `[TENGWAR:code]` (brackets inside the code must balance;
//!   an unclosed one ends at the next directive or blank line and is ignored)
//! - fenced blocks tagged `tengwar`
//!
//! Directives never nest: text inside a `WRITE` body or a fenced block is
//! content, not further directives.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static RE_READ: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[READ:([^\]\n]+)\]").unwrap());
static RE_LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[LIST:([^\]\n]+)\]").unwrap());
static RE_WRITE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[WRITE:([^\]\n]+)\](.*?)\[/WRITE\]").unwrap());
static RE_GIT_STATUS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[GIT_STATUS\]").unwrap());
static RE_GIT_COMMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[GIT_COMMIT:([^\]\n]+)\]").unwrap());
static RE_GIT_PUSH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[GIT_PUSH\]").unwrap());
static RE_EXEC_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?:EXEC|TENGWAR):").unwrap());
/// Openers that end an unclosed `EXEC`/`TENGWAR` scan.
const OPENERS: &[&str] = &[
    "[READ:", "[LIST:", "[WRITE:", "[/WRITE]", "[GIT_", "[EXEC:", "[TENGWAR:", "```",
];

static RE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```tengwar[ \t]*\r?\n(.*?)```").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDirective {
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    ListDir { path: String },
    GitStatus,
    Commit { message: String },
    Push,
    Execute { code: String },
}

impl ToolDirective {
    /// Stable tool name, recorded in `tools_used`.
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolDirective::ReadFile { .. } => "read",
            ToolDirective::WriteFile { .. } => "write",
            ToolDirective::ListDir { .. } => "list",
            ToolDirective::GitStatus => "git_status",
            ToolDirective::Commit { .. } => "git_commit",
            ToolDirective::Push => "git_push",
            ToolDirective::Execute { .. } => "execute",
        }
    }
}

/// A directive plus the byte range of its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDirective {
    pub directive: ToolDirective,
    pub span: Range<usize>,
}

/// All directives in `text`, in textual order, with non-overlapping spans.
pub fn parse(text: &str) -> Vec<ParsedDirective> {
    let mut found: Vec<ParsedDirective> = Vec::new();

    for cap in RE_WRITE.captures_iter(text) {
        let (Some(all), Some(path), Some(body)) = (cap.get(0), cap.get(1), cap.get(2)) else {
            continue;
        };
        found.push(ParsedDirective {
            directive: ToolDirective::WriteFile {
                path: path.as_str().trim().to_string(),
                content: trim_one_newline(body.as_str()).to_string(),
            },
            span: all.range(),
        });
    }
    for cap in RE_FENCE.captures_iter(text) {
        let (Some(all), Some(code)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let code = code.as_str().trim();
        if code.is_empty() {
            continue;
        }
        found.push(ParsedDirective {
            directive: ToolDirective::Execute {
                code: code.to_string(),
            },
            span: all.range(),
        });
    }
    push_simple(&mut found, &RE_READ, text, |p| ToolDirective::ReadFile { path: p });
    push_simple(&mut found, &RE_LIST, text, |p| ToolDirective::ListDir { path: p });
    push_simple(&mut found, &RE_GIT_COMMIT, text, |m| ToolDirective::Commit { message: m });
    for m in RE_GIT_STATUS.find_iter(text) {
        found.push(ParsedDirective {
            directive: ToolDirective::GitStatus,
            span: m.range(),
        });
    }
    for m in RE_GIT_PUSH.find_iter(text) {
        found.push(ParsedDirective {
            directive: ToolDirective::Push,
            span: m.range(),
        });
    }
    for m in RE_EXEC_OPEN.find_iter(text) {
        if let Some(end) = balanced_close(text, m.end()) {
            let code = text[m.end()..end].trim();
            if !code.is_empty() {
                found.push(ParsedDirective {
                    directive: ToolDirective::Execute {
                        code: code.to_string(),
                    },
                    span: m.start()..end + 1,
                });
            }
        }
    }

    // Earliest start wins; anything overlapping an accepted span is content.
    found.sort_by(|a, b| {
        a.span
            .start
            .cmp(&b.span.start)
            .then(b.span.end.cmp(&a.span.end))
    });
    let mut accepted: Vec<ParsedDirective> = Vec::with_capacity(found.len());
    for d in found {
        if accepted
            .last()
            .map(|prev| d.span.start < prev.span.end)
            .unwrap_or(false)
        {
            continue;
        }
        accepted.push(d);
    }
    accepted
}

fn push_simple(
    out: &mut Vec<ParsedDirective>,
    re: &Regex,
    text: &str,
    make: impl Fn(String) -> ToolDirective,
) {
    for cap in re.captures_iter(text) {
        let (Some(all), Some(arg)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let arg = arg.as_str().trim();
        if arg.is_empty() {
            continue;
        }
        out.push(ParsedDirective {
            directive: make(arg.to_string()),
            span: all.range(),
        });
    }
}

/// Byte index of the `]` closing a bracket opened just before `start`,
/// skipping brackets nested in the code and inside string literals.
///
/// Outside string literals, another directive opener or a blank line means
/// the bracket was never closed.
fn balanced_close(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        let rest = &text[start + i..];
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if rest.starts_with("\n\n")
            || rest.starts_with("\n\r\n")
            || OPENERS.iter().any(|o| rest.starts_with(o))
        {
            return None;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' if depth == 0 => return Some(start + i),
            ']' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn trim_one_newline(s: &str) -> &str {
    let s = s
        .strip_prefix("\r\n")
        .or_else(|| s.strip_prefix('\n'))
        .unwrap_or(s);
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directives(text: &str) -> Vec<ToolDirective> {
        parse(text).into_iter().map(|d| d.directive).collect()
    }

    #[test]
    fn test_no_directives() {
        assert!(parse("Just a friendly reply. [not a tool] and [READ:] nothing").is_empty());
    }

    #[test]
    fn test_textual_order_across_kinds() {
        let text = "[GIT_STATUS] then [READ:~/a.tw] and [LIST:src] and [GIT_PUSH]";
        assert_eq!(
            directives(text),
            vec![
                ToolDirective::GitStatus,
                ToolDirective::ReadFile {
                    path: "~/a.tw".into()
                },
                ToolDirective::ListDir { path: "src".into() },
                ToolDirective::Push,
            ]
        );
    }

    #[test]
    fn test_spans_cover_source_text() {
        let text = "a [READ:x.tw] b [GIT_COMMIT: tidy up ] c";
        let parsed = parse(text);
        assert_eq!(&text[parsed[0].span.clone()], "[READ:x.tw]");
        assert_eq!(&text[parsed[1].span.clone()], "[GIT_COMMIT: tidy up ]");
        assert_eq!(
            parsed[1].directive,
            ToolDirective::Commit {
                message: "tidy up".into()
            }
        );
    }

    #[test]
    fn test_write_body_trims_one_newline_and_hides_inner_directives() {
        let text = "[WRITE:notes.md]\nline one\n[READ:secret]\n\n[/WRITE] done";
        let parsed = directives(text);
        assert_eq!(
            parsed,
            vec![ToolDirective::WriteFile {
                path: "notes.md".into(),
                content: "line one\n[READ:secret]\n".into(),
            }]
        );
    }

    #[test]
    fn test_exec_allows_balanced_brackets() {
        let text = "[TENGWAR:(map sqr [1 2 3])] and [EXEC:(upper \"a]b\")]";
        assert_eq!(
            directives(text),
            vec![
                ToolDirective::Execute {
                    code: "(map sqr [1 2 3])".into()
                },
                ToolDirective::Execute {
                    code: "(upper \"a]b\")".into()
                },
            ]
        );
        // unclosed is ignored
        assert!(parse("[EXEC:(+ 1 2").is_empty());
    }

    #[test]
    fn test_unclosed_exec_does_not_swallow_later_directives() {
        assert_eq!(
            directives("[EXEC:(+ 1 2) then [READ:a.tw] ok]"),
            vec![ToolDirective::ReadFile {
                path: "a.tw".into()
            }]
        );
        assert_eq!(
            directives("[TENGWAR:(f [1 2)\n\nLater, a closing ] bracket. [GIT_STATUS]"),
            vec![ToolDirective::GitStatus]
        );
        // Multi-line code and openers inside strings are still fine.
        assert_eq!(
            directives("[EXEC:(print\n  \"[READ:x]\")]"),
            vec![ToolDirective::Execute {
                code: "(print\n  \"[READ:x]\")".into()
            }]
        );
    }

    #[test]
    fn test_fenced_tengwar_block() {
        let text = "Here:\n```tengwar\n(def fib (fn n n))\n(fib 10)\n```\nand ```python\nprint(1)\n```";
        assert_eq!(
            directives(text),
            vec![ToolDirective::Execute {
                code: "(def fib (fn n n))\n(fib 10)".into()
            }]
        );
    }

    #[test]
    fn test_tool_names() {
        assert_eq!(ToolDirective::GitStatus.tool_name(), "git_status");
        assert_eq!(
            ToolDirective::Execute { code: "x".into() }.tool_name(),
            "execute"
        );
    }
}
