//! Quote- and paren-aware string scanning.
//!
//! Every layer above the scanner works on raw source text.  The central
//! trick is *blanking*: [`blank`] returns a copy of a line in which the
//! contents of string literals and of parenthesised / bracketed
//! sub-expressions are replaced by spaces.  The copy has exactly the same
//! byte length as the original, so an index found by searching the blanked
//! text is a valid offset into the original.  That lets the compiler look for
//! top-level operators and commas without being fooled by `"a - b"` or by the
//! arguments of a nested call.
//!
//! Inside a string literal a backslash escapes the following character, so
//! `\"` never toggles string mode.  Unterminated strings and unbalanced
//! parentheses are tolerated (the rest of the line is blanked); the compiler
//! reports the error once it fails to classify the resulting token.

use std::sync::OnceLock;

use regex::Regex;

// ── Comments ──────────────────────────────────────────────────────────────────

/// Remove a trailing `//` comment, ignoring `//` inside string literals.
pub fn strip_comment(line: &str) -> &str {
    let mut in_str = false;
    let mut escaped = false;
    let bytes = line.as_bytes();
    for (i, ch) in line.char_indices() {
        if in_str {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_str = false;
            }
            continue;
        }
        if ch == '"' {
            in_str = true;
        } else if ch == '/' && bytes.get(i + 1) == Some(&b'/') {
            return &line[..i];
        }
    }
    line
}

// ── Blanking ──────────────────────────────────────────────────────────────────

/// Blank string-literal contents and nested `(...)` / `[...]` contents.
///
/// Top-level quotes and brackets are kept so callers can still find the
/// boundaries of literals, calls and index expressions.  Multi-byte
/// characters that are blanked become one space per byte.
pub fn blank(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;

    for ch in s.chars() {
        let width = ch.len_utf8();
        if in_str {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_str = false;
                if depth == 0 {
                    out.push('"');
                    continue;
                }
            }
            push_spaces(&mut out, width);
            continue;
        }
        match ch {
            '"' => {
                in_str = true;
                if depth == 0 {
                    out.push('"');
                } else {
                    out.push(' ');
                }
            }
            '(' | '[' => {
                if depth == 0 {
                    out.push(ch);
                } else {
                    out.push(' ');
                }
                depth += 1;
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    out.push(ch);
                } else {
                    out.push(' ');
                }
            }
            _ if depth == 0 => out.push(ch),
            _ => push_spaces(&mut out, width),
        }
    }
    out
}

fn push_spaces(out: &mut String, n: usize) {
    for _ in 0..n {
        out.push(' ');
    }
}

/// Blank the byte range `start..end` of an already-blanked string.
///
/// Used by the compiler to hide generic argument lists such as `<int>`.
pub fn blank_range(blanked: &mut String, start: usize, end: usize) {
    let replaced: String = blanked[start..end].chars().map(|c| {
        let mut s = String::new();
        push_spaces(&mut s, c.len_utf8());
        s
    }).collect();
    blanked.replace_range(start..end, &replaced);
}

// ── Top-level search ──────────────────────────────────────────────────────────

/// Byte offset of the first top-level occurrence of `pat` in `s`.
pub fn find_top_level(s: &str, pat: &str) -> Option<usize> {
    blank(s).find(pat)
}

/// Byte offset of the last top-level occurrence of `pat` in `s`.
pub fn rfind_top_level(s: &str, pat: &str) -> Option<usize> {
    blank(s).rfind(pat)
}

/// Replace every top-level occurrence of `from` with `to`.
pub fn replace_top_level(s: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return s.to_owned();
    }
    let blanked = blank(s);
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for (i, _) in blanked.match_indices(from) {
        out.push_str(&s[last..i]);
        out.push_str(to);
        last = i + from.len();
    }
    out.push_str(&s[last..]);
    out
}

/// Split `s` on top-level occurrences of `delim`, producing at most
/// `max_parts` parts (`0` means unlimited).  Once the limit is reached the
/// remainder, delimiters included, is joined into the last part.
pub fn split_top_level(s: &str, delim: char, max_parts: usize) -> Vec<&str> {
    let blanked = blank(s);
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, ch) in blanked.char_indices() {
        if max_parts != 0 && parts.len() + 1 == max_parts {
            break;
        }
        if ch == delim {
            parts.push(&s[start..i]);
            start = i + ch.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

// ── Small utilities ───────────────────────────────────────────────────────────

/// Remove one pair of parentheses if they enclose the whole of `s`.
///
/// `(a) + (b)` is returned unchanged because its first `(` does not match
/// its last `)`.
pub fn unwrap_parens(s: &str) -> &str {
    let s = s.trim();
    if !s.starts_with('(') || !s.ends_with(')') {
        return s;
    }
    let blanked = blank(s);
    match blanked[1..].find(')') {
        Some(i) if i + 1 == s.len() - 1 => s[1..s.len() - 1].trim(),
        _ => s,
    }
}

/// Split off the first whitespace-delimited word from `s`.
/// Returns `(word, rest)` or `None` if `s` is empty/all-whitespace.
pub fn split_word(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    Some((&s[..end], s[end..].trim_start()))
}

/// The leading word of a line, ending at whitespace or `(`.
pub fn first_word(s: &str) -> &str {
    let s = s.trim_start();
    let end = s
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(s.len());
    &s[..end]
}

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Returns `true` if `s` is a valid identifier.
pub fn is_identifier(s: &str) -> bool {
    ident_re().is_match(s)
}

// ── Literals ──────────────────────────────────────────────────────────────────

/// The syntactic category of a literal, before it is parsed into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralShape {
    Null,
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Str,
}

struct LiteralRes {
    int: Regex,
    uint: Regex,
    float: Regex,
    double: Regex,
}

fn literal_res() -> &'static LiteralRes {
    static RES: OnceLock<LiteralRes> = OnceLock::new();
    RES.get_or_init(|| LiteralRes {
        int: Regex::new(r"^-?[0-9]+$").unwrap(),
        uint: Regex::new(r"^[0-9]+u$").unwrap(),
        float: Regex::new(r"^-?[0-9]+(\.[0-9]+)?f$").unwrap(),
        double: Regex::new(r"^-?[0-9]+\.[0-9]+$").unwrap(),
    })
}

/// Classify `s` as literal syntax, if it is one.
pub fn literal_shape(s: &str) -> Option<LiteralShape> {
    match s {
        "null" => return Some(LiteralShape::Null),
        "true" | "false" => return Some(LiteralShape::Bool),
        _ => {}
    }
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        return unescape(s).map(|_| LiteralShape::Str);
    }
    let res = literal_res();
    if res.int.is_match(s) {
        Some(LiteralShape::Int)
    } else if res.uint.is_match(s) {
        Some(LiteralShape::UInt)
    } else if res.float.is_match(s) {
        Some(LiteralShape::Float)
    } else if res.double.is_match(s) {
        Some(LiteralShape::Double)
    } else {
        None
    }
}

/// Decode a quoted string literal (`"a\tb"`) into its contents.
///
/// Returns `None` if `s` is not exactly one well-formed literal.
pub fn unescape(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                c => out.push(c),
            },
            '"' => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

/// Encode `s` as a quoted string literal that [`unescape`] reverses.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_stripped() {
        assert_eq!(strip_comment("int x = 5 // five"), "int x = 5 ");
        assert_eq!(strip_comment("// whole line"), "");
    }

    #[test]
    fn comment_inside_string_kept() {
        let line = r#"string url = "http://x" // note"#;
        assert_eq!(strip_comment(line), r#"string url = "http://x" "#);
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        let line = r#"string s = "say \"//hi\"" // c"#;
        assert_eq!(strip_comment(line), r#"string s = "say \"//hi\"" "#);
    }

    #[test]
    fn blank_string_contents() {
        assert_eq!(blank(r#""a - b" + c"#), r#""     " + c"#);
    }

    #[test]
    fn blank_nested_call() {
        assert_eq!(blank("f(a, g(b)) + 1"), "f(        ) + 1");
        assert_eq!(blank("xs[i + 1]"), "xs[     ]");
    }

    #[test]
    fn blank_keeps_length_with_multibyte() {
        let s = "\"héllo\" + f(ü)";
        assert_eq!(blank(s).len(), s.len());
    }

    #[test]
    fn blank_escaped_quote() {
        let s = r#""a\"b" + c"#;
        let b = blank(s);
        assert_eq!(b.len(), s.len());
        assert!(b.ends_with("+ c"));
    }

    #[test]
    fn blank_unterminated_string_is_tolerated() {
        let s = r#""abc + d"#;
        assert_eq!(blank(s), "\"       ");
    }

    #[test]
    fn top_level_search() {
        assert_eq!(find_top_level(r#""x,y", z"#, ","), Some(5));
        assert_eq!(rfind_top_level("f(a - b) - c", "-"), Some(9));
        assert_eq!(find_top_level("f(a - b)", "-"), None);
    }

    #[test]
    fn replace_only_top_level() {
        assert_eq!(
            replace_top_level(r#"a + "+" + f(1 + 2)"#, "+", "plus"),
            r#"a plus "+" plus f(1 + 2)"#
        );
    }

    #[test]
    fn split_with_limit() {
        assert_eq!(split_top_level("a, f(b, c), d", ',', 0), vec!["a", " f(b, c)", " d"]);
        assert_eq!(split_top_level("a,b,c,d", ',', 2), vec!["a", "b,c,d"]);
        assert_eq!(split_top_level(r#""a,b""#, ',', 0), vec![r#""a,b""#]);
    }

    #[test]
    fn unwrap_only_matching_parens() {
        assert_eq!(unwrap_parens("(a + b)"), "a + b");
        assert_eq!(unwrap_parens("(a) + (b)"), "(a) + (b)");
        assert_eq!(unwrap_parens("((x))"), "(x)");
    }

    #[test]
    fn words() {
        assert_eq!(split_word("  int x = 5"), Some(("int", "x = 5")));
        assert_eq!(split_word("   "), None);
        assert_eq!(first_word("while(x)"), "while");
        assert_eq!(first_word("if (x)"), "if");
    }

    #[test]
    fn literal_shapes() {
        assert_eq!(literal_shape("-12"), Some(LiteralShape::Int));
        assert_eq!(literal_shape("12u"), Some(LiteralShape::UInt));
        assert_eq!(literal_shape("3.5"), Some(LiteralShape::Double));
        assert_eq!(literal_shape("3.5f"), Some(LiteralShape::Float));
        assert_eq!(literal_shape("true"), Some(LiteralShape::Bool));
        assert_eq!(literal_shape(r#""a\tb""#), Some(LiteralShape::Str));
        assert_eq!(literal_shape(r#""a" + "b""#), None);
        assert_eq!(literal_shape("x1"), None);
    }

    #[test]
    fn escape_round_trip() {
        let raw = "tab\there \"quoted\" back\\slash";
        assert_eq!(unescape(&escape(raw)).as_deref(), Some(raw));
        assert_eq!(unescape(r#""a\tb""#).as_deref(), Some("a\tb"));
    }
}
