//! Call-context inference for signature help, from text alone.
//!
//! Finds the `(` of the call enclosing the cursor, decides whether that
//! call is already closed before the cursor, and counts top-level commas
//! to pick the active parameter. Parentheses inside string literals never
//! count, and nested calls are skipped by depth tracking.

/// Where the cursor sits relative to the enclosing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureContext {
    /// Char offset of the call's `(`.
    pub open_offset: usize,
    /// A matching `)` appears before the cursor.
    pub closed: bool,
    /// 0-based index of the argument under the cursor.
    pub active_parameter: usize,
}

impl SignatureContext {
    /// Whether signature help should be shown.
    pub fn is_active(&self) -> bool {
        !self.closed
    }
}

fn is_quote(c: char) -> bool {
    matches!(c, '"' | '\'' | '`')
}

/// True when `chars[idx]` is preceded by an odd run of backslashes.
fn is_escaped(chars: &[char], idx: usize) -> bool {
    chars[..idx].iter().rev().take_while(|&&c| c == '\\').count() % 2 == 1
}

/// Forward string-literal state: which quote opened it, and whether the
/// next character is escaped.
#[derive(Default)]
struct StringState {
    quote: Option<char>,
    escaped: bool,
}

impl StringState {
    /// Feed one character; returns true if it is part of a string literal
    /// (including its delimiters).
    fn step(&mut self, c: char) -> bool {
        match self.quote {
            Some(open) => {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == open {
                    self.quote = None;
                }
                true
            }
            None if is_quote(c) => {
                self.quote = Some(c);
                true
            }
            None => false,
        }
    }
}

/// Scan backward from the cursor for the `(` that opens the enclosing call.
pub fn find_call_open(chars: &[char], cursor: usize) -> Option<usize> {
    let cursor = cursor.min(chars.len());
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;

    for idx in (0..cursor).rev() {
        let c = chars[idx];

        if let Some(quote) = in_string {
            if c == quote && !is_escaped(chars, idx) {
                in_string = None;
            }
            continue;
        }

        match c {
            q if is_quote(q) && !is_escaped(chars, idx) => in_string = Some(q),
            ')' => depth += 1,
            '(' if depth > 0 => depth -= 1,
            '(' => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Whether the call opened at `open` is closed before `cursor`.
pub fn is_call_closed(chars: &[char], open: usize, cursor: usize) -> bool {
    let cursor = cursor.min(chars.len());
    let mut depth = 0usize;
    let mut strings = StringState::default();

    for &c in chars.iter().take(cursor).skip(open + 1) {
        if strings.step(c) {
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return true,
            ')' => depth -= 1,
            _ => {}
        }
    }
    false
}

/// Count commas at the call's top level between `open` and `cursor`.
///
/// Brackets and braces nest too, so list and dict literals passed as
/// arguments do not shift the index.
pub fn active_parameter(chars: &[char], open: usize, cursor: usize) -> usize {
    let cursor = cursor.min(chars.len());
    let mut depth = 0usize;
    let mut commas = 0usize;
    let mut strings = StringState::default();

    for &c in chars.iter().take(cursor).skip(open + 1) {
        if strings.step(c) {
            continue;
        }
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => commas += 1,
            _ => {}
        }
    }
    commas
}

/// Locate the enclosing call and classify it. `cursor` is a char offset.
pub fn scan(text: &str, cursor: usize) -> Option<SignatureContext> {
    let chars: Vec<char> = text.chars().collect();
    let open = find_call_open(&chars, cursor)?;
    let closed = is_call_closed(&chars, open, cursor);
    let active_parameter = if closed {
        0
    } else {
        active_parameter(&chars, open, cursor)
    };
    Some(SignatureContext {
        open_offset: open,
        closed,
        active_parameter,
    })
}

/// The enclosing call, only if it is still open at the cursor.
pub fn active_call(text: &str, cursor: usize) -> Option<SignatureContext> {
    scan(text, cursor).filter(SignatureContext::is_active)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_end(text: &str) -> Option<SignatureContext> {
        active_call(text, text.chars().count())
    }

    #[test]
    fn third_argument() {
        let ctx = at_end("compute(1, 2, na").unwrap();
        assert_eq!(ctx.open_offset, 7);
        assert!(!ctx.closed);
        assert_eq!(ctx.active_parameter, 2);
    }

    #[test]
    fn closed_call_has_no_context() {
        assert_eq!(at_end("compute(1, 2)"), None);
    }

    #[test]
    fn comma_inside_string_not_counted() {
        let ctx = at_end("compute(\"a,b\", 3").unwrap();
        assert_eq!(ctx.active_parameter, 1);
    }

    #[test]
    fn paren_inside_string_ignored() {
        let ctx = at_end("log(\"(\", x").unwrap();
        assert_eq!(ctx.open_offset, 3);
        assert_eq!(ctx.active_parameter, 1);

        let ctx = at_end("log('a)b', ").unwrap();
        assert_eq!(ctx.open_offset, 3);
        assert_eq!(ctx.active_parameter, 1);
    }

    #[test]
    fn escaped_quote_stays_inside_string() {
        let ctx = at_end(r#"fmt("say \"hi, there\"", "#).unwrap();
        assert_eq!(ctx.open_offset, 3);
        assert_eq!(ctx.active_parameter, 1);
    }

    #[test]
    fn nested_call_is_skipped() {
        let text = "outer(inner(1, 2), ";
        let ctx = at_end(text).unwrap();
        assert_eq!(ctx.open_offset, 5);
        assert_eq!(ctx.active_parameter, 1);
    }

    #[test]
    fn cursor_inside_nested_call() {
        let text = "outer(a, inner(1, ";
        let ctx = at_end(text).unwrap();
        assert_eq!(ctx.open_offset, 14);
        assert_eq!(ctx.active_parameter, 1);
    }

    #[test]
    fn list_literal_commas_not_counted() {
        let ctx = at_end("f([1, 2, 3], {'a': 1, 'b': 2}, ").unwrap();
        assert_eq!(ctx.active_parameter, 2);
    }

    #[test]
    fn unmatched_close_paren_is_skipped() {
        // The stray `)` swallows the only `(`, leaving no call.
        assert_eq!(at_end("x = f(a) + b)"), None);
        // A leading `)` before any `(` just raises depth.
        assert_eq!(find_call_open(&"g(1) ) ".chars().collect::<Vec<_>>(), 7), None);
    }

    #[test]
    fn no_call_at_all() {
        assert_eq!(at_end("x = 1"), None);
        assert_eq!(at_end(""), None);
    }

    #[test]
    fn cursor_before_close_paren() {
        let text = "compute(1, 2)";
        let ctx = active_call(text, 12).unwrap();
        assert_eq!(ctx.open_offset, 7);
        assert_eq!(ctx.active_parameter, 1);
    }

    #[test]
    fn scan_reports_closed_context() {
        let text = "(compute(1)";
        let ctx = scan(text, text.len()).unwrap();
        assert_eq!(ctx.open_offset, 0);
        assert!(!ctx.closed);

        let chars: Vec<char> = "f(1) ".chars().collect();
        assert!(is_call_closed(&chars, 1, chars.len()));
    }

    #[test]
    fn cursor_past_end_is_clamped() {
        let ctx = active_call("f(a, ", 100).unwrap();
        assert_eq!(ctx.active_parameter, 1);
    }

    #[test]
    fn multibyte_text_uses_char_offsets() {
        let ctx = at_end("名前(\"é\", ").unwrap();
        assert_eq!(ctx.open_offset, 2);
        assert_eq!(ctx.active_parameter, 1);
    }
}
