//! Completion ranking and conversion to editor completion items.
//!
//! The service returns candidates in the language server's order, which
//! ignores what the user has typed. Ranking here mirrors what editors do:
//! prefix matches first, then substring matches, then subsequence matches;
//! public names before `_private` before `__dunder__`; stable otherwise.

use lsp_types::{CompletionItem, CompletionItemKind};

use crate::service::CompletionEntry;

/// The identifier fragment immediately before the cursor.
pub fn word_prefix(text: &str, cursor: usize) -> String {
    let chars: Vec<char> = text.chars().take(cursor).collect();
    let start = chars
        .iter()
        .rposition(|c| !(c.is_alphanumeric() || *c == '_'))
        .map(|idx| idx + 1)
        .unwrap_or(0);
    chars[start..].iter().collect()
}

fn visibility_group(label: &str) -> u8 {
    if label.len() > 4 && label.starts_with("__") && label.ends_with("__") {
        2
    } else if label.starts_with('_') {
        1
    } else {
        0
    }
}

/// Average index of the needle's chars found in order, or None.
fn subsequence_score(needle: &str, haystack: &str) -> Option<f64> {
    if needle.is_empty() {
        return Some(0.0);
    }
    let hay: Vec<char> = haystack.chars().collect();
    let mut from = 0;
    let mut total = 0usize;
    let mut count = 0usize;
    for ch in needle.chars() {
        let pos = hay[from..].iter().position(|&c| c == ch)? + from;
        total += pos;
        count += 1;
        from = pos + 1;
    }
    Some(total as f64 / count as f64)
}

/// Lower is better.
fn match_boost(prefix: &str, label: &str) -> i64 {
    if prefix.is_empty() {
        return 0;
    }
    if label.starts_with(prefix) {
        return -1000;
    }
    if let Some(pos) = label.find(prefix) {
        return -500 + pos as i64;
    }
    match subsequence_score(prefix, label) {
        Some(score) => -250 + score.min(200.0) as i64,
        None => 0,
    }
}

/// Rank candidates against the typed prefix (case-insensitive).
pub fn rank(
    entries: Vec<CompletionEntry>,
    prefix: &str,
    limit: Option<usize>,
) -> Vec<CompletionEntry> {
    let prefix = prefix.to_lowercase();
    let mut keyed: Vec<(i64, u8, String, CompletionEntry)> = entries
        .into_iter()
        .map(|entry| {
            let label = entry.name.to_lowercase();
            (
                match_boost(&prefix, &label),
                visibility_group(&entry.name),
                label,
                entry,
            )
        })
        .collect();

    // sort_by is stable: ties keep the service's order.
    keyed.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });

    let ranked = keyed.into_iter().map(|(_, _, _, entry)| entry);
    match limit {
        Some(n) => ranked.take(n).collect(),
        None => ranked.collect(),
    }
}

/// Map the service's kind name back onto the protocol kind.
pub fn completion_kind(kind: Option<&str>) -> Option<CompletionItemKind> {
    let kind = match kind? {
        "File" => CompletionItemKind::FILE,
        "Module" | "Namespace" | "Package" => CompletionItemKind::MODULE,
        "Class" => CompletionItemKind::CLASS,
        "Variable" => CompletionItemKind::VARIABLE,
        "Method" => CompletionItemKind::METHOD,
        "Function" | "Function Type" => CompletionItemKind::FUNCTION,
        "Property" => CompletionItemKind::PROPERTY,
        "Field" => CompletionItemKind::FIELD,
        "Constructor" => CompletionItemKind::CONSTRUCTOR,
        "Enum" => CompletionItemKind::ENUM,
        "Interface" => CompletionItemKind::INTERFACE,
        "Constant" => CompletionItemKind::CONSTANT,
        "String" | "Number" | "Boolean" | "Null" => CompletionItemKind::VALUE,
        "Array" | "Object" | "Struct" => CompletionItemKind::STRUCT,
        "Key" => CompletionItemKind::KEYWORD,
        "EnumMember" => CompletionItemKind::ENUM_MEMBER,
        "Event" => CompletionItemKind::EVENT,
        "Operator" => CompletionItemKind::OPERATOR,
        "TypeParameter" => CompletionItemKind::TYPE_PARAMETER,
        _ => return None,
    };
    Some(kind)
}

pub fn to_completion_item(entry: CompletionEntry) -> CompletionItem {
    CompletionItem {
        kind: completion_kind(entry.kind.as_deref()),
        detail: entry.kind,
        documentation: entry.description.map(lsp_types::Documentation::String),
        label: entry.name,
        ..Default::default()
    }
}
