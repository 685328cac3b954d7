//! Wire shapes of the analysis service and their normalized forms.
//!
//! The service relays raw language-server payloads, so responses arrive in
//! several equivalent shapes. Everything here folds them into one fixed
//! shape per capability; empty results are values, never errors.

use lsp_types::{
    Documentation, HoverContents, MarkedString, ParameterLabel, Range, SignatureHelp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::error::{ServiceError, ServiceResult};

// ── Requests ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SyncRequest<'a> {
    pub file_path: &'a str,
    pub file_content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PositionRequest<'a> {
    pub file_path: &'a str,
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct PathRequest<'a> {
    pub path: &'a str,
}

// ── Sync ──

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SyncReply {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub version: Option<i64>,
}

impl SyncReply {
    pub(crate) fn parse(body: &Value) -> Self {
        serde_json::from_value(body.clone()).unwrap_or_default()
    }
}

/// Outcome of an open or change: the server's uri and the session version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResponse {
    pub uri: String,
    pub version: i64,
}

// ── Completion ──

/// One completion candidate as the service reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletionEntry {
    pub name: String,
    /// Human-readable kind ("Function", "Variable", ...).
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub(crate) fn parse_completions(body: &Value) -> Vec<CompletionEntry> {
    let list = body
        .get("results")
        .and_then(Value::as_array)
        .or_else(|| body.as_array());
    let Some(list) = list else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("skipping malformed completion entry: {e}");
                None
            }
        })
        .collect()
}

// ── Hover ──

/// Hover information for a position in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct HoverInfo {
    /// Content to display (plain text or markdown).
    pub content: String,
    /// Optional range the hover applies to.
    pub range: Option<Range>,
}

/// The `result` member of a relayed response, or the body itself.
fn result_of(body: &Value) -> &Value {
    match body.get("result") {
        Some(result) => result,
        None => body,
    }
}

pub(crate) fn parse_hover(body: &Value) -> ServiceResult<Option<HoverInfo>> {
    let result = result_of(body);
    let Some(contents) = result.get("contents") else {
        return Ok(None);
    };

    let contents: HoverContents = serde_json::from_value(contents.clone())
        .map_err(|e| ServiceError::InvalidResponse(format!("hover contents: {e}")))?;
    let content = render_hover_contents(contents);
    if content.trim().is_empty() {
        return Ok(None);
    }

    let range = result
        .get("range")
        .and_then(|r| serde_json::from_value(r.clone()).ok());
    Ok(Some(HoverInfo { content, range }))
}

fn render_hover_contents(contents: HoverContents) -> String {
    match contents {
        HoverContents::Scalar(marked) => render_marked(marked),
        HoverContents::Array(list) => list
            .into_iter()
            .map(render_marked)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        HoverContents::Markup(markup) => markup.value,
    }
}

fn render_marked(marked: MarkedString) -> String {
    match marked {
        MarkedString::String(text) => text,
        MarkedString::LanguageString(code) => {
            format!("```{}\n{}\n```", code.language, code.value)
        }
    }
}

// ── Definition ──

/// A go-to-definition target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionTarget {
    pub uri: String,
    pub range: Range,
}

/// Accepts both `Location` and `LocationLink` shapes.
#[derive(Debug, Deserialize)]
struct RawLocation {
    #[serde(alias = "targetUri")]
    uri: String,
    #[serde(alias = "targetRange")]
    range: Range,
}

pub(crate) fn parse_definition(body: &Value) -> Vec<DefinitionTarget> {
    let items: Vec<&Value> = match result_of(body) {
        Value::Null => Vec::new(),
        Value::Array(list) => list.iter().collect(),
        single => vec![single],
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawLocation>(item.clone()) {
            Ok(raw) => Some(DefinitionTarget {
                uri: raw.uri,
                range: raw.range,
            }),
            Err(e) => {
                debug!("skipping malformed definition location: {e}");
                None
            }
        })
        .collect()
}

// ── Signature help ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    pub label: String,
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub label: String,
    pub documentation: Option<String>,
    pub parameters: Vec<ParameterInfo>,
}

/// Normalized signature help. Never constructed with zero signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHelpInfo {
    pub signatures: Vec<SignatureInfo>,
    pub active_signature: u32,
    pub active_parameter: u32,
}

impl SignatureHelpInfo {
    /// The signature to display, falling back to the first one.
    pub fn active(&self) -> Option<&SignatureInfo> {
        self.signatures
            .get(self.active_signature as usize)
            .or_else(|| self.signatures.first())
    }
}

pub(crate) fn parse_signature(body: &Value) -> ServiceResult<Option<SignatureHelpInfo>> {
    let result = result_of(body);
    if result.is_null() {
        return Ok(None);
    }

    let help: SignatureHelp = serde_json::from_value(result.clone())
        .map_err(|e| ServiceError::InvalidResponse(format!("signature help: {e}")))?;
    if help.signatures.is_empty() {
        return Ok(None);
    }

    let signatures = help
        .signatures
        .into_iter()
        .map(|sig| {
            let parameters = sig
                .parameters
                .unwrap_or_default()
                .into_iter()
                .map(|param| ParameterInfo {
                    label: parameter_label(&sig.label, param.label),
                    documentation: param.documentation.map(documentation_text),
                })
                .collect();
            SignatureInfo {
                documentation: sig.documentation.map(documentation_text),
                label: sig.label,
                parameters,
            }
        })
        .collect();

    Ok(Some(SignatureHelpInfo {
        signatures,
        active_signature: help.active_signature.unwrap_or(0),
        active_parameter: help.active_parameter.unwrap_or(0),
    }))
}

fn parameter_label(signature: &str, label: ParameterLabel) -> String {
    match label {
        ParameterLabel::Simple(text) => text,
        ParameterLabel::LabelOffsets([start, end]) => signature
            .chars()
            .skip(start as usize)
            .take(end.saturating_sub(start) as usize)
            .collect(),
    }
}

fn documentation_text(doc: Documentation) -> String {
    match doc {
        Documentation::String(text) => text,
        Documentation::MarkupContent(markup) => markup.value,
    }
}

// ── Diagnostics ──

/// Raw diagnostics the service last published for one document.
///
/// Entries stay as JSON so a single malformed one can be skipped later
/// without losing the rest of the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticBatch {
    pub uri: String,
    pub entries: Vec<Value>,
}

pub(crate) fn parse_diagnostics(body: &Value) -> ServiceResult<Vec<DiagnosticBatch>> {
    let list = body.as_array().ok_or_else(|| {
        ServiceError::InvalidResponse("diagnostics snapshot is not a list".into())
    })?;

    let mut batches: Vec<DiagnosticBatch> = Vec::new();
    for item in list {
        let params = item.get("params").unwrap_or(item);
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            debug!("skipping diagnostics notification without uri");
            continue;
        };
        let entries = params
            .get("diagnostics")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        // Later notifications for a document supersede earlier ones.
        match batches.iter_mut().find(|b| b.uri == uri) {
            Some(existing) => existing.entries = entries,
            None => batches.push(DiagnosticBatch {
                uri: uri.to_string(),
                entries,
            }),
        }
    }
    Ok(batches)
}
