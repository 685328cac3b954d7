//! Editor-side language intelligence: the seam between editor widgets and
//! the analysis service.
//!
//! The editor widget is an external collaborator reached through three
//! traits: [`EditorEngine`] (provider registration, open documents,
//! markers), [`TextModel`] (document text and cursor conversion), and
//! [`Disposable`] (one per registration). Everything else here is ours:
//! the shared [`providers::LanguageProviders`], the per-engine
//! [`registry::ProviderRegistry`], the diagnostics poller, and the caches
//! and text heuristics they use.

pub mod cache;
pub mod completion;
pub mod diagnostics;
pub mod engine;
pub mod providers;
pub mod registry;
pub mod signature_context;

use std::sync::Arc;

use lsp_types::{DiagnosticSeverity, Position, Range};

pub use crate::service::HoverInfo;
pub use providers::LanguageProviders;
pub use registry::{ProviderLease, ProviderRegistry};

/// Owner tag for every marker set this crate publishes.
pub const MARKER_OWNER: &str = "fusion";

/// A capability the engine can route to the shared providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Completion,
    Hover,
    Definition,
    Signature,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Completion,
        Capability::Hover,
        Capability::Definition,
        Capability::Signature,
    ];
}

/// Handle returned by a registration; disposing it unregisters.
pub trait Disposable: Send {
    fn dispose(self: Box<Self>);
}

/// Read access to one document model in the widget.
pub trait TextModel: Send + Sync {
    /// Path the document is known by (also what the service is sent).
    fn path(&self) -> &str;

    /// Full current text.
    fn text(&self) -> String;

    /// Char offset of a 0-based line/character position.
    fn offset_at(&self, position: Position) -> usize;
}

/// The embedded editor engine. Several widgets may share one engine
/// instance; the registry keys records by its identity.
///
/// Implementations must not call back into the registry from `register`
/// or from a disposal.
pub trait EditorEngine: Send + Sync {
    /// Route a capability to the providers until the handle is disposed.
    fn register(
        &self,
        capability: Capability,
        providers: Arc<LanguageProviders>,
    ) -> Box<dyn Disposable>;

    /// Paths of every document currently open in any widget.
    fn open_documents(&self) -> Vec<String>;

    /// Replace (never append to) the markers `owner` shows on a document.
    fn set_markers(&self, path: &str, owner: &str, markers: Vec<Marker>);
}

/// A range in the widget's 1-based line/column convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetRange {
    pub start_line_number: u32,
    pub start_column: u32,
    pub end_line_number: u32,
    pub end_column: u32,
}

impl WidgetRange {
    /// Convert a 0-based protocol range.
    pub fn from_lsp(range: Range) -> Self {
        Self {
            start_line_number: range.start.line.saturating_add(1),
            start_column: range.start.character.saturating_add(1),
            end_line_number: range.end.line.saturating_add(1),
            end_column: range.end.character.saturating_add(1),
        }
    }
}

/// Marker severity, valued as the widget expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum MarkerSeverity {
    Hint = 1,
    Info = 2,
    Warning = 4,
    Error = 8,
}

impl MarkerSeverity {
    /// LSP: 1=Error, 2=Warning, 3=Info, 4=Hint. Absent means Error.
    pub fn from_lsp(severity: Option<DiagnosticSeverity>) -> Self {
        match severity {
            None | Some(DiagnosticSeverity::ERROR) => Self::Error,
            Some(DiagnosticSeverity::WARNING) => Self::Warning,
            Some(DiagnosticSeverity::HINT) => Self::Hint,
            Some(_) => Self::Info,
        }
    }
}

/// A diagnostic annotation ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub range: WidgetRange,
    pub severity: MarkerSeverity,
    pub message: String,
    pub source: Option<String>,
    pub code: Option<String>,
}

/// Char offset of a 0-based position in `text`, clamped to the line and
/// document ends.
pub fn offset_at(text: &str, position: Position) -> usize {
    let mut offset = 0usize;
    for (idx, line) in text.split('\n').enumerate() {
        let len = line.chars().count();
        if idx == position.line as usize {
            return offset + len.min(position.character as usize);
        }
        offset += len + 1;
    }
    text.chars().count()
}
