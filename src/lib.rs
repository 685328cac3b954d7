//! fusion-bridge: connects editor widgets to a remote code-intelligence
//! service.
//!
//! Documents are synchronized over HTTP, completion, hover, definition and
//! signature requests are answered through shared per-engine providers,
//! and diagnostics are polled into widget markers.

pub mod config;
pub mod lsp;
pub mod service;

#[cfg(test)]
mod test_support;
