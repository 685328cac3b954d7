//! Capability callbacks shared by every widget on one editor engine.
//!
//! The engine routes completion, hover, definition and signature requests
//! here. None of these surface errors to the widget: completion and
//! definition degrade to empty lists, hover and signature help fall back
//! to the last cached answer.

use std::sync::Mutex;
use std::time::Duration;

use lsp_types::{CompletionItem, Position};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::cache::ResponseCache;
use super::completion::{rank, to_completion_item, word_prefix};
use super::signature_context;
use super::TextModel;
use crate::config::BridgeConfig;
use crate::service::{
    lock, DefinitionTarget, HoverInfo, ServiceClient, ServiceResult, SignatureHelpInfo,
    SyncResponse,
};

pub struct LanguageProviders {
    client: ServiceClient,
    cache: Mutex<ResponseCache>,
    change_debounce: Duration,
}

impl std::fmt::Debug for LanguageProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageProviders")
            .field("change_debounce", &self.change_debounce)
            .finish_non_exhaustive()
    }
}

impl LanguageProviders {
    pub fn new(client: ServiceClient, config: &BridgeConfig) -> Self {
        Self::with_cache(
            client,
            ResponseCache::new(config.hover_cache_window(), config.signature_cache_window()),
            config.change_debounce(),
        )
    }

    pub fn with_cache(
        client: ServiceClient,
        cache: ResponseCache,
        change_debounce: Duration,
    ) -> Self {
        Self {
            client,
            cache: Mutex::new(cache),
            change_debounce,
        }
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    // ── Document sync ──

    /// Open or update the document on the service with its current text.
    pub async fn sync_document(&self, model: &dyn TextModel) -> ServiceResult<SyncResponse> {
        let outcome = self.client.ensure_open_and_sync(model.path(), &model.text()).await;
        if let Err(ref err) = outcome {
            warn!(path = %model.path(), error = %err, "document sync failed");
        }
        outcome
    }

    /// Queue a debounced change with the document's current text.
    pub fn document_changed(&self, model: &dyn TextModel) {
        let path = model.path();
        // Offsets shift on edit; old hovers would point at the wrong text.
        lock(&self.cache).hover.forget(path);
        self.client
            .change_file_debounced(self.change_debounce)
            .call(path, &model.text());
    }

    /// Drop cached answers for a document the widget closed.
    pub fn document_closed(&self, path: &str) {
        let mut cache = lock(&self.cache);
        cache.hover.forget(path);
        cache.signature.forget(path);
    }

    // ── Capabilities ──

    pub async fn provide_completions(
        &self,
        model: &dyn TextModel,
        position: Position,
        token: &CancellationToken,
    ) -> Vec<CompletionItem> {
        if token.is_cancelled() {
            return Vec::new();
        }

        let entries = match self.client.complete(model.path(), position).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %model.path(), error = %err, "completion request failed");
                return Vec::new();
            }
        };
        if token.is_cancelled() {
            return Vec::new();
        }

        let prefix = word_prefix(&model.text(), model.offset_at(position));
        rank(entries, &prefix, None)
            .into_iter()
            .map(to_completion_item)
            .collect()
    }

    pub async fn provide_hover(
        &self,
        model: &dyn TextModel,
        position: Position,
        token: &CancellationToken,
    ) -> Option<HoverInfo> {
        if token.is_cancelled() {
            return None;
        }

        let path = model.path();
        let offset = model.offset_at(position);
        let cached = lock(&self.cache).hover.fresh(path, offset, Instant::now());
        if let Some(hover) = cached {
            debug!(path = %path, offset, "hover cache hit");
            return hover;
        }

        let outcome = match self.client.hover(path, position).await {
            Ok(hover) => hover,
            Err(err) => {
                warn!(path = %path, error = %err, "hover request failed, using last answer");
                lock(&self.cache).hover.last(path, offset).flatten()
            }
        };
        lock(&self.cache)
            .hover
            .store(path, offset, outcome.clone(), Instant::now());

        if token.is_cancelled() {
            debug!(path = %path, "hover cancelled while in flight");
            return None;
        }
        outcome
    }

    pub async fn provide_definition(
        &self,
        model: &dyn TextModel,
        position: Position,
        token: &CancellationToken,
    ) -> Vec<DefinitionTarget> {
        if token.is_cancelled() {
            return Vec::new();
        }

        match self.client.definition(model.path(), position).await {
            Ok(targets) if !token.is_cancelled() => targets,
            Ok(_) => Vec::new(),
            Err(err) => {
                warn!(path = %model.path(), error = %err, "definition request failed");
                Vec::new()
            }
        }
    }

    pub async fn provide_signature_help(
        &self,
        model: &dyn TextModel,
        position: Position,
        token: &CancellationToken,
    ) -> Option<SignatureHelpInfo> {
        if token.is_cancelled() {
            return None;
        }

        let context = signature_context::active_call(&model.text(), model.offset_at(position))?;
        let active_parameter = u32::try_from(context.active_parameter).unwrap_or(u32::MAX);
        let path = model.path();

        let cached = lock(&self.cache)
            .signature
            .fresh(path, context.open_offset, Instant::now());
        let outcome = match cached {
            Some(help) => help,
            None => {
                let outcome = match self.client.signature(path, position).await {
                    Ok(help) => help,
                    Err(err) => {
                        warn!(
                            path = %path,
                            error = %err,
                            "signature request failed, using last answer"
                        );
                        lock(&self.cache).signature.last(path).flatten()
                    }
                };
                lock(&self.cache).signature.store(
                    path,
                    context.open_offset,
                    outcome.clone(),
                    Instant::now(),
                );
                outcome
            }
        };

        if token.is_cancelled() {
            return None;
        }
        outcome.map(|mut help| {
            help.active_parameter = active_parameter;
            help
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::lsp::engine::MemoryDocument;
    use crate::service::{Operation, ServiceError};
    use crate::test_support::MockTransport;

    fn providers(mock: &Arc<MockTransport>) -> LanguageProviders {
        let client = ServiceClient::new(mock.clone());
        LanguageProviders::with_cache(client, ResponseCache::default(), Duration::from_millis(300))
    }

    fn hover_reply(text: &str) -> serde_json::Value {
        json!({"result": {"contents": {"kind": "markdown", "value": text}}})
    }

    fn signature_reply() -> serde_json::Value {
        json!({"result": {
            "signatures": [{
                "label": "f(a, b, c)",
                "parameters": [{"label": "a"}, {"label": "b"}, {"label": "c"}]
            }],
            "activeSignature": 0,
            "activeParameter": 0
        }})
    }

    #[tokio::test(start_paused = true)]
    async fn hover_is_cached_for_its_window() {
        let mock = MockTransport::new();
        mock.reply(Operation::Hover, hover_reply("os module"));
        mock.reply(Operation::Hover, hover_reply("os module v2"));
        let providers = providers(&mock);
        let doc = MemoryDocument::new("/w/a.py", "import os\n");
        let token = CancellationToken::new();
        let pos = Position::new(0, 8);

        let first = providers.provide_hover(&doc, pos, &token).await;
        assert_eq!(first.map(|h| h.content).as_deref(), Some("os module"));

        tokio::time::advance(Duration::from_millis(200)).await;
        let cached = providers.provide_hover(&doc, pos, &token).await;
        assert_eq!(cached.map(|h| h.content).as_deref(), Some("os module"));
        assert_eq!(mock.count(Operation::Hover), 1);

        tokio::time::advance(Duration::from_millis(60)).await;
        let refreshed = providers.provide_hover(&doc, pos, &token).await;
        assert_eq!(refreshed.map(|h| h.content).as_deref(), Some("os module v2"));
        assert_eq!(mock.count(Operation::Hover), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hover_falls_back_to_last_answer() {
        let mock = MockTransport::new();
        mock.reply(Operation::Hover, hover_reply("os module"));
        let providers = providers(&mock);
        let doc = MemoryDocument::new("/w/a.py", "import os\n");
        let token = CancellationToken::new();
        let pos = Position::new(0, 8);

        providers.provide_hover(&doc, pos, &token).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        mock.fail(Operation::Hover, ServiceError::Network("down".into()));
        let fallback = providers.provide_hover(&doc, pos, &token).await;
        assert_eq!(fallback.map(|h| h.content).as_deref(), Some("os module"));

        // A different position has no history.
        mock.fail(Operation::Hover, ServiceError::Network("down".into()));
        assert!(providers.provide_hover(&doc, Position::new(0, 1), &token).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_hover_returns_nothing_but_is_cached() {
        let mock = MockTransport::new();
        mock.reply_after(Operation::Hover, Duration::from_millis(50), hover_reply("late"));
        let providers = Arc::new(providers(&mock));
        let doc = Arc::new(MemoryDocument::new("/w/a.py", "import os\n"));
        let token = CancellationToken::new();
        let pos = Position::new(0, 8);

        let task = {
            let (providers, doc, token) = (providers.clone(), doc.clone(), token.clone());
            tokio::spawn(async move { providers.provide_hover(doc.as_ref(), pos, &token).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        assert!(task.await.unwrap().is_none());

        let fresh = providers
            .provide_hover(doc.as_ref(), pos, &CancellationToken::new())
            .await;
        assert_eq!(fresh.map(|h| h.content).as_deref(), Some("late"));
        assert_eq!(mock.count(Operation::Hover), 1);
    }

    #[tokio::test]
    async fn completions_are_ranked_and_failures_are_empty() {
        let mock = MockTransport::new();
        mock.reply(
            Operation::Complete,
            json!({"results": [
                {"name": "__path__", "type": "Variable"},
                {"name": "getpid", "type": "Function"},
                {"name": "path", "type": "Module"},
                {"name": "_exit", "type": "Function"}
            ]}),
        );
        let providers = providers(&mock);
        let doc = MemoryDocument::new("/w/a.py", "import os\nos.pa");
        let token = CancellationToken::new();

        let items = providers
            .provide_completions(&doc, Position::new(1, 5), &token)
            .await;
        assert_eq!(items[0].label, "path");
        assert_eq!(items[0].kind, Some(lsp_types::CompletionItemKind::MODULE));
        assert_eq!(items.len(), 4);

        mock.fail(Operation::Complete, ServiceError::Network("down".into()));
        let items = providers
            .provide_completions(&doc, Position::new(1, 5), &token)
            .await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn definition_failure_is_empty() {
        let mock = MockTransport::new();
        mock.fail(
            Operation::Definition,
            ServiceError::Server {
                status: 500,
                body: "boom".into(),
            },
        );
        let providers = providers(&mock);
        let doc = MemoryDocument::new("/w/a.py", "x = 1\n");
        let targets = providers
            .provide_definition(&doc, Position::new(0, 0), &CancellationToken::new())
            .await;
        assert!(targets.is_empty());
    }

    #[tokio::test]
    async fn signature_help_skips_closed_calls_without_a_request() {
        let mock = MockTransport::new();
        let providers = providers(&mock);
        let doc = MemoryDocument::new("/w/a.py", "f(a, b) ");
        let help = providers
            .provide_signature_help(&doc, Position::new(0, 8), &CancellationToken::new())
            .await;
        assert!(help.is_none());

        let doc = MemoryDocument::new("/w/b.py", "x = 1");
        let help = providers
            .provide_signature_help(&doc, Position::new(0, 5), &CancellationToken::new())
            .await;
        assert!(help.is_none());
        assert_eq!(mock.count(Operation::Signature), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn signature_help_uses_local_parameter_and_cache() {
        let mock = MockTransport::new();
        mock.reply(Operation::Signature, signature_reply());
        let providers = providers(&mock);
        let token = CancellationToken::new();

        let doc = MemoryDocument::new("/w/a.py", "f(a, b");
        let help = providers
            .provide_signature_help(&doc, Position::new(0, 6), &token)
            .await
            .expect("help");
        assert_eq!(help.active_parameter, 1);

        // Same call, next argument: served from cache with a new index.
        doc.set_text("f(a, b, ");
        let help = providers
            .provide_signature_help(&doc, Position::new(0, 8), &token)
            .await
            .expect("help");
        assert_eq!(help.active_parameter, 2);
        assert_eq!(mock.count(Operation::Signature), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn signature_help_falls_back_on_failure() {
        let mock = MockTransport::new();
        mock.reply(Operation::Signature, signature_reply());
        let providers = providers(&mock);
        let token = CancellationToken::new();
        let doc = MemoryDocument::new("/w/a.py", "f(a");

        providers
            .provide_signature_help(&doc, Position::new(0, 3), &token)
            .await;
        tokio::time::advance(Duration::from_secs(2)).await;

        mock.fail(Operation::Signature, ServiceError::Network("down".into()));
        let help = providers
            .provide_signature_help(&doc, Position::new(0, 3), &token)
            .await
            .expect("fallback");
        assert_eq!(help.signatures[0].label, "f(a, b, c)");
        assert_eq!(mock.count(Operation::Signature), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn document_changes_are_debounced() {
        let mock = MockTransport::new();
        let providers = providers(&mock);
        let doc = MemoryDocument::new("/w/a.py", "x");
        providers.sync_document(&doc).await.unwrap();

        for text in ["x =", "x = 1", "x = 12"] {
            doc.set_text(text);
            providers.document_changed(&doc);
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        let bodies = mock.bodies(Operation::Change);
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["fileContent"], "x = 12");
    }
}
