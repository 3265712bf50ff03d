#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use solargraph_lsp::error::TransportResult;
use solargraph_lsp::{
    Backend, Config, ResolveRequest, ResolveResponse, SuggestRequest, SuggestResponse,
    SuggestionKind, SuggestionRecord, SuggestionTransport, TransportError,
};
use tokio_util::sync::CancellationToken;
use tower_lsp::LanguageServer;
use tower_lsp::lsp_types::*;

/// A transport with scripted answers that records every request.
///
/// A `None` answer makes the call fail with an HTTP 500.
#[derive(Default)]
pub struct MockTransport {
    pub suggest_reply: Mutex<Option<SuggestResponse>>,
    pub resolve_reply: Mutex<Option<ResolveResponse>>,
    pub suggest_requests: Mutex<Vec<SuggestRequest>>,
    pub resolve_requests: Mutex<Vec<ResolveRequest>>,
    /// Suggest calls wait for their cancellation token instead of replying.
    pub hang: Mutex<bool>,
}

impl MockTransport {
    pub fn suggesting(suggestions: Vec<SuggestionRecord>) -> Arc<Self> {
        let mock = Self::default();
        *mock.suggest_reply.lock() = Some(SuggestResponse::Ok { suggestions });
        Arc::new(mock)
    }

    pub fn set_suggest(&self, reply: Option<SuggestResponse>) {
        *self.suggest_reply.lock() = reply;
    }

    pub fn set_resolve(&self, reply: Option<ResolveResponse>) {
        *self.resolve_reply.lock() = reply;
    }

    pub fn hang_until_cancelled(&self) {
        *self.hang.lock() = true;
    }

    pub fn suggest_calls(&self) -> usize {
        self.suggest_requests.lock().len()
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_requests.lock().len()
    }
}

fn server_error() -> TransportError {
    TransportError::Status {
        status: 500,
        body: "Internal Server Error".to_string(),
    }
}

#[tower_lsp::async_trait]
impl SuggestionTransport for MockTransport {
    async fn suggest(
        &self,
        request: SuggestRequest,
        cancel: &CancellationToken,
    ) -> TransportResult<SuggestResponse> {
        self.suggest_requests.lock().push(request);
        let hang = *self.hang.lock();
        if hang {
            cancel.cancelled().await;
            return Err(TransportError::Cancelled);
        }
        self.suggest_reply.lock().clone().ok_or_else(server_error)
    }

    async fn resolve(
        &self,
        request: ResolveRequest,
        _cancel: &CancellationToken,
    ) -> TransportResult<ResolveResponse> {
        self.resolve_requests.lock().push(request);
        self.resolve_reply.lock().clone().ok_or_else(server_error)
    }
}

pub fn create_test_backend(transport: &Arc<MockTransport>) -> Backend {
    Backend::new_test(transport.clone())
}

pub fn create_test_backend_with_config(transport: &Arc<MockTransport>, config: Config) -> Backend {
    Backend::new_test_with_config(transport.clone(), config)
}

pub fn record(label: &str, kind: SuggestionKind, insert: &str) -> SuggestionRecord {
    SuggestionRecord {
        label: label.to_string(),
        kind,
        insert: insert.to_string(),
        ..SuggestionRecord::default()
    }
}

pub async fn open_ruby(backend: &Backend, uri: &Url, text: &str) {
    backend
        .did_open(DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: "ruby".to_string(),
                version: 1,
                text: text.to_string(),
            },
        })
        .await;
}

pub fn completion_params(uri: &Url, line: u32, character: u32) -> CompletionParams {
    CompletionParams {
        text_document_position: TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            position: Position { line, character },
        },
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
        context: None,
    }
}

/// Request completion at `line:character` and unwrap the item list.
pub async fn complete(
    backend: &Backend,
    uri: &Url,
    line: u32,
    character: u32,
) -> Vec<CompletionItem> {
    let result = backend
        .completion(completion_params(uri, line, character))
        .await
        .unwrap();
    match result {
        Some(CompletionResponse::Array(items)) => items,
        Some(CompletionResponse::List(list)) => list.items,
        None => panic!("expected completion results"),
    }
}

pub fn doc_string(item: &CompletionItem) -> Option<&str> {
    match item.documentation.as_ref()? {
        Documentation::String(s) => Some(s),
        Documentation::MarkupContent(m) => Some(&m.value),
    }
}
