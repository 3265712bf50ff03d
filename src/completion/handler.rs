/// Completion request orchestration.
///
/// This module contains the `handle_completion` and
/// `handle_completion_resolve` methods called by the `LanguageServer`
/// implementation.  They build the Solargraph request from the editor's
/// state, send it through the transport, and hand the answer to the
/// mapper or the documentation resolver.
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;

use crate::Backend;
use crate::completion::mapper::SuggestionMapper;
use crate::completion::resolver::DocumentationState;
use crate::types::{SuggestRequest, SuggestResponse};
use crate::util::rpc_error;
use crate::workspace::workspace_param;

impl Backend {
    /// Main completion handler, called by `LanguageServer::completion`.
    ///
    /// Returns `None` for documents the editor never opened.  A logical
    /// error reported by Solargraph is logged and answered with an empty
    /// list; failing to reach Solargraph at all is a request error.
    pub(crate) async fn handle_completion(
        &self,
        params: CompletionParams,
    ) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let Some(document) = self.document(&uri) else {
            return Ok(None);
        };
        let transport = self.transport().map_err(rpc_error)?;

        let root = self.workspace.resolve_workspace_root(&uri);
        let request = SuggestRequest {
            filename: document.file_name(),
            text: document.text.clone(),
            line: position.line,
            col: document.char_column(position),
            workspace: workspace_param(root.as_deref()),
        };

        let cancel = self.shutdown.child_token();
        let response = transport
            .suggest(request, &cancel)
            .await
            .map_err(rpc_error)?;

        if let SuggestResponse::Error { message } = &response {
            tracing::warn!("Solargraph server returned an error: {}", message);
            self.log(
                MessageType::WARNING,
                format!("Solargraph server returned an error: {}", message),
            )
            .await;
            return Ok(Some(CompletionResponse::Array(Vec::new())));
        }

        let link_base_url = self.config.read().documentation.link_base_url.clone();
        let mapper = SuggestionMapper::new(&link_base_url, self.resolver.table());
        let items = mapper.map_suggestions(&response, &document, position);
        tracing::debug!("{} completion item(s) for {}", items.len(), uri);

        Ok(Some(CompletionResponse::Array(items)))
    }

    /// Called by `LanguageServer::completion_resolve` when the editor
    /// highlights an item.
    pub(crate) async fn handle_completion_resolve(
        &self,
        item: CompletionItem,
    ) -> Result<CompletionItem> {
        if DocumentationState::of(&item) != DocumentationState::Loading {
            return Ok(item);
        }
        let transport = self.transport().map_err(rpc_error)?;
        let options = self.config.read().documentation.clone();
        let cancel = self.shutdown.child_token();

        self.resolver
            .resolve(item, transport.as_ref(), &self.workspace, &options, &cancel)
            .await
            .map_err(rpc_error)
    }
}
