/// LSP server trait implementation.
///
/// This module contains the `impl LanguageServer for Backend` block,
/// which handles all LSP protocol messages (initialize, didOpen, didChange,
/// didClose, completion, completion resolve, etc.), plus the setup of the
/// Solargraph connection once the workspace is known.
use std::path::PathBuf;
use std::sync::Arc;

use tower_lsp::LanguageServer;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;

use crate::document::Document;
use crate::error::SessionError;
use crate::session::ServerSession;
use crate::transport::HttpTransport;
use crate::{Backend, Connection};

/// Documents with any other language id are ignored.
pub const LANGUAGE_ID: &str = "ruby";

/// Characters that trigger completion besides ordinary typing.
pub const TRIGGER_CHARACTERS: &[&str] = &["."];

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(folders) = &params.workspace_folders {
            self.workspace.add_folders(folders);
        }

        let root = initial_root(&params);
        self.workspace.set_default_root(root.clone());
        if let Some(root) = &root {
            self.config.write().merge_workspace(root);
        }
        let capacity = self.config.read().completion.resolve_capacity;
        self.resolver.table().set_capacity(capacity);

        if self.connection.read().is_none() {
            match self.connect() {
                Ok(connection) => *self.connection.write() = Some(connection),
                Err(e) => tracing::error!("cannot set up Solargraph connection: {}", e),
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                position_encoding: Some(PositionEncodingKind::UTF16),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(true),
                    trigger_characters: Some(
                        TRIGGER_CHARACTERS.iter().map(|c| c.to_string()).collect(),
                    ),
                    ..CompletionOptions::default()
                }),
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: None,
                }),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: self.name.clone(),
                version: Some(self.version.clone()),
            }),
            offset_encoding: None,
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let Some(session) = self.connection().and_then(|c| c.session) else {
            self.log(MessageType::INFO, "Solargraph LSP initialized".to_string())
                .await;
            return;
        };

        let root = self.workspace.default_root();
        if let Err(e) = session.start(root.as_deref()) {
            tracing::error!("{}", e);
            self.log(
                MessageType::ERROR,
                format!("Could not start the Solargraph server: {}", e),
            )
            .await;
            return;
        }

        let timeout = self.config.read().server.ready_timeout;
        let client = self.client.clone();
        tokio::spawn(async move {
            let (typ, message) = match session.await_ready(timeout).await {
                Ok(url) => (
                    MessageType::INFO,
                    format!("Solargraph LSP initialized, server at {}", url),
                ),
                Err(e) => {
                    tracing::warn!("Solargraph server is not available: {}", e);
                    (
                        MessageType::WARNING,
                        format!("Solargraph server is not available: {}", e),
                    )
                }
            };
            if let Some(client) = client {
                client.log_message(typ, message).await;
            }
        });
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(session) = self.connection().and_then(|c| c.session) {
            session.stop().await;
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        if doc.language_id != LANGUAGE_ID {
            tracing::debug!("ignoring {} document {}", doc.language_id, doc.uri);
            return;
        }

        tracing::debug!("opened {}", doc.uri);
        self.open_files
            .lock()
            .insert(doc.uri.clone(), Document::new(doc.uri, doc.text));
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;

        // Full sync: the last change carries the whole text.
        if let Some(change) = params.content_changes.into_iter().last()
            && let Some(document) = self.open_files.lock().get_mut(&uri)
        {
            document.text = change.text;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.open_files.lock().remove(&params.text_document.uri);
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        self.workspace.remove_folders(&params.event.removed);
        self.workspace.add_folders(&params.event.added);
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        self.handle_completion(params).await
    }

    async fn completion_resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        self.handle_completion_resolve(item).await
    }
}

impl Backend {
    /// Build the session and HTTP transport from the current config:
    /// attach when a port is configured, spawn otherwise.
    fn connect(&self) -> std::result::Result<Connection, SessionError> {
        let config = self.config();
        let session = match config.server.port {
            Some(port) => ServerSession::attach(&config.server.host, port)?,
            None => ServerSession::spawned(config.server.clone()),
        };
        let session = Arc::new(session);
        let transport = HttpTransport::new(session.clone(), config.transport.request_timeout);
        Ok(Connection {
            transport: Arc::new(transport),
            session: Some(session),
        })
    }
}

/// The workspace root announced by the client: `rootUri`, or the first
/// workspace folder.
#[allow(deprecated)]
fn initial_root(params: &InitializeParams) -> Option<PathBuf> {
    params
        .root_uri
        .as_ref()
        .and_then(|uri| uri.to_file_path().ok())
        .or_else(|| {
            params
                .workspace_folders
                .as_ref()?
                .first()?
                .uri
                .to_file_path()
                .ok()
        })
}
