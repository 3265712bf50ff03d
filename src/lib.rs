use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tower_lsp::Client;
use tower_lsp::lsp_types::*;

pub mod completion;
pub mod config;
pub mod document;
pub mod error;
pub mod format;
mod server;
pub mod session;
pub mod transport;
pub mod types;
mod util;
pub mod workspace;

pub use completion::mapper::SuggestionMapper;
pub use completion::resolver::{DocumentationResolver, LOADING_SENTINEL};
pub use config::Config;
pub use document::Document;
pub use error::{ConfigError, SessionError, TransportError};
pub use session::ServerSession;
pub use transport::{HttpTransport, SuggestionTransport};
pub use types::{
    ResolveRequest, ResolveResponse, SuggestRequest, SuggestResponse, SuggestionKind,
    SuggestionRecord,
};
pub use workspace::WorkspaceResolver;

/// The live connection to Solargraph: the transport requests go through
/// and, unless a transport was injected, the session that owns the server.
#[derive(Clone)]
pub(crate) struct Connection {
    pub(crate) transport: Arc<dyn SuggestionTransport>,
    pub(crate) session: Option<Arc<ServerSession>>,
}

pub struct Backend {
    name: String,
    version: String,
    /// Open documents keyed by URI.
    open_files: Arc<Mutex<HashMap<Url, Document>>>,
    config: Arc<RwLock<Config>>,
    workspace: Arc<WorkspaceResolver>,
    resolver: Arc<DocumentationResolver>,
    connection: Arc<RwLock<Option<Connection>>>,
    /// Parent of every in-flight request's cancellation token.
    shutdown: CancellationToken,
    client: Option<Client>,
}

impl Backend {
    pub fn new(client: Client, config: Config) -> Self {
        Self::build(Some(client), config, None)
    }

    /// A backend without an editor connection that sends every request
    /// through `transport`.
    pub fn new_test(transport: Arc<dyn SuggestionTransport>) -> Self {
        Self::new_test_with_config(transport, Config::default())
    }

    pub fn new_test_with_config(transport: Arc<dyn SuggestionTransport>, config: Config) -> Self {
        Self::build(
            None,
            config,
            Some(Connection {
                transport,
                session: None,
            }),
        )
    }

    fn build(client: Option<Client>, config: Config, connection: Option<Connection>) -> Self {
        let resolver = DocumentationResolver::new(config.completion.resolve_capacity);
        Self {
            name: "solargraph-lsp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            open_files: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(RwLock::new(config)),
            workspace: Arc::new(WorkspaceResolver::new()),
            resolver: Arc::new(resolver),
            connection: Arc::new(RwLock::new(connection)),
            shutdown: CancellationToken::new(),
            client,
        }
    }

    /// Current effective configuration.
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    pub fn workspace(&self) -> &WorkspaceResolver {
        &self.workspace
    }

    pub fn resolver(&self) -> &DocumentationResolver {
        &self.resolver
    }

    /// The stored copy of an open document.
    pub fn document(&self, uri: &Url) -> Option<Document> {
        self.open_files.lock().get(uri).cloned()
    }

    /// The default workspace root, as recorded at `initialize`.
    pub fn workspace_root(&self) -> Option<PathBuf> {
        self.workspace.default_root()
    }
}
