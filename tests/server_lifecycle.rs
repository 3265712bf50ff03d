mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::{MockTransport, completion_params, create_test_backend, open_ruby};
use solargraph_lsp::config::WORKSPACE_CONFIG_FILE;
use tower_lsp::LanguageServer;
use tower_lsp::jsonrpc::ErrorCode;
use tower_lsp::lsp_types::*;

fn folder(path: &str) -> WorkspaceFolder {
    WorkspaceFolder {
        uri: Url::from_file_path(path).unwrap(),
        name: path.to_string(),
    }
}

#[tokio::test]
async fn test_initialize_server_info() {
    let backend = create_test_backend(&MockTransport::suggesting(Vec::new()));
    let result = backend.initialize(InitializeParams::default()).await.unwrap();

    let server_info = result.server_info.expect("server_info should be present");
    assert_eq!(server_info.name, "solargraph-lsp");
    assert_eq!(server_info.version, Some(env!("CARGO_PKG_VERSION").to_string()));
}

#[tokio::test]
async fn test_initialize_capabilities() {
    let backend = create_test_backend(&MockTransport::suggesting(Vec::new()));
    let result = backend.initialize(InitializeParams::default()).await.unwrap();
    assert_eq!(result.offset_encoding, None);
    let caps = result.capabilities;
    assert_eq!(caps.position_encoding, Some(PositionEncodingKind::UTF16));

    let completion = caps
        .completion_provider
        .expect("completion provider should be enabled");
    assert_eq!(completion.resolve_provider, Some(true));
    assert_eq!(completion.trigger_characters, Some(vec![".".to_string()]));

    assert_eq!(
        caps.text_document_sync,
        Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL))
    );
    let folders = caps.workspace.and_then(|w| w.workspace_folders).unwrap();
    assert_eq!(folders.supported, Some(true));
}

#[tokio::test]
#[allow(deprecated)]
async fn test_initialize_reads_workspace_config() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(
        dir.path().join(WORKSPACE_CONFIG_FILE),
        "[documentation]\nkeep_loading_on_empty_merge = false\n\n[transport]\nrequest_timeout_ms = 2500\n",
    )
    .expect("failed to write config");

    let backend = create_test_backend(&MockTransport::suggesting(Vec::new()));
    let params = InitializeParams {
        root_uri: Some(Url::from_file_path(dir.path()).unwrap()),
        ..InitializeParams::default()
    };
    backend.initialize(params).await.unwrap();

    let config = backend.config();
    assert!(!config.documentation.keep_loading_on_empty_merge);
    assert_eq!(
        config.transport.request_timeout,
        Some(Duration::from_millis(2500))
    );
    assert_eq!(backend.workspace_root(), Some(dir.path().to_path_buf()));
}

#[tokio::test]
async fn test_initialize_falls_back_to_first_folder() {
    let backend = create_test_backend(&MockTransport::suggesting(Vec::new()));
    let params = InitializeParams {
        workspace_folders: Some(vec![folder("/work/app"), folder("/work/gems")]),
        ..InitializeParams::default()
    };
    backend.initialize(params).await.unwrap();

    assert_eq!(backend.workspace_root(), Some(PathBuf::from("/work/app")));
    assert_eq!(backend.workspace().folders().len(), 2);
}

#[tokio::test]
async fn test_workspace_folder_changes() {
    let transport = MockTransport::suggesting(Vec::new());
    let backend = create_test_backend(&transport);
    backend.workspace().add_folders(&[folder("/work/app")]);

    backend
        .did_change_workspace_folders(DidChangeWorkspaceFoldersParams {
            event: WorkspaceFoldersChangeEvent {
                added: vec![folder("/work/engine")],
                removed: vec![folder("/work/app")],
            },
        })
        .await;
    assert_eq!(backend.workspace().folders(), vec![PathBuf::from("/work/engine")]);

    let uri = Url::parse("file:///work/engine/lib/engine.rb").unwrap();
    open_ruby(&backend, &uri, "E").await;
    backend.completion(completion_params(&uri, 0, 1)).await.unwrap();
    assert_eq!(
        transport.suggest_requests.lock()[0].workspace.as_deref(),
        Some("/work/engine")
    );
}

#[tokio::test]
async fn test_did_open_and_close() {
    let backend = create_test_backend(&MockTransport::suggesting(Vec::new()));
    let uri = Url::parse("file:///test.rb").unwrap();

    open_ruby(&backend, &uri, "puts 1\n").await;
    let document = backend.document(&uri).expect("document should be stored");
    assert_eq!(document.text, "puts 1\n");

    backend
        .did_close(DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
        })
        .await;
    assert!(backend.document(&uri).is_none());
}

#[tokio::test]
async fn test_other_languages_are_ignored() {
    let backend = create_test_backend(&MockTransport::suggesting(Vec::new()));
    let uri = Url::parse("file:///index.html.erb").unwrap();

    backend
        .did_open(DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: "erb".to_string(),
                version: 1,
                text: "<%= x %>".to_string(),
            },
        })
        .await;
    assert!(backend.document(&uri).is_none());
}

#[tokio::test]
async fn test_completion_on_unopened_document() {
    let transport = MockTransport::suggesting(Vec::new());
    let backend = create_test_backend(&transport);
    let uri = Url::parse("file:///never_opened.rb").unwrap();

    let result = backend.completion(completion_params(&uri, 0, 0)).await.unwrap();
    assert!(result.is_none());
    assert_eq!(transport.suggest_calls(), 0);
}

#[tokio::test]
async fn test_shutdown() {
    let backend = create_test_backend(&MockTransport::suggesting(Vec::new()));
    backend.initialize(InitializeParams::default()).await.unwrap();
    assert!(backend.shutdown().await.is_ok());
}

#[tokio::test]
async fn test_shutdown_cancels_pending_completion() {
    let transport = MockTransport::suggesting(Vec::new());
    transport.hang_until_cancelled();
    let backend = Arc::new(create_test_backend(&transport));
    let uri = Url::parse("file:///slow.rb").unwrap();
    open_ruby(&backend, &uri, "x").await;

    let pending = {
        let backend = backend.clone();
        let uri = uri.clone();
        tokio::spawn(async move { backend.completion(completion_params(&uri, 0, 1)).await })
    };
    while transport.suggest_calls() == 0 {
        tokio::task::yield_now().await;
    }

    backend.shutdown().await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("completion should finish after shutdown")
        .unwrap();
    assert_eq!(result.unwrap_err().code, ErrorCode::RequestCancelled);
}
