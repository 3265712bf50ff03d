/// Workspace root lookup.
///
/// Solargraph scopes its analysis to a workspace directory, so every
/// request carries the root of the workspace that contains the document.
/// Folders come from the `initialize` request and from
/// `workspace/didChangeWorkspaceFolders`; the `rootUri` of `initialize`
/// (or an explicitly configured directory) is the fallback for documents
/// outside every folder.
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tower_lsp::lsp_types::{Url, WorkspaceFolder};

#[derive(Debug, Default)]
pub struct WorkspaceResolver {
    folders: RwLock<Vec<PathBuf>>,
    default_root: RwLock<Option<PathBuf>>,
}

impl WorkspaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback root used for documents outside every folder.
    pub fn set_default_root(&self, root: Option<PathBuf>) {
        *self.default_root.write() = root;
    }

    pub fn default_root(&self) -> Option<PathBuf> {
        self.default_root.read().clone()
    }

    /// Register workspace folders.  Non-`file` URIs are ignored.
    pub fn add_folders(&self, folders: &[WorkspaceFolder]) {
        let mut guard = self.folders.write();
        for folder in folders {
            if let Ok(path) = folder.uri.to_file_path()
                && !guard.contains(&path)
            {
                guard.push(path);
            }
        }
    }

    pub fn remove_folders(&self, folders: &[WorkspaceFolder]) {
        let removed: Vec<PathBuf> = folders
            .iter()
            .filter_map(|f| f.uri.to_file_path().ok())
            .collect();
        self.folders.write().retain(|p| !removed.contains(p));
    }

    pub fn folders(&self) -> Vec<PathBuf> {
        self.folders.read().clone()
    }

    /// The root of the workspace containing `uri`.
    ///
    /// When folders are nested the deepest one wins.  Documents outside
    /// every folder (and non-`file` documents) get the default root.
    pub fn resolve_workspace_root(&self, uri: &Url) -> Option<PathBuf> {
        if let Ok(path) = uri.to_file_path()
            && let Some(folder) = self.deepest_folder_containing(&path)
        {
            return Some(folder);
        }
        self.default_root()
    }

    fn deepest_folder_containing(&self, path: &Path) -> Option<PathBuf> {
        self.folders
            .read()
            .iter()
            .filter(|folder| path.starts_with(folder))
            .max_by_key(|folder| folder.components().count())
            .cloned()
    }
}

/// Render a workspace root the way Solargraph expects it on the wire.
pub fn workspace_param(root: Option<&Path>) -> Option<String> {
    root.map(|r| r.display().to_string())
}
