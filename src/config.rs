//! Configuration loading.
//!
//! Settings are layered: built-in defaults, then the user config file
//! (`<config dir>/solargraph-lsp/config.toml`), then a
//! `.solargraph-lsp.toml` at the workspace root, then command-line flags.
//! Each file only needs to mention the keys it overrides.
//!
//! ```toml
//! [server]
//! command = ["solargraph", "server"]
//! bundler = "auto"
//! port = 7657            # attach to a running server instead of spawning
//!
//! [transport]
//! request_timeout_ms = 10000
//!
//! [documentation]
//! link_base_url = "https://www.rubydoc.info/stdlib/core"
//! keep_loading_on_empty_merge = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use etcetera::BaseStrategy;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::format::DEFAULT_DOC_BASE_URL;

/// File name of the per-workspace config file.
pub const WORKSPACE_CONFIG_FILE: &str = ".solargraph-lsp.toml";

/// When to wrap the server command in `bundle exec`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundlerMode {
    /// Only when the workspace root contains a `Gemfile`.
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub command: Vec<String>,
    pub bundler: BundlerMode,
    pub host: String,
    /// Port of an already running server.  When set, nothing is spawned.
    pub port: Option<u16>,
    /// Run `yard gems` once when the server is spawned.
    pub document_gems: bool,
    pub ready_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: vec!["solargraph".to_string(), "server".to_string()],
            bundler: BundlerMode::Auto,
            host: "127.0.0.1".to_string(),
            port: None,
            document_gems: true,
            ready_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// `None` means requests may wait forever.
    pub request_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(10)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentationConfig {
    pub link_base_url: String,
    /// When a resolve returns records but none of them carries any
    /// documentation, keep showing "Loading..." instead of clearing it.
    pub keep_loading_on_empty_merge: bool,
}

impl Default for DocumentationConfig {
    fn default() -> Self {
        Self {
            link_base_url: DEFAULT_DOC_BASE_URL.to_string(),
            keep_loading_on_empty_merge: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionConfig {
    /// Maximum number of items remembered for documentation resolution.
    pub resolve_capacity: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            resolve_capacity: 4096,
        }
    }
}

/// Settings given on the command line.  They win over every file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Effective configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    pub transport: TransportConfig,
    pub documentation: DocumentationConfig,
    pub completion: CompletionConfig,
    overrides: Overrides,
}

// ─── File representation ────────────────────────────────────────────────────
//
// Every field is optional so that a file only overrides what it names.

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    server: ServerSection,
    transport: TransportSection,
    documentation: DocumentationSection,
    completion: CompletionSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerSection {
    command: Option<Vec<String>>,
    bundler: Option<BundlerMode>,
    host: Option<String>,
    port: Option<u16>,
    document_gems: Option<bool>,
    ready_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TransportSection {
    /// `0` disables the timeout.
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DocumentationSection {
    link_base_url: Option<String>,
    keep_loading_on_empty_merge: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CompletionSection {
    resolve_capacity: Option<usize>,
}

impl Config {
    /// Defaults overlaid with the user config file, if there is one.
    pub fn load_user() -> Self {
        let mut config = Self::default();
        if let Some(path) = user_config_path()
            && path.is_file()
        {
            config.merge_file_logged(&path);
        }
        config
    }

    /// Overlay the `.solargraph-lsp.toml` found at `root`, if any.
    pub fn merge_workspace(&mut self, root: &Path) {
        let path = root.join(WORKSPACE_CONFIG_FILE);
        if path.is_file() {
            self.merge_file_logged(&path);
        }
    }

    /// Apply command-line settings now and after every later merge.
    pub fn set_overrides(&mut self, overrides: Overrides) {
        self.overrides = overrides;
        self.apply_overrides();
    }

    fn apply_overrides(&mut self) {
        if let Some(host) = &self.overrides.host {
            self.server.host = host.clone();
        }
        if self.overrides.port.is_some() {
            self.server.port = self.overrides.port;
        }
    }

    /// Overlay a TOML file.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.merge_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay TOML text.
    pub fn merge_str(&mut self, content: &str) -> Result<(), toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;
        self.apply(file);
        Ok(())
    }

    fn merge_file_logged(&mut self, path: &Path) {
        match self.merge_file(path) {
            Ok(()) => tracing::debug!("loaded config from {}", path.display()),
            Err(e) => tracing::warn!("ignoring config file: {}", e),
        }
    }

    fn apply(&mut self, file: ConfigFile) {
        let ConfigFile {
            server,
            transport,
            documentation,
            completion,
        } = file;

        if let Some(command) = server.command.filter(|c| !c.is_empty()) {
            self.server.command = command;
        }
        if let Some(bundler) = server.bundler {
            self.server.bundler = bundler;
        }
        if let Some(host) = server.host {
            self.server.host = host;
        }
        if server.port.is_some() {
            self.server.port = server.port;
        }
        if let Some(document_gems) = server.document_gems {
            self.server.document_gems = document_gems;
        }
        if let Some(secs) = server.ready_timeout_secs {
            self.server.ready_timeout = Duration::from_secs(secs);
        }

        if let Some(ms) = transport.request_timeout_ms {
            self.transport.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        if let Some(url) = documentation.link_base_url {
            self.documentation.link_base_url = url;
        }
        if let Some(keep) = documentation.keep_loading_on_empty_merge {
            self.documentation.keep_loading_on_empty_merge = keep;
        }

        if let Some(capacity) = completion.resolve_capacity {
            self.completion.resolve_capacity = capacity.max(1);
        }

        self.apply_overrides();
    }
}

/// `<config dir>/solargraph-lsp/config.toml` for the current user.
pub fn user_config_path() -> Option<PathBuf> {
    let strategy = etcetera::choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("solargraph-lsp").join("config.toml"))
}
