//! Data types used throughout the Solargraph bridge.
//!
//! This module contains the wire model exchanged with the Solargraph HTTP
//! server (suggestion records, suggest/resolve requests and responses) and
//! the mapping from Solargraph's kind names to LSP completion kinds.

use serde::{Deserialize, Deserializer, Serialize};
use tower_lsp::lsp_types::CompletionItemKind;

/// The kind of a suggestion as reported by Solargraph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestionKind {
    Class,
    Constant,
    Keyword,
    Module,
    Method,
    Variable,
    Snippet,
    Field,
    Property,
    /// Any kind name this bridge does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

impl SuggestionKind {
    /// The LSP completion kind to display, or `None` for unknown kinds.
    pub fn completion_kind(self) -> Option<CompletionItemKind> {
        match self {
            Self::Class => Some(CompletionItemKind::CLASS),
            Self::Constant => Some(CompletionItemKind::CONSTANT),
            Self::Keyword => Some(CompletionItemKind::KEYWORD),
            Self::Module => Some(CompletionItemKind::MODULE),
            Self::Method => Some(CompletionItemKind::METHOD),
            Self::Variable => Some(CompletionItemKind::VARIABLE),
            Self::Snippet => Some(CompletionItemKind::SNIPPET),
            Self::Field => Some(CompletionItemKind::FIELD),
            Self::Property => Some(CompletionItemKind::PROPERTY),
            Self::Unknown => None,
        }
    }
}

/// One completion candidate produced by the Solargraph server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionRecord {
    /// Display string (keeps sigils such as `@` or `$`).
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub kind: SuggestionKind,
    /// Raw insertion text.  May carry a sigil (`@`, `@@`, `$`) or a
    /// leading `:`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub insert: String,
    /// Parameter strings, only meaningful for methods.
    #[serde(default, deserialize_with = "null_as_default")]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub return_type: Option<String>,
    /// Pre-fetched documentation (HTML-ish markup).
    #[serde(default)]
    pub documentation: Option<String>,
    /// Documentation exists but has to be fetched with a resolve request.
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_doc: bool,
    /// Dotted identifier such as `Foo::Bar#baz`.
    #[serde(default)]
    pub path: Option<String>,
    /// Parameter descriptions.
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Vec<String>,
}

impl SuggestionRecord {
    /// The text to insert.  Falls back to the label when the server sent
    /// no insertion text.
    pub fn insert_text(&self) -> &str {
        if self.insert.is_empty() {
            &self.label
        } else {
            &self.insert
        }
    }

    /// The path, treating an empty string as absent.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.is_empty())
    }

    /// The documentation, treating an empty string as absent.
    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref().filter(|d| !d.is_empty())
    }
}

/// Body of a `POST /suggest` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestRequest {
    pub filename: String,
    /// Full document source.
    pub text: String,
    /// 0-based line.
    pub line: u32,
    /// 0-based character offset within the line.
    pub col: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

/// Body of a `POST /resolve` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveRequest {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

/// Decoded reply to a suggest request.
///
/// A logical failure on the server side is a successful transport call
/// carrying the [`SuggestResponse::Error`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SuggestResponse {
    Ok {
        #[serde(default, deserialize_with = "null_as_default")]
        suggestions: Vec<SuggestionRecord>,
    },
    Error {
        #[serde(default, deserialize_with = "null_as_default")]
        message: String,
    },
}

impl SuggestResponse {
    /// An `ok` response without suggestions.
    pub fn empty() -> Self {
        Self::Ok {
            suggestions: Vec::new(),
        }
    }
}

/// Decoded reply to a resolve request: every record sharing the resolved
/// path's label (e.g. the overloads of a method).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResolveResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub suggestions: Vec<SuggestionRecord>,
}

/// Deserialize `null` as the type's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
