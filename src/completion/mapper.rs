/// Suggestion-to-completion-item mapping.
///
/// This module turns the records of a Solargraph suggest response into
/// LSP `CompletionItem`s.  Most of the work is textual: Ruby sigils
/// (`@`, `@@`, `$`) and symbol colons have to be kept out of the inserted
/// text because the editor's word range never contains them, and a
/// namespace separator (`::`) must not be mistaken for a symbol colon.
use serde_json::json;
use tower_lsp::lsp_types::*;

use crate::completion::resolver::{ItemId, LOADING_SENTINEL, ResolveTable};
use crate::document::Document;
use crate::format::{doc_link, html_to_markdown, trusted_markdown, with_link_block};
use crate::types::{SuggestResponse, SuggestionKind, SuggestionRecord};

/// How a record's `insert` text reaches the editor.
///
/// The variants are checked in declaration order and are mutually
/// exclusive; a record matches exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStrategy {
    /// `@@name`: class variable, both `@` stripped.
    ClassVariable,
    /// `@name`: instance variable, the `@` stripped.
    InstanceVariable,
    /// `$name`: global variable, the `$` stripped.
    GlobalVariable,
    /// Snippet template with tab stops, inserted verbatim.
    Snippet,
    /// `:_name`: symbol starting with an underscore, `:_` stripped.
    UnderscoreSymbol,
    /// Inserted as is.
    Plain,
}

impl InsertStrategy {
    pub fn classify(record: &SuggestionRecord) -> Self {
        let insert = record.insert_text();
        if insert.starts_with("@@") {
            Self::ClassVariable
        } else if insert.starts_with('@') {
            Self::InstanceVariable
        } else if insert.starts_with('$') {
            Self::GlobalVariable
        } else if record.kind == SuggestionKind::Snippet {
            Self::Snippet
        } else if insert.starts_with(":_") {
            Self::UnderscoreSymbol
        } else {
            Self::Plain
        }
    }

    /// Number of leading characters removed from the insert text.
    fn stripped_prefix_len(self) -> usize {
        match self {
            Self::ClassVariable | Self::UnderscoreSymbol => 2,
            Self::InstanceVariable | Self::GlobalVariable => 1,
            Self::Snippet | Self::Plain => 0,
        }
    }
}

/// Insert, filter and sort text for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertEdit {
    pub insert_text: String,
    pub filter_text: Option<String>,
    pub sort_text: Option<String>,
    pub format: InsertTextFormat,
}

impl InsertEdit {
    pub fn for_record(record: &SuggestionRecord) -> Self {
        let strategy = InsertStrategy::classify(record);
        let insert = record.insert_text();
        match strategy {
            InsertStrategy::Plain => Self {
                insert_text: insert.to_string(),
                filter_text: None,
                sort_text: None,
                format: InsertTextFormat::PLAIN_TEXT,
            },
            InsertStrategy::Snippet => Self {
                insert_text: insert.to_string(),
                filter_text: None,
                sort_text: None,
                format: InsertTextFormat::SNIPPET,
            },
            _ => {
                // All stripped prefixes are ASCII, so byte slicing is safe.
                let stripped = insert[strategy.stripped_prefix_len()..].to_string();
                Self {
                    insert_text: stripped.clone(),
                    filter_text: Some(stripped.clone()),
                    sort_text: Some(stripped),
                    format: InsertTextFormat::PLAIN_TEXT,
                }
            }
        }
    }
}

/// The range the completion replaces: the word under the caret.
///
/// When the word starts with `:` and the character before it is also `:`,
/// the caret is after a namespace separator (`Foo::Ba`), not inside a
/// symbol, so the colon is left out of the range.  A caret between the two
/// colons then lies outside the word and there is no range.
pub fn replacement_range(document: &Document, position: Position) -> Option<Range> {
    let mut range = document.word_range_at(position)?;
    if range.start.character > 0
        && document.text_in(range).starts_with(':')
        && document.char_before(range.start) == Some(':')
    {
        range.start.character += 1;
    }
    (range.start.character <= position.character).then_some(range)
}

/// `(a, b) => Ret` for methods with arguments, `=> Ret` otherwise.
pub fn detail(record: &SuggestionRecord) -> String {
    let returns = record
        .return_type
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(|r| format!("=> {}", r));

    if record.kind == SuggestionKind::Method && !record.arguments.is_empty() {
        let args = format!("({})", record.arguments.join(", "));
        match returns {
            Some(returns) => format!("{} {}", args, returns),
            None => args,
        }
    } else {
        returns.unwrap_or_default()
    }
}

/// Builds completion items from a suggest response.
#[derive(Debug)]
pub struct SuggestionMapper<'a> {
    link_base_url: &'a str,
    table: &'a ResolveTable,
}

impl<'a> SuggestionMapper<'a> {
    pub fn new(link_base_url: &'a str, table: &'a ResolveTable) -> Self {
        Self {
            link_base_url,
            table,
        }
    }

    /// Map every suggestion of an `ok` response, in server order.  An
    /// `error` response yields no items.
    pub fn map_suggestions(
        &self,
        response: &SuggestResponse,
        document: &Document,
        position: Position,
    ) -> Vec<CompletionItem> {
        let SuggestResponse::Ok { suggestions } = response else {
            return Vec::new();
        };

        let range = replacement_range(document, position);
        let ids = self
            .table
            .track_list(suggestions.iter().cloned(), &document.uri);
        suggestions
            .iter()
            .zip(ids)
            .map(|(record, id)| self.map_record(record, id, range))
            .collect()
    }

    fn map_record(
        &self,
        record: &SuggestionRecord,
        id: ItemId,
        range: Option<Range>,
    ) -> CompletionItem {
        let edit = InsertEdit::for_record(record);

        CompletionItem {
            label: record.label.clone(),
            kind: record.kind.completion_kind(),
            detail: Some(detail(record)),
            documentation: Some(self.documentation(record)),
            filter_text: edit.filter_text,
            sort_text: edit.sort_text,
            insert_text_format: Some(edit.format),
            text_edit: range.map(|range| {
                CompletionTextEdit::Edit(TextEdit {
                    range,
                    new_text: edit.insert_text.clone(),
                })
            }),
            insert_text: Some(edit.insert_text),
            data: Some(json!({ "id": id })),
            ..CompletionItem::default()
        }
    }

    /// Documentation shown with the initial list.
    ///
    /// Pre-fetched documentation is rendered immediately; documentation
    /// the server only promised is the loading placeholder; otherwise the
    /// path is all there is to show.
    fn documentation(&self, record: &SuggestionRecord) -> Documentation {
        if let Some(doc) = record.documentation() {
            let link = record.path().map(|p| doc_link(p, self.link_base_url));
            let mut body = html_to_markdown(doc);
            if !record.params.is_empty() {
                body.push_str("\nParams:\n");
                for param in &record.params {
                    body.push_str(&format!("- {}\n", param));
                }
            }
            trusted_markdown(with_link_block(link.as_deref(), &body))
        } else if record.has_doc {
            Documentation::String(LOADING_SENTINEL.to_string())
        } else {
            Documentation::String(
                record
                    .path()
                    .map(|p| format!("\n{}", p))
                    .unwrap_or_default(),
            )
        }
    }
}
