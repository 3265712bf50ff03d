/// Lazy documentation resolution.
///
/// Completion lists are returned quickly with a `"Loading..."` placeholder
/// for every suggestion whose documentation Solargraph only promised.  When
/// the editor highlights such an item it sends `completionItem/resolve`;
/// this module fetches the full documentation for the item's path, merges
/// the records the server returns (overloads share a label), and attaches
/// the result.
///
/// Items carry only a generated id in their `data` field.  The record and
/// document each id stands for live in a bounded side-table owned by the
/// [`DocumentationResolver`].
use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{CompletionItem, Documentation, Url};

use crate::config::DocumentationConfig;
use crate::error::TransportResult;
use crate::format::{doc_link, html_to_markdown, trusted_markdown, with_link_block};
use crate::transport::SuggestionTransport;
use crate::types::{ResolveRequest, SuggestionRecord};
use crate::workspace::{WorkspaceResolver, workspace_param};

/// Placeholder documentation for items awaiting resolution.
pub const LOADING_SENTINEL: &str = "Loading...";

/// Key into the [`ResolveTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl ItemId {
    /// The id stored in an item's `data` field, if any.
    pub fn of(item: &CompletionItem) -> Option<Self> {
        item.data
            .as_ref()
            .and_then(|data| data.get("id"))
            .and_then(serde_json::Value::as_u64)
            .map(ItemId)
    }
}

/// What an item was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSuggestion {
    pub record: SuggestionRecord,
    pub uri: Url,
}

#[derive(Debug, Default)]
struct TableInner {
    next_id: u64,
    capacity: usize,
    entries: HashMap<ItemId, TrackedSuggestion>,
    /// Ids of every tracked list, oldest first.
    lists: VecDeque<Vec<ItemId>>,
}

impl TableInner {
    /// Drop the oldest lists until at most `capacity` entries remain.  The
    /// newest list is never dropped, however long it is.
    fn evict(&mut self) {
        while self.entries.len() > self.capacity && self.lists.len() > 1 {
            if let Some(old) = self.lists.pop_front() {
                for id in old {
                    self.entries.remove(&id);
                }
            }
        }
    }
}

/// Bounded map from item ids to their originating suggestion.
///
/// Entries are grouped by the completion list they were returned in and
/// evicted a whole list at a time, oldest first, so every item of the
/// latest list stays resolvable.
#[derive(Debug)]
pub struct ResolveTable {
    inner: Mutex<TableInner>,
}

impl ResolveTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(TableInner {
                capacity: capacity.max(1),
                ..TableInner::default()
            }),
        }
    }

    /// Change the capacity, evicting old lists if it shrank.
    pub fn set_capacity(&self, capacity: usize) {
        let mut inner = self.inner.lock();
        inner.capacity = capacity.max(1);
        inner.evict();
    }

    /// Remember the records of one completion list and return the ids to
    /// store on its items, in order.
    pub fn track_list<I>(&self, records: I, uri: &Url) -> Vec<ItemId>
    where
        I: IntoIterator<Item = SuggestionRecord>,
    {
        let mut inner = self.inner.lock();
        let mut ids = Vec::new();
        for record in records {
            let id = ItemId(inner.next_id);
            inner.next_id = inner.next_id.wrapping_add(1);
            inner.entries.insert(
                id,
                TrackedSuggestion {
                    record,
                    uri: uri.clone(),
                },
            );
            ids.push(id);
        }
        inner.lists.push_back(ids.clone());
        inner.evict();
        ids
    }

    pub fn get(&self, id: ItemId) -> Option<TrackedSuggestion> {
        self.inner.lock().entries.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where an item's documentation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentationState {
    /// No documentation, or an empty string.
    Absent,
    /// The loading placeholder.
    Loading,
    /// Anything else: final.
    Resolved,
}

impl DocumentationState {
    pub fn of(item: &CompletionItem) -> Self {
        match &item.documentation {
            None => Self::Absent,
            Some(Documentation::String(s)) if s.is_empty() => Self::Absent,
            Some(Documentation::String(s)) if s == LOADING_SENTINEL => Self::Loading,
            Some(Documentation::MarkupContent(m)) if m.value.is_empty() => Self::Absent,
            Some(_) => Self::Resolved,
        }
    }
}

/// Merge the documentation of several records into one Markdown text.
///
/// Every non-empty documentation string is converted and the results are
/// joined with newlines.  A single link, built from the first record that
/// has a path, goes on top.
pub fn merge_documentation(records: &[SuggestionRecord], link_base_url: &str) -> String {
    let link = records
        .iter()
        .find_map(SuggestionRecord::path)
        .map(|path| doc_link(path, link_base_url));

    let body = records
        .iter()
        .filter_map(SuggestionRecord::documentation)
        .map(html_to_markdown)
        .filter(|doc| !doc.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if link.is_none() && body.is_empty() {
        return String::new();
    }
    with_link_block(link.as_deref(), &body)
}

/// The second phase of completion: fills in documentation on demand.
#[derive(Debug)]
pub struct DocumentationResolver {
    table: ResolveTable,
}

impl DocumentationResolver {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: ResolveTable::new(capacity),
        }
    }

    pub fn table(&self) -> &ResolveTable {
        &self.table
    }

    /// Resolve `item`'s documentation.
    ///
    /// Items that are not showing the loading placeholder are returned
    /// untouched without contacting the server.  A transport failure is
    /// returned as an error and the item is dropped unchanged, so the
    /// editor keeps its copy and may ask again later.
    pub async fn resolve(
        &self,
        mut item: CompletionItem,
        transport: &dyn SuggestionTransport,
        workspace: &WorkspaceResolver,
        options: &DocumentationConfig,
        cancel: &CancellationToken,
    ) -> TransportResult<CompletionItem> {
        if DocumentationState::of(&item) != DocumentationState::Loading {
            return Ok(item);
        }

        let Some(tracked) = ItemId::of(&item).and_then(|id| self.table.get(id)) else {
            tracing::warn!(
                "no suggestion recorded for completion item {:?}; leaving it unresolved",
                item.label
            );
            return Ok(item);
        };

        let Some(path) = tracked.record.path() else {
            item.documentation = Some(Documentation::String(String::new()));
            return Ok(item);
        };

        let root = workspace.resolve_workspace_root(&tracked.uri);
        tracing::debug!("resolving documentation for {} (workspace {:?})", path, root);

        let request = ResolveRequest {
            path: path.to_string(),
            workspace: workspace_param(root.as_deref()),
        };
        let bundle = transport.resolve(request, cancel).await?;

        if bundle.suggestions.is_empty() {
            item.documentation = Some(Documentation::String(String::new()));
            return Ok(item);
        }

        let merged = merge_documentation(&bundle.suggestions, &options.link_base_url);
        if !merged.is_empty() {
            item.documentation = Some(trusted_markdown(merged));
        } else if !options.keep_loading_on_empty_merge {
            item.documentation = Some(Documentation::String(String::new()));
        }
        Ok(item)
    }
}
