/// Completion-related modules.
///
/// This sub-module groups all completion logic:
/// - **mapper**: Turning Solargraph suggestions into LSP `CompletionItem`s
/// - **resolver**: Fetching and merging documentation when an item is highlighted
/// - **handler**: The `textDocument/completion` and `completionItem/resolve` entry points
pub mod handler;
pub mod mapper;
pub mod resolver;
