/// Documentation formatting helpers.
///
/// Solargraph serves documentation rendered from YARD as a small HTML
/// dialect.  Editors speak Markdown, so this module converts between the
/// two, builds links to the online API documentation from a dotted
/// Solargraph path (e.g. `Foo::Bar#baz`), and wraps text as Markdown
/// documentation that the editor should render rather than escape.
use tower_lsp::lsp_types::{Documentation, MarkupContent, MarkupKind, Url};

/// Default base URL for documentation links.
pub const DEFAULT_DOC_BASE_URL: &str = "https://www.rubydoc.info/stdlib/core";

/// Mark `text` as trusted Markdown.
pub fn trusted_markdown(text: String) -> Documentation {
    Documentation::MarkupContent(MarkupContent {
        kind: MarkupKind::Markdown,
        value: text,
    })
}

/// Prepend the documentation link block to `body`.
///
/// The link sits in its own paragraph above the body.  Without a link the
/// body is returned unchanged.
pub fn with_link_block(link: Option<&str>, body: &str) -> String {
    match link {
        Some(link) => format!("\n\n{}\n\n{}", link, body),
        None => body.to_string(),
    }
}

// ─── Documentation links ────────────────────────────────────────────────────

/// Build the documentation URL for a Solargraph path.
///
/// Namespace segments (`A::B`) become URL path segments under `base_url`.
/// A method suffix becomes a YARD-style fragment: `#name` for instance
/// methods is rendered as `name-instance_method`, `.name` for class
/// methods as `name-class_method`.
///
/// Returns `None` when `base_url` is not a valid base URL.
pub fn doc_url(path: &str, base_url: &str) -> Option<Url> {
    let (namespace, method) = split_path(path);

    let mut url = Url::parse(base_url).ok()?;
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.pop_if_empty();
        segments.extend(namespace.split("::").filter(|s| !s.is_empty()));
    }

    if let Some((name, scope)) = method {
        url.set_fragment(Some(&format!("{}-{}", name, scope)));
    }

    Some(url)
}

/// Build a Markdown link to the documentation page for `path`.
///
/// Falls back to the bare (escaped) path when no URL can be built.
pub fn doc_link(path: &str, base_url: &str) -> String {
    let label = escape_link_text(path);
    match doc_url(path, base_url) {
        Some(url) => format!("[{}]({})", label, url),
        None => label,
    }
}

/// Split `Foo::Bar#baz` into (`Foo::Bar`, Some(("baz", "instance_method"))).
fn split_path(path: &str) -> (&str, Option<(&str, &'static str)>) {
    if let Some(idx) = path.find('#') {
        return (&path[..idx], Some((&path[idx + 1..], "instance_method")));
    }
    if let Some(idx) = path.rfind('.') {
        return (&path[..idx], Some((&path[idx + 1..], "class_method")));
    }
    (path, None)
}

fn escape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ─── HTML → Markdown ────────────────────────────────────────────────────────

/// Convert Solargraph's HTML documentation into Markdown.
///
/// Emphasis, strong text, code spans, preformatted blocks, links, lists
/// and headings are preserved; any other tag is dropped but its text is
/// kept.  Input without any tags is treated as plain text, so its line
/// breaks survive.
pub fn html_to_markdown(html: &str) -> String {
    let tokens = tokenize(html);
    if !tokens.iter().any(|t| matches!(t, Token::Tag(_))) {
        return decode_entities(html).trim().to_string();
    }

    let mut writer = MarkdownWriter::default();
    for token in tokens {
        match token {
            Token::Text(text) => writer.text(text),
            Token::Tag(tag) => writer.tag(&tag),
        }
    }
    writer.finish()
}

#[derive(Debug)]
enum Token<'a> {
    Text(&'a str),
    Tag(Tag),
}

#[derive(Debug)]
struct Tag {
    name: String,
    closing: bool,
    href: Option<String>,
}

/// Split `html` into text runs and tags.  Comments and doctype
/// declarations are skipped; a `<` that does not start a tag is text.
fn tokenize(html: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        let after = &rest[lt + 1..];
        let starts_tag = after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!');

        if !starts_tag {
            tokens.push(Token::Text(&rest[..lt + 1]));
            rest = after;
            continue;
        }

        if after.starts_with("!--") {
            if lt > 0 {
                tokens.push(Token::Text(&rest[..lt]));
            }
            rest = match after.find("-->") {
                Some(end) => &after[end + 3..],
                None => "",
            };
            continue;
        }

        let Some(gt) = after.find('>') else {
            break;
        };

        if lt > 0 {
            tokens.push(Token::Text(&rest[..lt]));
        }
        if let Some(tag) = parse_tag(&after[..gt]) {
            tokens.push(Token::Tag(tag));
        }
        rest = &after[gt + 1..];
    }

    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }
    tokens
}

fn parse_tag(inner: &str) -> Option<Tag> {
    if inner.starts_with('!') {
        return None;
    }
    let (closing, body) = match inner.strip_prefix('/') {
        Some(b) => (true, b),
        None => (false, inner),
    };
    let body = body.trim_end_matches('/');
    let name_end = body
        .find(|c: char| c.is_whitespace())
        .unwrap_or(body.len());
    let name = body[..name_end].to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    let href = if name == "a" && !closing {
        attribute(&body[name_end..], "href")
    } else {
        None
    };
    Some(Tag {
        name,
        closing,
        href,
    })
}

/// Extract a (possibly quoted) attribute value.
fn attribute(attrs: &str, key: &str) -> Option<String> {
    let lower = attrs.to_ascii_lowercase();
    let mut search = 0;
    while let Some(found) = lower[search..].find(key) {
        let start = search + found;
        search = start + key.len();
        let preceded_ok = start == 0
            || lower[..start]
                .chars()
                .next_back()
                .is_some_and(char::is_whitespace);
        let rest = attrs[search..].trim_start();
        if !preceded_ok || !rest.starts_with('=') {
            continue;
        }
        let value = rest[1..].trim_start();
        let value = match value.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let inner = &value[1..];
                &inner[..inner.find(q).unwrap_or(inner.len())]
            }
            _ => &value[..value.find(char::is_whitespace).unwrap_or(value.len())],
        };
        return Some(decode_entities(value));
    }
    None
}

#[derive(Debug)]
enum ListKind {
    Unordered,
    Ordered(usize),
}

#[derive(Debug, Default)]
struct MarkdownWriter {
    out: String,
    lists: Vec<ListKind>,
    links: Vec<Option<String>>,
    in_pre: bool,
}

impl MarkdownWriter {
    fn text(&mut self, raw: &str) {
        let decoded = decode_entities(raw);
        if self.in_pre {
            self.out.push_str(&decoded);
            return;
        }
        let mut last_space = self.out.is_empty() || self.out.ends_with([' ', '\n']);
        for c in decoded.chars() {
            if c.is_whitespace() {
                if !last_space {
                    self.out.push(' ');
                    last_space = true;
                }
            } else {
                self.out.push(c);
                last_space = false;
            }
        }
    }

    fn tag(&mut self, tag: &Tag) {
        match (tag.name.as_str(), tag.closing) {
            ("p" | "div", _) => self.paragraph_break(),
            ("br", _) => {
                self.trim_trailing_spaces();
                self.out.push('\n');
            }
            ("em" | "i", _) => self.out.push('_'),
            ("strong" | "b", _) => self.out.push_str("**"),
            ("code" | "tt", _) if !self.in_pre => self.out.push('`'),
            ("pre", false) => {
                self.paragraph_break();
                self.out.push_str("```\n");
                self.in_pre = true;
            }
            ("pre", true) => {
                if !self.out.ends_with('\n') {
                    self.out.push('\n');
                }
                self.out.push_str("```");
                self.in_pre = false;
                self.paragraph_break();
            }
            ("a", false) => {
                if tag.href.is_some() {
                    self.out.push('[');
                }
                self.links.push(tag.href.clone());
            }
            ("a", true) => {
                if let Some(Some(href)) = self.links.pop() {
                    self.out.push_str(&format!("]({})", href));
                }
            }
            ("ul", false) => {
                self.line_break();
                self.lists.push(ListKind::Unordered);
            }
            ("ol", false) => {
                self.line_break();
                self.lists.push(ListKind::Ordered(0));
            }
            ("ul" | "ol", true) => {
                self.lists.pop();
                if self.lists.is_empty() {
                    self.paragraph_break();
                }
            }
            ("li", false) => {
                self.line_break();
                let depth = self.lists.len().saturating_sub(1);
                self.out.push_str(&"  ".repeat(depth));
                match self.lists.last_mut() {
                    Some(ListKind::Ordered(n)) => {
                        *n += 1;
                        self.out.push_str(&format!("{}. ", n));
                    }
                    _ => self.out.push_str("- "),
                }
            }
            (h, false) if is_heading(h) => {
                self.paragraph_break();
                let level = h[1..].parse::<usize>().unwrap_or(1);
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
            }
            (h, true) if is_heading(h) => self.paragraph_break(),
            _ => {}
        }
    }

    fn trim_trailing_spaces(&mut self) {
        let trimmed = self.out.trim_end_matches(' ').len();
        self.out.truncate(trimmed);
    }

    fn line_break(&mut self) {
        self.trim_trailing_spaces();
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn paragraph_break(&mut self) {
        self.line_break();
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn finish(self) -> String {
        let mut result = String::with_capacity(self.out.len());
        let mut newlines = 0;
        for c in self.out.chars() {
            if c == '\n' {
                newlines += 1;
                if newlines > 2 {
                    continue;
                }
            } else {
                newlines = 0;
            }
            result.push(c);
        }
        result.trim().to_string()
    }
}

fn is_heading(name: &str) -> bool {
    name.len() == 2 && name.starts_with('h') && matches!(name.as_bytes()[1], b'1'..=b'6')
}

/// Decode the handful of entities YARD emits, plus numeric references.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &after[..semi];
            let c = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
