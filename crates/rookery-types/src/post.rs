use std::collections::{HashMap, HashSet};

use linkify::{LinkFinder, LinkKind};
use pulldown_cmark::{CowStr, Event, LinkType, Parser, Tag, TagEnd, TextMergeStream, html};

/// Tags that survive sanitizing. Everything else is stripped.
pub const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "acronym", "b", "blockquote", "code", "em", "i", "li", "ol", "pre", "strong",
    "ul", "h1", "h2", "h3", "p",
];

/// A post body ready to be stored: the raw markdown together with its
/// sanitized HTML render. The only constructor renders eagerly, so a body
/// can't be persisted without its derived HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostBody {
    raw: String,
    html: String,
}

impl PostBody {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let html = render(&raw);
        Self { raw, html }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn html(&self) -> &str {
        &self.html
    }
}

/// markdown -> HTML with bare URLs linked -> allow-list sanitize.
fn render(raw: &str) -> String {
    let events = linkify_text(Parser::new(raw));

    let mut unsafe_html = String::with_capacity(raw.len() * 3 / 2);
    html::push_html(&mut unsafe_html, events.into_iter());

    sanitize(&unsafe_html)
}

/// Split text events around bare URLs and wrap each URL in a link.
/// Text already inside a link (markdown or raw `<a>`) or a code block is
/// left alone. Adjacent text events are merged first so a URL is never
/// cut at an escape or bracket.
fn linkify_text<'a>(parser: Parser<'a>) -> Vec<Event<'a>> {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);
    finder.url_must_have_scheme(false);

    let mut events = Vec::new();
    let mut link_depth = 0usize;
    let mut in_code_block = false;

    for event in TextMergeStream::new(parser) {
        match event {
            Event::Start(Tag::Link { .. }) => {
                link_depth += 1;
                events.push(event);
            }
            Event::End(TagEnd::Link) => {
                link_depth = link_depth.saturating_sub(1);
                events.push(event);
            }
            Event::InlineHtml(ref tag) => {
                match anchor_tag(tag) {
                    Some(true) => link_depth += 1,
                    Some(false) => link_depth = link_depth.saturating_sub(1),
                    None => {}
                }
                events.push(event);
            }
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
                events.push(event);
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                events.push(event);
            }
            Event::Text(text) if link_depth == 0 && !in_code_block => {
                for span in finder.spans(&text) {
                    let piece = span.as_str();
                    match span.kind() {
                        Some(LinkKind::Url) => {
                            let dest = if piece.contains("://") {
                                piece.to_string()
                            } else {
                                format!("http://{piece}")
                            };
                            events.push(Event::Start(Tag::Link {
                                link_type: LinkType::Autolink,
                                dest_url: CowStr::from(dest),
                                title: CowStr::Borrowed(""),
                                id: CowStr::Borrowed(""),
                            }));
                            events.push(Event::Text(CowStr::from(piece.to_string())));
                            events.push(Event::End(TagEnd::Link));
                        }
                        _ => events.push(Event::Text(CowStr::from(piece.to_string()))),
                    }
                }
            }
            other => events.push(other),
        }
    }

    events
}

/// `Some(true)` for an opening `<a ...>`, `Some(false)` for `</a>`.
fn anchor_tag(tag: &str) -> Option<bool> {
    let tag = tag.trim().to_ascii_lowercase();
    if tag.starts_with("</a") && tag[3..].trim_start().starts_with('>') {
        Some(false)
    } else if tag.starts_with("<a")
        && tag[2..].starts_with(|c: char| c == '>' || c.is_ascii_whitespace())
    {
        Some(true)
    } else {
        None
    }
}

fn sanitize(unsafe_html: &str) -> String {
    let tag_attributes = HashMap::from([
        ("a", HashSet::from(["href", "title"])),
        ("abbr", HashSet::from(["title"])),
        ("acronym", HashSet::from(["title"])),
    ]);

    ammonia::Builder::default()
        .tags(ALLOWED_TAGS.iter().copied().collect())
        .tag_attributes(tag_attributes)
        .link_rel(Some("nofollow"))
        .clean(unsafe_html)
        .to_string()
}
