use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Maximum element nesting accepted in a feed document.
/// Prevents pathological documents from growing the element stack unbounded.
const MAX_DEPTH: usize = 64;

/// Errors raised while decoding an RSS document.
///
/// These are permanent: fetching the same bytes again will fail the same way.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The document is not well-formed XML.
    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    /// Well-formed XML, but no `<channel>` element anywhere.
    #[error("document has no <channel> element")]
    MissingChannel,

    /// The document ended with elements still open.
    #[error("document ended inside <{0}>")]
    Truncated(String),

    #[error("element nesting exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

/// One `<item>` exactly as it appeared in the document (XML-unescaped only).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// `None` when the item has no `<pubDate>` element at all.
    pub pub_date: Option<String>,
}

/// The channel header plus its items, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RawItem>,
}

#[derive(Clone, Copy)]
enum ChannelField {
    Title,
    Link,
    Description,
}

#[derive(Clone, Copy)]
enum ItemField {
    Title,
    Link,
    Description,
    PubDate,
}

enum Target {
    Channel(ChannelField),
    Item(ItemField),
}

/// Decode the RSS 2.0 subset `channel/{title,link,description,item}` and
/// `item/{title,link,description,pubDate}`. Every other element is skipped.
///
/// Names are matched exactly, so namespaced siblings like `<atom:link>` do not
/// clobber the plain `<link>`.
pub fn parse_rss(content: &str) -> Result<RawFeed, DecodeError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations from a
    // DOCTYPE, so external entity tricks in a hostile feed resolve to nothing.
    let mut reader = Reader::from_str(content.trim_start_matches('\u{feff}'));

    let mut feed = RawFeed::default();
    let mut saw_channel = false;
    let mut current: Option<RawItem> = None;
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(DecodeError::MaxDepthExceeded(MAX_DEPTH));
                }
                let name = e.name().as_ref().to_vec();
                open_element(&name, &stack, &mut saw_channel, &mut current);
                stack.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = e.name().as_ref().to_vec();
                open_element(&name, &stack, &mut saw_channel, &mut current);
                close_element(&name, &stack, &mut feed, &mut current);
            }
            Ok(Event::End(_)) => {
                if let Some(name) = stack.pop() {
                    close_element(&name, &stack, &mut feed, &mut current);
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(target) = target_for(&stack) {
                    // HTML5 named entities (`&nbsp;`) resolve here through the
                    // `escape-html` feature. Anything still unknown (`&bogus;`)
                    // fails unescaping, so keep the raw text for the markup
                    // normalizer, which leaves unknown entities verbatim.
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    append(target, &text, &mut feed, &mut current);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(target) = target_for(&stack) {
                    append(target, &String::from_utf8_lossy(&e), &mut feed, &mut current);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DecodeError::Xml {
                    position: reader.buffer_position() as u64,
                    message: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(DecodeError::Truncated(
            String::from_utf8_lossy(open).into_owned(),
        ));
    }
    if !saw_channel {
        return Err(DecodeError::MissingChannel);
    }

    trim_fields(&mut feed);
    Ok(feed)
}

fn open_element(
    name: &[u8],
    stack: &[Vec<u8>],
    saw_channel: &mut bool,
    current: &mut Option<RawItem>,
) {
    let parent = stack.last().map(Vec::as_slice);
    match (name, parent) {
        (b"channel", _) => *saw_channel = true,
        (b"item", Some(b"channel")) => *current = Some(RawItem::default()),
        (b"pubDate", Some(b"item")) if in_channel_item(stack) => {
            if let Some(item) = current.as_mut() {
                item.pub_date.get_or_insert_with(String::new);
            }
        }
        _ => {}
    }
}

/// `stack` is the stack after `name` has been popped.
fn close_element(
    name: &[u8],
    stack: &[Vec<u8>],
    feed: &mut RawFeed,
    current: &mut Option<RawItem>,
) {
    if name == b"item" && stack.last().map(Vec::as_slice) == Some(&b"channel"[..]) {
        feed.items.push(current.take().unwrap_or_default());
    }
}

fn in_channel_item(stack: &[Vec<u8>]) -> bool {
    let n = stack.len();
    n >= 2 && stack[n - 1] == b"item" && stack[n - 2] == b"channel"
}

fn target_for(stack: &[Vec<u8>]) -> Option<Target> {
    let n = stack.len();
    if n >= 2 && stack[n - 2] == b"channel" {
        let field = match stack[n - 1].as_slice() {
            b"title" => ChannelField::Title,
            b"link" => ChannelField::Link,
            b"description" => ChannelField::Description,
            _ => return None,
        };
        return Some(Target::Channel(field));
    }
    if n >= 3 && in_channel_item(&stack[..n - 1]) {
        let field = match stack[n - 1].as_slice() {
            b"title" => ItemField::Title,
            b"link" => ItemField::Link,
            b"description" => ItemField::Description,
            b"pubDate" => ItemField::PubDate,
            _ => return None,
        };
        return Some(Target::Item(field));
    }
    None
}

fn append(target: Target, text: &str, feed: &mut RawFeed, current: &mut Option<RawItem>) {
    match target {
        Target::Channel(ChannelField::Title) => feed.title.push_str(text),
        Target::Channel(ChannelField::Link) => feed.link.push_str(text),
        Target::Channel(ChannelField::Description) => feed.description.push_str(text),
        Target::Item(field) => {
            let Some(item) = current.as_mut() else {
                return;
            };
            match field {
                ItemField::Title => item.title.push_str(text),
                ItemField::Link => item.link.push_str(text),
                ItemField::Description => item.description.push_str(text),
                ItemField::PubDate => item.pub_date.get_or_insert_with(String::new).push_str(text),
            }
        }
    }
}

fn trim_in_place(s: &mut String) {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
    }
}

fn trim_fields(feed: &mut RawFeed) {
    trim_in_place(&mut feed.title);
    trim_in_place(&mut feed.link);
    trim_in_place(&mut feed.description);
    for item in &mut feed.items {
        trim_in_place(&mut item.title);
        trim_in_place(&mut item.link);
        trim_in_place(&mut item.description);
        if let Some(date) = item.pub_date.as_mut() {
            trim_in_place(date);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Lane's Blog</title>
    <link>https://example.com/</link>
    <atom:link href="https://example.com/index.xml" rel="self" type="application/rss+xml"/>
    <description>Recent content</description>
    <generator>Hugo</generator>
    <item>
      <title>First &amp;amp; best</title>
      <link>https://example.com/first</link>
      <pubDate>Mon, 02 Jan 2006 15:04:05 +0000</pubDate>
      <guid>https://example.com/first</guid>
      <description><![CDATA[<p>Hello</p>]]></description>
    </item>
    <item>
      <title>Second</title>
      <link>https://example.com/second</link>
      <description>No date here</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_channel_and_items() {
        let feed = parse_rss(SAMPLE).unwrap();
        assert_eq!(feed.title, "Lane's Blog");
        assert_eq!(feed.link, "https://example.com/");
        assert_eq!(feed.description, "Recent content");
        assert_eq!(feed.items.len(), 2);

        assert_eq!(
            feed.items[0],
            RawItem {
                title: "First &amp; best".to_string(),
                link: "https://example.com/first".to_string(),
                description: "<p>Hello</p>".to_string(),
                pub_date: Some("Mon, 02 Jan 2006 15:04:05 +0000".to_string()),
            }
        );
        assert_eq!(feed.items[1].pub_date, None);
        assert_eq!(feed.items[1].title, "Second");
    }

    #[test]
    fn test_empty_channel() {
        let feed = parse_rss(r#"<rss version="2.0"><channel></channel></rss>"#).unwrap();
        assert!(feed.items.is_empty());
        assert_eq!(feed.title, "");
    }

    #[test]
    fn test_empty_elements() {
        let feed = parse_rss(
            "<rss><channel><title/><item><title/><link>https://e.com/a</link><pubDate/></item></channel></rss>",
        )
        .unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].pub_date.as_deref(), Some(""));
        assert_eq!(feed.items[0].link, "https://e.com/a");
    }

    #[test]
    fn test_self_closing_item() {
        let feed = parse_rss("<rss><channel><item/></channel></rss>").unwrap();
        assert_eq!(feed.items, vec![RawItem::default()]);
    }

    #[test]
    fn test_nested_markup_in_description_ignored() {
        let feed = parse_rss(
            "<rss><channel><item><title>T</title><description>lead <b>bold</b></description></item></channel></rss>",
        )
        .unwrap();
        assert_eq!(feed.items[0].description, "lead");
    }

    #[test]
    fn test_item_fields_outside_items_ignored() {
        let feed =
            parse_rss("<rss><channel><image><title>Logo</title></image></channel></rss>").unwrap();
        assert_eq!(feed.title, "");
    }

    #[test]
    fn test_html5_entity_decoded() {
        let feed =
            parse_rss("<rss><channel><item><title>a&nbsp;b</title></item></channel></rss>")
                .unwrap();
        assert_eq!(feed.items[0].title, "a\u{a0}b");
    }

    #[test]
    fn test_unknown_entity_kept_raw() {
        let feed = parse_rss(
            "<rss><channel><item><title>a&bogus;b &amp; c</title></item></channel></rss>",
        )
        .unwrap();
        assert_eq!(feed.items[0].title, "a&bogus;b &amp; c");
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_rss("<not valid xml").unwrap_err();
        assert!(matches!(err, DecodeError::Xml { .. }), "got {err:?}");
    }

    #[test]
    fn test_mismatched_tags() {
        let err = parse_rss("<rss><channel></rss>").unwrap_err();
        assert!(matches!(err, DecodeError::Xml { .. }), "got {err:?}");
    }

    #[test]
    fn test_missing_channel() {
        let err = parse_rss("<html><body>Not a feed</body></html>").unwrap_err();
        assert!(matches!(err, DecodeError::MissingChannel));
    }

    #[test]
    fn test_truncated_document() {
        let err = parse_rss("<rss><channel><item><title>cut").unwrap_err();
        assert!(
            matches!(err, DecodeError::Truncated(_) | DecodeError::Xml { .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!(
            "<rss><channel>{}{}</channel></rss>",
            "<x>".repeat(MAX_DEPTH),
            "</x>".repeat(MAX_DEPTH)
        );
        let err = parse_rss(&deep).unwrap_err();
        assert!(matches!(err, DecodeError::MaxDepthExceeded(_)));
    }

    #[test]
    fn test_byte_order_mark_skipped() {
        let feed = parse_rss("\u{feff}<rss><channel><title>T</title></channel></rss>").unwrap();
        assert_eq!(feed.title, "T");
    }
}
