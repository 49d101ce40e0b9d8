//! RSS 2.0 `<item>` and Atom `<entry>` extraction.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::SourceError;

/// One feed entry with whatever fields the feed provided.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FeedEntry {
    pub(crate) id: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) link: Option<String>,
    pub(crate) author: Option<String>,
    pub(crate) category: Option<String>,
    pub(crate) published: Option<DateTime<Utc>>,
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_rfc2822(text))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Parse every `<item>`/`<entry>` in `xml`.
///
/// # Errors
///
/// Returns [`SourceError::Xml`] on malformed XML and
/// [`SourceError::Unparseable`] when the document is not an RSS or Atom feed.
pub(crate) fn parse_feed(xml: &str, context: &str) -> Result<Vec<FeedEntry>, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut is_feed = false;
    let mut current: Option<FeedEntry> = None;
    let mut in_author = false;
    let mut current_tag = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                match name.as_str() {
                    "rss" | "feed" | "channel" | "RDF" => is_feed = true,
                    "item" | "entry" => current = Some(FeedEntry::default()),
                    "author" => in_author = true,
                    _ => {}
                }
                if let Some(entry) = current.as_mut() {
                    apply_attributes(entry, &name, &e);
                }
                current_tag = name;
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(&e);
                if let Some(entry) = current.as_mut() {
                    apply_attributes(entry, &name, &e);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "item" | "entry" => {
                        if let Some(entry) = current.take() {
                            entries.push(entry);
                        }
                    }
                    "author" => in_author = false,
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Text(e)) => {
                if let Some(entry) = current.as_mut() {
                    let text = e.unescape().unwrap_or_default().trim().to_string();
                    apply_text(entry, &current_tag, in_author, text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(entry) = current.as_mut() {
                    let text = String::from_utf8_lossy(e.as_ref()).trim().to_string();
                    apply_text(entry, &current_tag, in_author, text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Xml(e)),
            _ => {}
        }
    }

    if !is_feed {
        return Err(SourceError::Unparseable {
            context: format!("{context}: not an RSS or Atom document"),
        });
    }
    Ok(entries)
}

fn apply_attributes(entry: &mut FeedEntry, name: &str, e: &BytesStart<'_>) {
    match name {
        "link" if entry.link.is_none() => {
            let rel = attribute(e, "rel");
            if rel.is_none() || rel.as_deref() == Some("alternate") {
                entry.link = attribute(e, "href");
            }
        }
        "category" if entry.category.is_none() => entry.category = attribute(e, "term"),
        _ => {}
    }
}

fn apply_text(entry: &mut FeedEntry, tag: &str, in_author: bool, text: String) {
    if text.is_empty() {
        return;
    }
    match tag {
        "title" if entry.title.is_none() => entry.title = Some(text),
        "link" if entry.link.is_none() => entry.link = Some(text),
        "id" | "guid" if entry.id.is_none() => entry.id = Some(text),
        "name" if in_author => entry.author = Some(text),
        "author" | "creator" if entry.author.is_none() => entry.author = Some(text),
        "category" if entry.category.is_none() => entry.category = Some(text),
        "published" | "pubDate" | "date" => entry.published = parse_date(&text),
        "updated" if entry.published.is_none() => entry.published = parse_date(&text),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:media="http://search.yahoo.com/mrss/">
  <category term="rust" label="r/rust"/>
  <title>top scoring links : rust</title>
  <entry>
    <author><name>/u/ferris</name><uri>https://www.reddit.com/user/ferris</uri></author>
    <category term="rust" label="r/rust"/>
    <content type="html">&lt;p&gt;body&lt;/p&gt;</content>
    <id>t3_1abc</id>
    <link href="https://www.reddit.com/r/rust/comments/1abc/async_closures/" />
    <updated>2026-10-13T09:30:00+00:00</updated>
    <published>2026-10-13T09:00:00+00:00</published>
    <title>Async closures &amp; you</title>
  </entry>
</feed>"#;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>golang</title>
    <item>
      <title><![CDATA[Go 1.27 released]]></title>
      <link>https://www.reddit.com/r/golang/comments/9xyz/go_127/</link>
      <guid>t3_9xyz</guid>
      <dc:creator>gopher</dc:creator>
      <category>golang</category>
      <pubDate>Tue, 13 Oct 2026 10:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_atom_entries() {
        let entries = parse_feed(ATOM, "atom").unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.id.as_deref(), Some("t3_1abc"));
        assert_eq!(e.title.as_deref(), Some("Async closures & you"));
        assert_eq!(
            e.link.as_deref(),
            Some("https://www.reddit.com/r/rust/comments/1abc/async_closures/")
        );
        assert_eq!(e.author.as_deref(), Some("/u/ferris"));
        assert_eq!(e.category.as_deref(), Some("rust"));
        assert_eq!(e.published, parse_date("2026-10-13T09:00:00Z"));
    }

    #[test]
    fn parses_rss_items() {
        let entries = parse_feed(RSS, "rss").unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.title.as_deref(), Some("Go 1.27 released"));
        assert_eq!(e.id.as_deref(), Some("t3_9xyz"));
        assert_eq!(e.author.as_deref(), Some("gopher"));
        assert_eq!(e.category.as_deref(), Some("golang"));
        assert!(e.published.is_some());
    }

    #[test]
    fn html_document_is_not_a_feed() {
        let err = parse_feed("<html><body>blocked</body></html>", "reddit").unwrap_err();
        assert!(matches!(err, SourceError::Unparseable { .. }));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_feed("<feed><entry><title>x</entry></feed>", "bad").is_err());
    }
}
