//! OPML index of every podcast feed of one media kind.

use std::borrow::Cow;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;
use tracing::warn;

use crate::domain::FeedConfig;

use super::storage;

const DEFAULT_TITLE: &str = "Podcast";
const CHANNEL_LABEL: &str = "官方频道";

/// Errors that can occur during OPML parsing
#[derive(Debug, Error)]
pub enum OpmlError {
    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("OPML document has no <opml> root")]
    MissingRoot,
}

/// A single `<outline>` pointing at a feed document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outline {
    pub text: String,
    pub title: String,
    pub xml_url: String,
}

impl Outline {
    /// Feed name the outline points at (file stem of `xmlUrl`)
    pub fn feed_name(&self) -> String {
        feed_name_from_url(&self.xml_url)
    }
}

/// Extract the file stem from a feed document URL
pub fn feed_name_from_url(xml_url: &str) -> String {
    let path = match url::Url::parse(xml_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => xml_url.to_string(),
    };
    Path::new(&path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// OPML document: a head title plus a flat outline list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpmlDocument {
    pub title: String,
    pub outlines: Vec<Outline>,
}

impl Default for OpmlDocument {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            outlines: Vec::new(),
        }
    }
}

impl OpmlDocument {
    /// Load from disk; a missing file yields the default template
    pub async fn load(path: &Path) -> Result<Self> {
        match storage::read_optional(path).await? {
            Some(content) => Self::parse(&content)
                .with_context(|| format!("Failed to parse OPML: {}", path.display())),
            None => {
                warn!(path = %path.display(), "OPML not found, using default template");
                Ok(Self::default())
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, OpmlError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut doc = Self {
            title: String::new(),
            outlines: Vec::new(),
        };
        let mut saw_root = false;
        let mut in_title = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"opml" => saw_root = true,
                    b"title" => in_title = true,
                    b"outline" => {
                        if let Some(outline) = parse_outline(&e, &reader)? {
                            doc.outlines.push(outline);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                    if let Some(outline) = parse_outline(&e, &reader)? {
                        doc.outlines.push(outline);
                    }
                }
                Ok(Event::Text(t)) if in_title => {
                    let text = t.unescape().map_err(|e| OpmlError::XmlParse(e.to_string()))?;
                    doc.title.push_str(&text);
                }
                Ok(Event::End(e)) if e.name().as_ref() == b"title" => in_title = false,
                Ok(Event::Eof) => break,
                Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
                _ => {}
            }
            buf.clear();
        }

        if !saw_root {
            return Err(OpmlError::MissingRoot);
        }
        if doc.title.is_empty() {
            doc.title = DEFAULT_TITLE.to_string();
        }
        Ok(doc)
    }

    /// Feed names referenced by the outlines
    pub fn feed_names(&self) -> HashSet<String> {
        self.outlines.iter().map(Outline::feed_name).collect()
    }

    /// The set of configured feeds differs from the set of outlines
    pub fn needs_update(&self, configs: &[FeedConfig]) -> bool {
        let configured: HashSet<String> = configs.iter().map(|c| c.name.clone()).collect();
        configured != self.feed_names()
    }

    /// Rebuild the outline list in config order
    ///
    /// Outlines of feeds that are still configured are kept as they are,
    /// new feeds get a fresh outline and removed feeds are dropped.
    pub fn update<U, C>(&mut self, configs: &[FeedConfig], xml_url: U, channel_url: C)
    where
        U: Fn(&FeedConfig) -> String,
        C: Fn(&FeedConfig) -> String,
    {
        let mut existing = std::mem::take(&mut self.outlines);
        self.outlines = configs
            .iter()
            .map(|config| {
                match existing
                    .iter()
                    .position(|o| o.feed_name() == config.name)
                {
                    Some(pos) => existing.swap_remove(pos),
                    None => Outline {
                        text: format!(
                            "{}\n{}: {}",
                            config.title,
                            CHANNEL_LABEL,
                            channel_url(config)
                        ),
                        title: config.title.clone(),
                        xml_url: xml_url(config),
                    },
                }
            })
            .collect();
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .context("Failed to write XML declaration")?;

        let mut opml = BytesStart::new("opml");
        opml.push_attribute(("version", "1.0"));
        writer
            .write_event(Event::Start(opml))
            .context("Failed to write opml element")?;

        writer
            .write_event(Event::Start(BytesStart::new("head")))
            .context("Failed to write head element")?;
        writer
            .write_event(Event::Start(BytesStart::new("title")))
            .context("Failed to write title element")?;
        writer
            .write_event(Event::Text(BytesText::new(&self.title)))
            .context("Failed to write title text")?;
        writer
            .write_event(Event::End(BytesEnd::new("title")))
            .context("Failed to write title end")?;
        writer
            .write_event(Event::End(BytesEnd::new("head")))
            .context("Failed to write head end")?;

        writer
            .write_event(Event::Start(BytesStart::new("body")))
            .context("Failed to write body element")?;

        for outline in &self.outlines {
            let text = escape_attribute(&outline.text);
            let mut element = BytesStart::new("outline");
            element.push_attribute(Attribute {
                key: quick_xml::name::QName(b"text"),
                value: Cow::Borrowed(text.as_bytes()),
            });
            element.push_attribute(("type", "rss"));
            element.push_attribute(("xmlUrl", outline.xml_url.as_str()));
            element.push_attribute(("title", outline.title.as_str()));
            writer
                .write_event(Event::Empty(element))
                .context("Failed to write outline element")?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("body")))
            .context("Failed to write body end")?;
        writer
            .write_event(Event::End(BytesEnd::new("opml")))
            .context("Failed to write opml end")?;

        let result = writer.into_inner().into_inner();
        String::from_utf8(result).context("Generated OPML contains invalid UTF-8")
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml()?;
        storage::write_atomic(path, xml.into_bytes())
            .await
            .with_context(|| format!("Failed to save OPML: {}", path.display()))
    }
}

/// Escape an attribute value, keeping line breaks as character references
fn escape_attribute(value: &str) -> String {
    quick_xml::escape::escape(value).replace('\n', "&#10;")
}

fn parse_outline(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Option<Outline>, OpmlError> {
    let mut text = None;
    let mut title = None;
    let mut xml_url = None;

    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(e) => {
                warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| OpmlError::XmlParse(e.to_string()))?
            .into_owned();
        match attr.key.as_ref() {
            b"text" => text = Some(value),
            b"title" => title = Some(value),
            b"xmlUrl" => xml_url = Some(value),
            _ => {}
        }
    }

    Ok(xml_url.map(|xml_url| {
        let title = title.or_else(|| text.clone()).unwrap_or_default();
        Outline {
            text: text.unwrap_or_else(|| title.clone()),
            title,
            xml_url,
        }
    }))
}
