//! Response format detection
//!
//! The departures endpoint answers in JSON for most agencies and in a
//! namespaced XML document for older deployments. [`decode_payload`] turns
//! the raw body into a [`DecodedPayload`] that the departure parsers match on.

use std::borrow::Cow;

use quick_xml::{Reader, events::Event};
use serde_json::Value;
use tracing::debug;

/// A decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    /// Body parsed as JSON
    Json(Value),
    /// Body parsed as XML after namespace stripping
    Xml(XmlElement),
    /// Body is neither valid JSON nor well-formed XML
    Unparseable,
}

/// A generic XML element
///
/// Tags are local names (any `prefix:` is dropped). `text` holds the
/// trimmed character data directly inside the element, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Local tag name
    pub tag: String,
    /// Direct text content
    pub text: Option<String>,
    /// Child elements in document order
    pub children: Vec<Self>,
}

impl XmlElement {
    /// Create an element with no text or children
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// First direct child with the given tag
    #[must_use]
    pub fn find(&self, tag: &str) -> Option<&Self> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// All direct children with the given tag
    pub fn find_all<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |child| child.tag == tag)
    }

    /// Text of the first direct child with the given tag
    ///
    /// `None` if the child is missing, `Some("")` if it exists but is empty.
    #[must_use]
    pub fn find_text(&self, tag: &str) -> Option<&str> {
        self.find(tag)
            .map(|child| child.text.as_deref().unwrap_or_default())
    }

    /// Like [`Self::find_text`] but treats an empty child as missing
    #[must_use]
    pub fn find_nonempty_text(&self, tag: &str) -> Option<&str> {
        self.find_text(tag).filter(|text| !text.is_empty())
    }

    /// Whether this element has any child elements
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Decode a response body, trying JSON first and XML second
pub fn decode_payload(text: &str) -> DecodedPayload {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return DecodedPayload::Json(value);
    }

    let stripped = strip_namespace_declarations(text);
    match parse_xml(&stripped) {
        Ok(root) => DecodedPayload::Xml(root),
        Err(message) => {
            debug!(error = %message, "Response is neither JSON nor XML");
            DecodedPayload::Unparseable
        },
    }
}

/// Remove the first default namespace and the first `i` namespace declaration
///
/// Each declaration is optional and removed at most once.
pub fn strip_namespace_declarations(text: &str) -> Cow<'_, str> {
    let without_default = strip_first_attribute(Cow::Borrowed(text), " xmlns=\"");
    strip_first_attribute(without_default, " xmlns:i=\"")
}

/// Remove the first `{prefix}value"` occurrence whose value is non-empty
fn strip_first_attribute<'a>(text: Cow<'a, str>, prefix: &str) -> Cow<'a, str> {
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find(prefix) {
        let start = search_from + offset;
        let value_start = start + prefix.len();
        let Some(value_len) = text[value_start..].find('"') else {
            break;
        };

        if value_len > 0 {
            let end = value_start + value_len + 1;
            let mut stripped = String::with_capacity(text.len() - (end - start));
            stripped.push_str(&text[..start]);
            stripped.push_str(&text[end..]);
            return Cow::Owned(stripped);
        }

        search_from = start + 1;
    }

    text
}

/// Parse a well-formed XML document into an element tree
///
/// # Errors
///
/// Returns a description of the first syntax error, unbalanced tag, missing
/// root, or content after the root element.
pub fn parse_xml(text: &str) -> Result<XmlElement, String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if root.is_some() {
                    return Err("content after root element".to_string());
                }
                stack.push(XmlElement::new(local_name(e.local_name().as_ref())));
            },
            Ok(Event::Empty(e)) => {
                if root.is_some() {
                    return Err("content after root element".to_string());
                }
                let element = XmlElement::new(local_name(e.local_name().as_ref()));
                attach(&mut stack, &mut root, element);
            },
            Ok(Event::End(_)) => {
                let Some(element) = stack.pop() else {
                    return Err("unexpected closing tag".to_string());
                };
                attach(&mut stack, &mut root, element);
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| err.to_string())?;
                push_text(&mut stack, &text)?;
            },
            Ok(Event::CData(e)) => {
                let text = std::str::from_utf8(e.as_ref()).map_err(|err| err.to_string())?;
                push_text(&mut stack, text)?;
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            Ok(_) => {},
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err("unexpected end of document".to_string());
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn push_text(stack: &mut [XmlElement], text: &str) -> Result<(), String> {
    if text.is_empty() {
        return Ok(());
    }
    let Some(current) = stack.last_mut() else {
        return Err("text outside root element".to_string());
    };
    // Text after a child element belongs to that child's tail; only the
    // leading text counts as the element's own text.
    if current.children.is_empty() {
        current.text.get_or_insert_with(String::new).push_str(text);
    }
    Ok(())
}
