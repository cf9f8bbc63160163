//! In-memory XML element tree
//!
//! Both pipelines work against [`XmlElement`]: export serializes records into
//! it, import walks a parsed document. Parsing and writing go through
//! `quick-xml`; values are escaped on write and unescaped on read, so the tree
//! always holds logical text.

use crate::domain::errors::{ArborError, ParseError};
use crate::domain::result::Result;
use crate::domain::row::NULL_MARKER;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// One XML element with attributes, optional text and child elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Tag name
    pub name: String,

    /// Attributes in document order
    pub attributes: Vec<(String, String)>,

    /// Text content; `None` for self-closing elements and for containers,
    /// `Some("")` for `<x></x>`
    pub text: Option<String>,

    /// Child elements in document order
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Creates an empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an attribute (builder style)
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Sets the text (builder style)
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Adds a child (builder style)
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given tag
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Every child with the given tag, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text content, empty for empty elements
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Whether the element carries the null marker
    pub fn is_null(&self) -> bool {
        self.attribute(NULL_MARKER) == Some("true")
    }

    /// Whether the element has no child elements
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Follows an insertion path of wrapper tags, creating missing wrappers
    pub fn descend_or_create(&mut self, path: &[String]) -> &mut XmlElement {
        let mut node = self;
        for segment in path {
            let index = match node.children.iter().position(|c| &c.name == segment) {
                Some(index) => index,
                None => {
                    node.children.push(XmlElement::new(segment.clone()));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[index];
        }
        node
    }

    /// Follows an insertion path of wrapper tags without creating anything
    pub fn descend(&self, path: &[String]) -> Option<&XmlElement> {
        path.iter().try_fold(self, |node, segment| node.child(segment))
    }
}

/// Parses a decoded XML document into its root element
///
/// Whitespace between elements is dropped; text inside leaf elements is kept
/// verbatim. The XML declaration, comments and processing instructions are
/// ignored.
///
/// # Errors
///
/// Returns [`ParseError::Malformed`] with the byte position for documents
/// that are not well formed, and [`ParseError::Empty`] when no root element
/// exists.
///
/// # Examples
///
/// ```
/// use arbor::domain::document::parse_document;
///
/// let root = parse_document(r#"<items><item id="1"><name>Sword</name></item></items>"#).unwrap();
/// let item = root.child("item").unwrap();
/// assert_eq!(item.attribute("id"), Some("1"));
/// assert_eq!(item.child("name").unwrap().text_or_empty(), "Sword");
/// ```
pub fn parse_document(xml: &str) -> std::result::Result<XmlElement, ParseError> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<(XmlElement, String)> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let malformed = |message: String| ParseError::Malformed { position, message };

        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if root.is_some() {
                    return Err(malformed("content after the root element".to_string()));
                }
                let element = element_from_start(&e, position)?;
                stack.push((element, String::new()));
            }
            Ok(Event::Empty(e)) => {
                if root.is_some() {
                    return Err(malformed("content after the root element".to_string()));
                }
                let element = element_from_start(&e, position)?;
                match stack.last_mut() {
                    Some((parent, _)) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Ok(Event::End(_)) => {
                let Some((mut element, text)) = stack.pop() else {
                    return Err(malformed("unexpected closing tag".to_string()));
                };
                if element.children.is_empty() || !text.trim().is_empty() {
                    element.text = Some(text);
                }
                match stack.last_mut() {
                    Some((parent, _)) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| malformed(err.to_string()))?;
                match stack.last_mut() {
                    Some((_, buffer)) => buffer.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(malformed("text outside the root element".to_string())),
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8(e.into_inner().into_owned())
                    .map_err(|err| ParseError::Encoding(err.to_string()))?;
                match stack.last_mut() {
                    Some((_, buffer)) => buffer.push_str(&text),
                    None => return Err(malformed("CDATA outside the root element".to_string())),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(malformed(err.to_string())),
        }
    }

    if let Some((open, _)) = stack.last() {
        return Err(ParseError::Malformed {
            position: xml.len() as u64,
            message: format!("unclosed element '{}'", open.name),
        });
    }

    root.ok_or(ParseError::Empty)
}

fn element_from_start(
    start: &BytesStart<'_>,
    position: u64,
) -> std::result::Result<XmlElement, ParseError> {
    let malformed = |message: String| ParseError::Malformed { position, message };

    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| ParseError::Encoding(e.to_string()))?
        .to_string();
    let mut element = XmlElement::new(name);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| ParseError::Encoding(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

/// Serializes a complete document with an XML declaration
///
/// `declared_encoding` is written verbatim into the declaration; the returned
/// string is still Rust text and is encoded to bytes separately.
pub fn write_document(root: &XmlElement, declared_encoding: &str) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new(
            "1.0",
            Some(declared_encoding),
            None,
        )))
        .map_err(xml_write_error)?;
    write_element(&mut writer, root)?;
    into_string(writer)
}

/// Serializes elements without a declaration, for page scratch output
pub fn write_fragment(elements: &[XmlElement]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    for element in elements {
        write_element(&mut writer, element)?;
    }
    into_string(writer)
}

/// Writes a declaration and `root` (its own attributes only) around
/// already-serialized fragments, in the order given
///
/// Fragments are copied verbatim, so text inside them is never re-indented.
pub fn write_wrapped<'a>(
    root: &XmlElement,
    declared_encoding: &str,
    fragments: impl IntoIterator<Item = &'a str>,
) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new(
            "1.0",
            Some(declared_encoding),
            None,
        )))
        .map_err(xml_write_error)?;
    writer.get_mut().push(b'\n');

    let mut start = BytesStart::new(root.name.as_str());
    for (key, value) in &root.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    writer
        .write_event(Event::Start(start))
        .map_err(xml_write_error)?;
    for fragment in fragments.into_iter().filter(|f| !f.is_empty()) {
        let out = writer.get_mut();
        out.push(b'\n');
        out.extend_from_slice(fragment.as_bytes());
    }
    writer.get_mut().push(b'\n');
    writer
        .write_event(Event::End(BytesEnd::new(root.name.as_str())))
        .map_err(xml_write_error)?;
    into_string(writer)
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    // An empty text event keeps `<x></x>` on one line under indentation
    let text = match (&element.text, element.children.is_empty()) {
        (None, true) => {
            return writer
                .write_event(Event::Empty(start))
                .map_err(xml_write_error);
        }
        (Some(text), true) => Some(text.as_str()),
        (text, false) => text.as_deref().filter(|t| !t.trim().is_empty()),
    };

    writer
        .write_event(Event::Start(start))
        .map_err(xml_write_error)?;
    if let Some(text) = text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_write_error)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(xml_write_error)
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String> {
    String::from_utf8(writer.into_inner())
        .map_err(|e| ArborError::Serialization(format!("XML output is not UTF-8: {e}")))
}

fn xml_write_error(err: impl std::fmt::Display) -> ArborError {
    ArborError::Serialization(format!("XML write failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let xml = r#"<?xml version="1.0" encoding="UTF-16"?>
<items>
  <item id="100">
    <name>Sword &amp; Shield</name>
    <desc/>
    <tags>
      <tag><value>a</value></tag>
      <tag><value>b</value></tag>
    </tags>
  </item>
</items>"#;
        let root = parse_document(xml).unwrap();
        assert_eq!(root.name, "items");
        assert!(root.text.is_none());

        let item = root.child("item").unwrap();
        assert_eq!(item.attribute("id"), Some("100"));
        assert_eq!(item.child("name").unwrap().text_or_empty(), "Sword & Shield");
        assert_eq!(item.child("desc").unwrap().text, None);

        let tags = item.descend(&["tags".to_string()]).unwrap();
        assert_eq!(tags.children_named("tag").count(), 2);
    }

    #[test]
    fn test_parse_keeps_leaf_whitespace() {
        let root = parse_document("<r><v>  padded  </v></r>").unwrap();
        assert_eq!(root.child("v").unwrap().text_or_empty(), "  padded  ");
    }

    #[test]
    fn test_parse_cdata() {
        let root = parse_document("<r><v><![CDATA[<b>raw</b>]]></v></r>").unwrap();
        assert_eq!(root.child("v").unwrap().text_or_empty(), "<b>raw</b>");
    }

    #[test]
    fn test_parse_rejects_mismatched_tags() {
        let err = parse_document("<r><a></b></r>").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_parse_rejects_unclosed_root() {
        let err = parse_document("<r><a>1</a>").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_parse_empty_input() {
        assert_eq!(parse_document("   ").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn test_null_marker() {
        let root = parse_document(r#"<r><v null="true"/><w/></r>"#).unwrap();
        assert!(root.child("v").unwrap().is_null());
        assert!(!root.child("w").unwrap().is_null());
    }

    #[test]
    fn test_write_then_parse_preserves_values() {
        let root = XmlElement::new("items").with_child(
            XmlElement::new("item")
                .with_attribute("id", "1")
                .with_child(XmlElement::new("name").with_text("a < b \"quoted\""))
                .with_child(XmlElement::new("empty"))
                .with_child(XmlElement::new("blank").with_text("")),
        );
        let xml = write_document(&root, "UTF-16").unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-16"?>"#));
        assert!(xml.contains("<empty/>"));
        assert!(xml.contains("<blank></blank>"));

        let parsed = parse_document(&xml).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn test_descend_or_create_reuses_wrappers() {
        let mut root = XmlElement::new("item");
        let path = vec!["a".to_string(), "b".to_string()];
        root.descend_or_create(&path).children.push(XmlElement::new("x"));
        root.descend_or_create(&path).children.push(XmlElement::new("y"));

        assert_eq!(root.children.len(), 1);
        assert_eq!(root.descend(&path).unwrap().children.len(), 2);
    }

    #[test]
    fn test_write_fragment_has_no_declaration() {
        let fragment = write_fragment(&[XmlElement::new("item"), XmlElement::new("item")]).unwrap();
        assert!(!fragment.contains("<?xml"));
        assert_eq!(fragment.matches("<item/>").count(), 2);
    }

    #[test]
    fn test_write_wrapped_merges_fragments_in_order() {
        let first = write_fragment(&[XmlElement::new("item").with_attribute("id", "1")]).unwrap();
        let second = write_fragment(&[XmlElement::new("item").with_attribute("id", "2")]).unwrap();
        let root = XmlElement::new("items").with_attribute("map", "a&b");

        let xml = write_wrapped(&root, "UTF-8", [first.as_str(), "", second.as_str()]).unwrap();
        let parsed = parse_document(&xml).unwrap();
        assert_eq!(parsed.attribute("map"), Some("a&b"));
        let ids: Vec<_> = parsed
            .children_named("item")
            .map(|i| i.attribute("id").unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
