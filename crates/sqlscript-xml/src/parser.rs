//! XML parser that builds [`XmlDocument`] trees with spans.

use crate::{Error, Result, Span, XmlAttribute, XmlDocument, XmlElement, XmlNode};
use quick_xml::Reader;
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};

/// Parse a template document.
///
/// Comments, processing instructions, the XML declaration and DOCTYPE are
/// skipped. Whitespace-only text between two child elements is dropped;
/// every other text run is kept verbatim (after entity unescaping).
///
/// # Example
///
/// ```rust
/// use sqlscript_xml::{parse, XmlNode};
///
/// let doc = parse("<script>a &lt; b<![CDATA[ and c > d]]></script>").unwrap();
/// assert!(matches!(&doc.root.children[0], XmlNode::Text { content, .. } if content == "a < b"));
/// assert!(matches!(&doc.root.children[1], XmlNode::CData { content, .. } if content == " and c > d"));
/// ```
pub fn parse(content: &str) -> Result<XmlDocument> {
    XmlParser::new(content).parse()
}

/// Internal parser state.
struct XmlParser<'a> {
    source: &'a str,
    reader: Reader<&'a [u8]>,
    /// Elements whose end tag has not been seen yet.
    stack: Vec<OpenElement>,
}

/// An element under construction.
struct OpenElement {
    name: String,
    prefix: Option<String>,
    name_span: Span,
    attributes: Vec<XmlAttribute>,
    /// Byte offset of the `<` that opened this element.
    start_offset: usize,
    children: Vec<XmlNode>,
}

impl OpenElement {
    fn finish(self, end_offset: usize) -> XmlElement {
        XmlElement {
            name: self.name,
            prefix: self.prefix,
            name_span: self.name_span,
            attributes: self.attributes,
            children: self.children,
            span: Span::new(self.start_offset, end_offset),
        }
    }
}

impl<'a> XmlParser<'a> {
    fn new(source: &'a str) -> Self {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;

        Self {
            source,
            reader,
            stack: Vec::new(),
        }
    }

    fn parse(&mut self) -> Result<XmlDocument> {
        let mut root: Option<XmlElement> = None;

        loop {
            let event_start = self.reader.buffer_position() as usize;

            match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    let open = self.open_element(&e, event_start)?;
                    self.stack.push(open);
                }
                Ok(Event::End(e)) => {
                    let element = self.close_element(&e)?;
                    self.attach(element, &mut root)?;
                }
                Ok(Event::Empty(e)) => {
                    let end_offset = self.reader.buffer_position() as usize;
                    let element = self.open_element(&e, event_start)?.finish(end_offset);
                    self.attach(element, &mut root)?;
                }
                Ok(Event::Text(e)) => self.handle_text(&e, event_start)?,
                Ok(Event::CData(e)) => self.handle_cdata(&e, event_start),
                Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlSyntax {
                        message: e.to_string(),
                        position: Some(self.reader.error_position()),
                    });
                }
            }
        }

        if let Some(open) = self.stack.last() {
            return Err(Error::UnexpectedEof {
                expected: format!("closing tag </{}>", open.name),
                span: Some(open.name_span),
            });
        }

        let root = root.ok_or(Error::EmptyDocument)?;
        Ok(XmlDocument {
            root,
            span: Span::new(0, self.source.len()),
        })
    }

    /// Add a finished element to its parent, or make it the root.
    fn attach(&mut self, element: XmlElement, root: &mut Option<XmlElement>) -> Result<()> {
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(XmlNode::Element(element));
                Ok(())
            }
            None if root.is_some() => Err(Error::MultipleRoots {
                span: Some(element.span),
            }),
            None => {
                *root = Some(element);
                Ok(())
            }
        }
    }

    fn open_element(&self, e: &BytesStart<'_>, event_start: usize) -> Result<OpenElement> {
        let raw_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let name_start = event_start + 1;
        let name_span = Span::new(name_start, name_start + raw_name.len());
        let (name, prefix) = split_prefix(&raw_name);

        Ok(OpenElement {
            name,
            prefix,
            name_span,
            attributes: self.parse_attributes(e, event_start)?,
            start_offset: event_start,
            children: Vec::new(),
        })
    }

    fn close_element(&mut self, e: &BytesEnd<'_>) -> Result<XmlElement> {
        let raw_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let (local_name, _) = split_prefix(&raw_name);

        let open = self
            .stack
            .pop()
            .ok_or_else(|| Error::UnexpectedEndTag {
                name: raw_name.clone(),
            })?;

        if open.name != local_name {
            return Err(Error::MismatchedEndTag {
                expected: open.name.clone(),
                found: local_name,
                span: Some(open.name_span),
            });
        }

        let end_offset = self.reader.buffer_position() as usize;
        Ok(open.finish(end_offset))
    }

    fn handle_text(&mut self, e: &BytesText<'_>, event_start: usize) -> Result<()> {
        let text = e.unescape().map_err(|err| Error::XmlSyntax {
            message: format!("Invalid text content: {}", err),
            position: Some(event_start as u64),
        })?;
        let span = Span::new(event_start, self.reader.buffer_position() as usize);

        if let Some(open) = self.stack.last_mut() {
            let after_element = matches!(open.children.last(), Some(XmlNode::Element(_)));
            if text.trim().is_empty() && after_element {
                return Ok(());
            }
            open.children.push(XmlNode::Text {
                content: text.into_owned(),
                span,
            });
        }
        Ok(())
    }

    fn handle_cdata(&mut self, e: &BytesCData<'_>, event_start: usize) {
        let span = Span::new(event_start, self.reader.buffer_position() as usize);
        if let Some(open) = self.stack.last_mut() {
            open.children.push(XmlNode::CData {
                content: String::from_utf8_lossy(e.as_ref()).into_owned(),
                span,
            });
        }
    }

    fn parse_attributes(&self, e: &BytesStart<'_>, tag_start: usize) -> Result<Vec<XmlAttribute>> {
        // The raw tag content starts right after '<'.
        let content_start = tag_start + 1;
        let tag_str = String::from_utf8_lossy(e.as_ref()).into_owned();
        let mut search_from = e.name().as_ref().len();
        let mut attributes = Vec::new();

        for attr in e.attributes() {
            let attr = attr?;
            let raw_key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|err| Error::XmlSyntax {
                message: format!("Invalid attribute value: {}", err),
                position: Some(tag_start as u64),
            })?;

            let (name_span, value_span, consumed) =
                locate_attribute(&tag_str, search_from, &raw_key, content_start);
            search_from = consumed;

            let (name, prefix) = split_prefix(&raw_key);
            attributes.push(XmlAttribute {
                name,
                prefix,
                value: value.into_owned(),
                name_span,
                value_span,
            });
        }

        Ok(attributes)
    }
}

/// Split `prefix:local` into `(local, Some(prefix))`.
fn split_prefix(full_name: &str) -> (String, Option<String>) {
    match full_name.split_once(':') {
        Some((prefix, local)) => (local.to_string(), Some(prefix.to_string())),
        None => (full_name.to_string(), None),
    }
}

/// Find the name and quoted value of `key` in the raw tag text.
///
/// Returns both spans (absolute offsets) and the relative position where the
/// search for the next attribute should resume.
fn locate_attribute(
    tag_str: &str,
    search_from: usize,
    key: &str,
    content_start: usize,
) -> (Span, Span, usize) {
    let fallback = Span::new(content_start, content_start + 1);
    let Some(rel) = tag_str.get(search_from..).and_then(|s| s.find(key)) else {
        return (fallback, fallback, search_from);
    };

    let name_start = search_from + rel;
    let name_end = name_start + key.len();
    let name_span = Span::new(content_start + name_start, content_start + name_end);

    let rest = &tag_str[name_end..];
    let eq_offset = rest.len() - rest.trim_start().len();
    let after_eq = rest.trim_start().strip_prefix('=').unwrap_or(rest.trim_start());
    let value_rel = name_end + eq_offset + (rest.trim_start().len() - after_eq.len());
    let value_rel = value_rel + (after_eq.len() - after_eq.trim_start().len());

    let Some(value_str) = tag_str.get(value_rel..) else {
        return (name_span, name_span, name_end);
    };
    let value_end = match value_str.chars().next() {
        Some(quote @ ('"' | '\'')) => value_str[1..]
            .find(quote)
            .map_or(value_rel + 1, |p| value_rel + 1 + p + 1),
        _ => value_str
            .find(|c: char| c.is_whitespace() || c == '/')
            .map_or(tag_str.len(), |p| value_rel + p),
    };

    let value_span = Span::new(content_start + value_rel, content_start + value_end);
    (name_span, value_span, value_end)
}
